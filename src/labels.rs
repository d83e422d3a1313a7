//! CIFAR-10 label table
//!
//! CIFAR-10 consists of 32x32 color images in 10 classes. The order below is
//! the output order of every pretrained CIFAR-10 classifier and must not change.

use crate::utils::error::{ClassifyError, Result};

/// Total number of classes the classifier can emit
pub const NUM_CLASSES: usize = 10;

/// CIFAR-10 class names, indexed by model output position
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Get the class name for a given label index
pub fn label_of(index: usize) -> Result<&'static str> {
    CLASS_NAMES
        .get(index)
        .copied()
        .ok_or(ClassifyError::OutOfRange(index, NUM_CLASSES))
}

/// Get the label index for a given class name
pub fn index_of(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&n| n == name)
}
