//! Utilities module for logging and error handling
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{ClassifyError, Result, ResultExt};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Round a value to two decimal places, the precision used for reported confidences
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(87.654321), 87.65);
        assert_eq!(round2(0.0), 0.0);
        assert_eq!(round2(50.0), 50.0);
    }
}
