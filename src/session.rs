//! Session store for classified images
//!
//! Every persisted batch gets its own session directory:
//!
//! ```text
//! OUTPUT_DIR/
//!   20240501_142233_a1b2c3d4/
//!     cat/
//!       kitty.png
//!     ship/
//!       ferry.jpg
//!   classified_images_20240501_142233_a1b2c3d4.zip
//! ```
//!
//! Sessions are never deleted here; cleaning up old ones is left to operators.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use image::RgbImage;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::utils::error::{ClassifyError, Result};

/// Identifier of one persisted batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new id from the current local time plus a random suffix.
    ///
    /// The timestamp keeps ids sortable and readable; the suffix keeps two
    /// batches started within the same second apart.
    pub fn generate() -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        SessionId(format!("{}_{}", timestamp, &suffix[..8]))
    }

    /// Validate a client-supplied id.
    ///
    /// Anything that could escape the output directory is reported as an
    /// unknown session.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(SessionId(raw.to_string()))
        } else {
            Err(ClassifyError::SessionNotFound(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce an uploaded filename to a single safe path component
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let normalized = raw.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(ClassifyError::InvalidFilename(raw.to_string()));
    }
    Ok(name.to_string())
}

/// File name of the archive for a session
pub fn archive_file_name(session: &SessionId) -> String {
    format!("classified_images_{}.zip", session)
}

/// Filesystem-backed store of classified images grouped by session and class
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the output root if it does not exist yet
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_session_id(&self) -> SessionId {
        SessionId::generate()
    }

    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    pub fn exists(&self, session: &SessionId) -> bool {
        self.session_dir(session).is_dir()
    }

    /// Save an image under `session/class/filename`, overwriting any earlier
    /// file of the same name. The encoding follows the filename extension.
    pub fn save(
        &self,
        session: &SessionId,
        class_name: &str,
        filename: &str,
        image: &RgbImage,
    ) -> Result<PathBuf> {
        let filename = sanitize_filename(filename)?;
        let class_dir = self.session_dir(session).join(class_name);
        fs::create_dir_all(&class_dir)?;

        let path = class_dir.join(filename);
        image
            .save(&path)
            .map_err(|e| ClassifyError::Save(path.clone(), e.to_string()))?;

        debug!("Saved {:?}", path);
        Ok(path)
    }

    /// Zip the whole session tree into `classified_images_{id}.zip` next to
    /// the session directory and return the archive path.
    pub fn archive(&self, session: &SessionId) -> Result<PathBuf> {
        let session_dir = self.session_dir(session);
        if !session_dir.is_dir() {
            return Err(ClassifyError::SessionNotFound(session.to_string()));
        }

        let zip_path = self.root.join(archive_file_name(session));
        // Readers only ever see a complete archive at zip_path.
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", archive_file_name(session), Uuid::new_v4().simple()));

        let written = write_archive(&session_dir, &tmp_path);
        match written {
            Ok(count) => {
                fs::rename(&tmp_path, &zip_path)?;
                info!("Archived {} files from session {} to {:?}", count, session, zip_path);
                Ok(zip_path)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    /// Names of all session directories under the output root, sorted
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                sessions.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

/// Write every file below `dir` into a deflated zip at `zip_path`, keyed by
/// its `/`-separated path relative to `dir`. Returns the number of files.
fn write_archive(dir: &Path, zip_path: &Path) -> Result<usize> {
    let file = File::create(zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| ClassifyError::Archive(e.to_string()))?;
        let name = archive_entry_name(relative);

        zip.start_file(name, options)?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut zip)?;
        count += 1;
    }

    zip.finish()?;
    Ok(count)
}

fn archive_entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
