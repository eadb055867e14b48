// src/file_store.rs

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Process-wide sequence folded into every stored name. Two concurrent
/// uploads can never be handed the same name, without any locking.
static STORE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Blob storage for uploaded originals on the local filesystem.
///
/// Stored names are `{prefix}_{sanitized original}` where the prefix is a
/// short hash over the original name, a nanosecond timestamp and the
/// process sequence number.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write the bytes under a freshly generated unique name and return
    /// that name. This is the only fatal step of ingestion.
    pub fn store(&self, bytes: &[u8], original_name: &str) -> io::Result<String> {
        let stored_name = unique_name(original_name);
        let target = self.root.join(&stored_name);
        std::fs::write(&target, bytes)?;
        info!(stored_name = %stored_name, bytes = bytes.len(), "File stored");
        Ok(stored_name)
    }

    /// Fetch a previously stored file. Missing or unreadable files (and
    /// names that try to escape the store root) come back as `None`.
    pub fn retrieve(&self, stored_name: &str) -> Option<Vec<u8>> {
        if stored_name.contains('/') || stored_name.contains('\\') || stored_name.contains("..") {
            warn!(stored_name = %stored_name, "Rejected unsafe stored name");
            return None;
        }
        match std::fs::read(self.root.join(stored_name)) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(stored_name = %stored_name, error = %e, "Stored file not readable");
                None
            }
        }
    }
}

/// Generate a collision-resistant stored name for an upload.
fn unique_name(original_name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = STORE_SEQ.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(original_name.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}_{}", &digest[..12], sanitize_filename(original_name))
}

/// Keep only characters that are safe in a flat filename; anything else
/// (path separators included) becomes '_'. Only the final path component
/// of the suggested name is used.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
