//! Whole-document JSON persistence shared by the stores.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{Error, Result};

/// Loads a JSON document, returning `None` when the file is missing or empty.
///
/// A file that exists but does not parse is a persistence error: starting with
/// an empty set would overwrite the credentials on the next write.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path)
        .map_err(|e| Error::Persistence(format!("can't read {}: {e}", path.display())))?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|e| Error::Persistence(format!("can't parse {}: {e}", path.display())))
}

/// Rewrites the whole document.
///
/// The new content goes to a sibling temp file first and is renamed over the
/// target, so a crash mid-write leaves the previous version intact.
pub fn persist_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Persistence(format!("error encoding json: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Persistence(format!("can't create {}: {e}", parent.display())))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let write = || -> std::io::Result<()> {
        let mut file = open_private(tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(tmp_path, path)
    };
    write().map_err(|e| Error::Persistence(format!("error saving {}: {e}", path.display())))
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
