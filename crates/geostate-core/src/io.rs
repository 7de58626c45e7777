use crate::error::{GeoError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting the annotated store.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a file as a string, returning `None` when it does not exist.
pub fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read and parse a JSON document. Parse failures are reported as malformed
/// input naming the file.
pub fn read_json(path: &Path) -> Result<serde_json::Value> {
    let data = std::fs::read_to_string(path)?;
    parse_json(&path.display().to_string(), &data)
}

pub fn parse_json(source_name: &str, data: &str) -> Result<serde_json::Value> {
    serde_json::from_str(data).map_err(|e| GeoError::malformed(source_name, e.to_string()))
}

/// Write a file only if it does not already exist.
pub fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    if path.exists() {
        return Err(GeoError::ArchiveExists(path.to_path_buf()));
    }
    atomic_write(path, data)
}
