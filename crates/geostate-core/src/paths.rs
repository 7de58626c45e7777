use crate::error::{GeoError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const ARCHIVE_PREFIX: &str = "geo-location";
pub const ANNOTATED_SUFFIX: &str = "annotated.json";
pub const RAW_SUFFIX: &str = "raw.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `geo-location-<name>-<year>-<suffix>`
pub fn archive_file_name(name: &str, year: i32, suffix: &str) -> String {
    format!("{ARCHIVE_PREFIX}-{name}-{year}-{suffix}")
}

/// Raw and annotated archive files for one person and year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    pub raw: PathBuf,
    pub annotated: PathBuf,
}

pub fn archive_paths(dir: &Path, name: &str, year: i32) -> Result<ArchivePaths> {
    validate_name(name)?;
    Ok(ArchivePaths {
        raw: dir.join(archive_file_name(name, year, RAW_SUFFIX)),
        annotated: dir.join(archive_file_name(name, year, ANNOTATED_SUFFIX)),
    })
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Archive names end up in file names shared between people; keep them to
/// lowercase slugs.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() > 64 || !name_re().is_match(name) {
        return Err(GeoError::InvalidName(name.to_string()));
    }
    Ok(())
}
