use crate::output::print_json;
use anyhow::Context;
use geostate_core::archive::write_archive;
use geostate_core::extract::PointExtractor;
use geostate_core::merge::merge_files;
use geostate_core::store::{AnnotationStore, LoadMode};
use std::path::{Path, PathBuf};

pub fn run(
    raw: &[PathBuf],
    store: &Path,
    year: i32,
    name: &str,
    dir: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let merged = merge_files(&PointExtractor::new(), raw).context("failed to read raw exports")?;
    let annotated = AnnotationStore::load(store, LoadMode::RequireExisting)
        .with_context(|| format!("failed to read {}", store.display()))?;
    let written = write_archive(merged.points(), &annotated, dir, name, year)?;

    if json {
        print_json(&serde_json::json!({
            "year": year,
            "raw": {
                "path": written.paths.raw.display().to_string(),
                "entries": written.raw_entries,
            },
            "annotated": {
                "path": written.paths.annotated.display().to_string(),
                "entries": written.annotated_entries,
            },
        }))?;
    } else {
        println!(
            "Archived {} raw points to {}",
            written.raw_entries,
            written.paths.raw.display()
        );
        println!(
            "Archived {} entries for {year} to {}",
            written.annotated_entries,
            written.paths.annotated.display()
        );
    }
    Ok(())
}
