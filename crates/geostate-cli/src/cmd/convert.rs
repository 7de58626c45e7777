use crate::output::print_json;
use anyhow::Context;
use geostate_core::store::{AnnotationStore, LoadMode};
use std::path::Path;

pub fn run(input: &Path, output: &Path, json: bool) -> anyhow::Result<()> {
    let store = AnnotationStore::load(input, LoadMode::RequireExisting)
        .with_context(|| format!("failed to read {}", input.display()))?;
    geostate_core::io::write_new(output, store.to_json()?.as_bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;

    if json {
        print_json(&serde_json::json!({
            "output": output.display().to_string(),
            "entries": store.len(),
            "geocoder": store.geocoder().map(|g| g.as_str()),
        }))?;
    } else {
        println!("Converted {} entries to {}", store.len(), output.display());
    }
    Ok(())
}
