use crate::output::{print_json, print_table};
use anyhow::Context;
use geostate_core::store::{AnnotationStore, LoadMode};
use geostate_core::summary::summarize;
use std::path::Path;

pub fn run(store: &Path, json: bool) -> anyhow::Result<()> {
    let annotated = AnnotationStore::load(store, LoadMode::RequireExisting)
        .with_context(|| format!("failed to read {}", store.display()))?;
    let rows = summarize(&annotated);

    if json {
        print_json(&rows)?;
        return Ok(());
    }
    if rows.is_empty() {
        println!("No annotated points.");
        return Ok(());
    }
    print_table(
        &["STATE", "POINTS", "DAYS", "FIRST SEEN", "LAST SEEN"],
        rows.into_iter()
            .map(|r| {
                vec![
                    r.state,
                    r.points.to_string(),
                    r.days.to_string(),
                    r.first_seen,
                    r.last_seen,
                ]
            })
            .collect(),
    );
    Ok(())
}
