use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::{Args, ValueEnum};
use geostate_core::annotate::{annotate, dry_run, AnnotateRequest};
use geostate_core::config::Config;
use geostate_core::reconcile::{Invalidation, ReconcileStats};
use geostate_core::store::LoadMode;
use geostate_core::types::GeocoderId;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeocoderArg {
    Local,
    Osm,
}

impl From<GeocoderArg> for GeocoderId {
    fn from(arg: GeocoderArg) -> Self {
        match arg {
            GeocoderArg::Local => GeocoderId::Local,
            GeocoderArg::Osm => GeocoderId::Osm,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InvalidateArg {
    /// Entries whose timestamp no longer appears in the raw data
    Missing,
    /// Entries whose timestamp now carries a different coordinate
    Changed,
}

#[derive(Args)]
pub struct AnnotateArgs {
    /// Raw location-history exports, oldest first
    #[arg(short = 'r', long = "raw", required = true, num_args = 1..)]
    raw: Vec<PathBuf>,

    /// Annotated store to create or update
    #[arg(short = 'a', long = "annotated")]
    store: PathBuf,

    /// Previously annotated stores to reuse answers from
    #[arg(short = 'c', long = "cache", num_args = 1..)]
    cache: Vec<PathBuf>,

    /// Reuse a cached answer for the same coordinate at a different time
    #[arg(long)]
    match_coordinates: bool,

    /// Reverse-geocoding backend (default: the store's, else the config's)
    #[arg(long, value_enum)]
    geocoder: Option<GeocoderArg>,

    /// Contact email sent to the osm backend
    #[arg(long, env = "GEOSTATE_EMAIL")]
    email: Option<String>,

    /// Maximum backend calls this run
    #[arg(long)]
    limit: Option<usize>,

    /// Drop stored entries the raw data no longer supports
    #[arg(long, value_enum, conflicts_with = "strict")]
    invalidate: Vec<InvalidateArg>,

    /// Fail if any stored entry is missing or changed in the raw data
    #[arg(long)]
    strict: bool,

    /// Permit resolving with a different backend than the store records
    #[arg(long)]
    allow_geocoder_change: bool,

    /// Fail instead of starting a new store when the file is absent
    #[arg(long)]
    require_existing: bool,

    /// Classify points and report counts without calling the backend
    #[arg(long)]
    dry_run: bool,
}

pub fn run(config: Option<&Path>, args: AnnotateArgs, json: bool) -> anyhow::Result<()> {
    let config = super::config::load(config)?;
    let request = build_request(config, &args);

    if args.dry_run {
        let plan = dry_run(&request).context("dry run failed")?;
        if json {
            print_json(&plan)?;
        } else {
            print_table(
                &["METRIC", "COUNT"],
                vec![
                    row("raw points", plan.total_raw),
                    row("duplicates merged", plan.duplicates_merged),
                    row("already annotated", plan.already_annotated),
                    row("cache resolvable", plan.cache_resolvable),
                    row("needs resolution", plan.needs_resolution),
                ],
            );
        }
        return Ok(());
    }

    let stats = annotate(&request)
        .with_context(|| format!("failed to annotate {}", request.store.display()))?;
    if json {
        print_json(&stats)?;
    } else {
        print_stats(&stats);
    }

    if let Some(reason) = &stats.halted {
        anyhow::bail!("geocoding halted: {reason}");
    }
    Ok(())
}

fn build_request(config: Config, args: &AnnotateArgs) -> AnnotateRequest {
    let mut dispatch = config.dispatch;
    if args.limit.is_some() {
        dispatch.limit = args.limit;
    }

    let mut cache = config.cache;
    if !args.cache.is_empty() {
        cache.sources = args.cache.clone();
    }
    cache.match_coordinates |= args.match_coordinates;

    let invalidation = if args.strict {
        Invalidation::Reject
    } else if args.invalidate.is_empty() {
        Invalidation::Off
    } else {
        Invalidation::Remove {
            missing: args.invalidate.contains(&InvalidateArg::Missing),
            changed: args.invalidate.contains(&InvalidateArg::Changed),
        }
    };

    let mut request = AnnotateRequest::new(args.raw.clone(), args.store.clone());
    request.store_mode = if args.require_existing {
        LoadMode::RequireExisting
    } else {
        LoadMode::CreateIfMissing
    };
    request.geocoder = config.geocoder;
    request.requested = args.geocoder.map(GeocoderId::from);
    request.email = args.email.clone();
    request.dispatch = dispatch;
    request.cache = cache;
    request.invalidation = invalidation;
    request.allow_geocoder_change = args.allow_geocoder_change;
    request
}

fn row(label: &str, value: usize) -> Vec<String> {
    vec![label.to_string(), value.to_string()]
}

fn print_stats(stats: &ReconcileStats) {
    let mut rows = vec![
        row("raw points", stats.total_raw),
        row("duplicates merged", stats.duplicates_merged),
        row("already annotated", stats.already_annotated),
        row("from cache", stats.cache_resolved),
        row("newly resolved", stats.newly_resolved),
        row("failed", stats.failed),
        row("backend calls", stats.backend_calls),
    ];
    if stats.removed_missing > 0 {
        rows.push(row("removed (missing)", stats.removed_missing));
    }
    if stats.removed_changed > 0 {
        rows.push(row("removed (changed)", stats.removed_changed));
    }
    rows.push(row("remaining", stats.remaining_unresolved));
    print_table(&["METRIC", "COUNT"], rows);

    if stats.limit_reached {
        println!("\nCall limit reached; run again to continue.");
    }
}
