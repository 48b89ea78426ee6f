use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ExplainRunManifest, HandInventoryManifest, SolveRunManifest};
use crate::store::ResultStore;
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let inventory_path = manifest_dir.join("hand_inventory.json");
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("gto_triage.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    if inventory_path.exists() {
        let inventory: HandInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            hand_count = inventory.hand_count,
            source = %inventory.source_directory,
            "loaded hand inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "hand inventory manifest missing");
    }

    match latest_manifest(&manifest_dir, "solve_run_") {
        Some(path) => {
            let manifest: SolveRunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                completed_at = %manifest.completed_at,
                solver_url = %manifest.solver_url,
                scored = manifest.summary.hands_scored,
                failed = manifest.summary.hands_failed,
                unreadable = manifest.summary.files_unreadable,
                "latest solve run"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no solve run manifest found"),
    }

    match latest_manifest(&manifest_dir, "explain_run_") {
        Some(path) => {
            let manifest: ExplainRunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                completed_at = %manifest.completed_at,
                selection = %manifest.selection,
                explained = manifest.summary.explained,
                not_found = manifest.summary.not_found,
                failed = manifest.summary.failed,
                "latest explain run"
            );
        }
        None => warn!(path = %manifest_dir.display(), "no explain run manifest found"),
    }

    if db_path.exists() {
        let store = ResultStore::open_read_only(&db_path)?;
        let counts = store.counts()?;

        info!(
            path = %db_path.display(),
            triage_documents = counts.triage_documents,
            complete_documents = counts.complete_documents,
            distinct_hands = counts.distinct_hands,
            "result store status"
        );
    } else {
        warn!(path = %db_path.display(), "result store missing");
    }

    Ok(())
}

/// Most recent run manifest with the given prefix. Manifest filenames embed a
/// compact UTC timestamp, so the lexical maximum is the newest run.
fn latest_manifest(manifest_dir: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(manifest_dir).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(prefix) && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .max()
}
