use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::cli::SolveArgs;
use crate::model::SolveRunManifest;
use crate::parser::HandParser;
use crate::pipeline;
use crate::solver::SolverClient;
use crate::store::ResultStore;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: SolveArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("solve-{}", utc_compact_string(started_ts));

    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("solve_run_{}.json", utc_compact_string(started_ts)))
    });
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("gto_triage.sqlite"));

    info!(
        run_id = %run_id,
        hands_dir = %args.hands_dir.display(),
        solver_url = %args.solver_url,
        "starting solve batch"
    );

    let files = discover_hand_files(&args.hands_dir, &args.extension)?;
    let store = ResultStore::open(&db_path)?;
    let solver = SolverClient::new(
        &args.solver_url,
        Duration::from_secs(args.probe_timeout_secs),
        Duration::from_secs(args.submit_timeout_secs),
    )?;
    let parser = HandParser::new()?;

    let summary = pipeline::run_solve_batch(&store, &solver, &parser, &files)?;

    let manifest = SolveRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        completed_at: now_utc_string(),
        solver_url: args.solver_url,
        hands_dir: args.hands_dir.display().to_string(),
        db_path: db_path.display().to_string(),
        summary,
    };
    write_json_pretty(&run_manifest_path, &manifest)?;

    info!(path = %run_manifest_path.display(), "wrote solve run manifest");
    info!(
        discovered = manifest.summary.files_discovered,
        scored = manifest.summary.hands_scored,
        failed = manifest.summary.hands_failed,
        "solve command completed"
    );

    Ok(())
}

/// Hand files under `hands_dir` with the given extension, sorted by path so a
/// batch always processes in a stable input order.
pub fn discover_hand_files(hands_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let entries = fs::read_dir(hands_dir)
        .with_context(|| format!("failed to read {}", hands_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", hands_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
