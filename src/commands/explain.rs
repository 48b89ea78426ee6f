use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::info;

use crate::cli::ExplainArgs;
use crate::explain::ExplanationClient;
use crate::model::ExplainRunManifest;
use crate::pipeline::{self, Selection};
use crate::store::ResultStore;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: ExplainArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("explain-{}", utc_compact_string(started_ts));

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("gto_triage.sqlite"));

    if !db_path.exists() {
        bail!(
            "no result store at {}; run `gto-triage solve` first",
            db_path.display()
        );
    }

    let selection = build_selection(&args)?;

    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "explain_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    let store = ResultStore::open(&db_path)?;
    let explainer = ExplanationClient::new(
        &args.explain_url,
        &args.explain_model,
        Duration::from_secs(args.explain_timeout_secs),
    )?;

    info!(
        run_id = %run_id,
        selection = %selection.describe(),
        model = %args.explain_model,
        "starting explanation batch"
    );

    let summary = pipeline::run_explanations(&store, &explainer, &selection)?;

    let manifest = ExplainRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        completed_at: now_utc_string(),
        explain_url: args.explain_url,
        explain_model: args.explain_model,
        selection: selection.describe(),
        db_path: db_path.display().to_string(),
        summary,
    };
    write_json_pretty(&run_manifest_path, &manifest)?;

    info!(path = %run_manifest_path.display(), "wrote explain run manifest");
    info!(
        explained = manifest.summary.explained,
        not_found = manifest.summary.not_found,
        failed = manifest.summary.failed,
        "explain command completed"
    );

    Ok(())
}

fn build_selection(args: &ExplainArgs) -> Result<Selection> {
    if !args.hands.is_empty() {
        let hand_ids: Vec<String> = args
            .hands
            .iter()
            .map(|hand_id| hand_id.trim().to_string())
            .filter(|hand_id| !hand_id.is_empty())
            .collect();

        if hand_ids.is_empty() {
            bail!("--hands requires at least one non-empty hand id");
        }
        return Ok(Selection::Hands(hand_ids));
    }

    if let Some(count) = args.top {
        if count == 0 {
            bail!("--top must be at least 1");
        }
        return Ok(Selection::Top(count));
    }

    if let Some(min_score) = args.min_score {
        return Ok(Selection::MinScore(min_score));
    }

    bail!("one of --hands, --top, or --min-score is required");
}
