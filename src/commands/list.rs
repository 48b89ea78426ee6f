use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ListArgs;
use crate::store::ResultStore;

pub fn run(args: ListArgs) -> Result<()> {
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

    let store = ResultStore::open_read_only(&db_path)?;
    let summaries = store.list_triage(args.min_deviation)?;

    info!(
        min_deviation = args.min_deviation,
        count = summaries.len(),
        "listed triage records"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.json {
        serde_json::to_writer_pretty(&mut out, &summaries)
            .context("failed to serialize triage listing")?;
        writeln!(&mut out)?;
        return Ok(());
    }

    if summaries.is_empty() {
        writeln!(
            &mut out,
            "no triage records with deviation >= {}",
            args.min_deviation
        )?;
        return Ok(());
    }

    writeln!(
        &mut out,
        "{:<16} {:<12} {:<8} {:>9}  {:<20}",
        "hand_id", "stakes", "game", "deviation", "persisted_at"
    )?;
    for summary in &summaries {
        writeln!(
            &mut out,
            "{:<16} {:<12} {:<8} {:>9.2}  {:<20}",
            summary.hand_id,
            summary.stakes,
            summary.game_type.as_str(),
            summary.deviation_score,
            summary.persisted_at
        )?;
    }

    Ok(())
}
