use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::commands::solve::discover_hand_files;
use crate::model::{HandFileEntry, HandInventoryManifest};
use crate::parser::{HandParser, UNKNOWN_SENTINEL};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.hands_dir, &args.extension)?;

    if args.dry_run {
        info!(
            hand_count = manifest.hand_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.cache_root.join("manifests").join("hand_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote hand inventory manifest");
    info!(hand_count = manifest.hand_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(hands_dir: &Path, extension: &str) -> Result<HandInventoryManifest> {
    let files = discover_hand_files(hands_dir, extension)?;
    if files.is_empty() {
        bail!("no hand files found in {}", hands_dir.display());
    }

    let parser = HandParser::new()?;
    let mut hands = Vec::with_capacity(files.len());

    for path in files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        let sha256 = sha256_file(&path)?;
        let hand_id = match fs::read_to_string(&path) {
            Ok(text) => parser.parse(&text).hand_id,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "hand file is not valid UTF-8 text");
                UNKNOWN_SENTINEL.to_string()
            }
        };

        hands.push(HandFileEntry {
            filename,
            sha256,
            hand_id,
        });
    }

    Ok(HandInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: hands_dir.display().to_string(),
        hand_count: hands.len(),
        hands,
    })
}
