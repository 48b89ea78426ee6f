use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::model::{GameType, HandRecord};
use crate::util::now_utc_string;

pub const UNKNOWN_SENTINEL: &str = "unknown";

/// Heuristic extractor for free-text hand histories. Construction compiles the
/// header patterns once; parsing itself is total and never fails.
pub struct HandParser {
    hand_id_pattern: Regex,
    stakes_pattern: Regex,
}

impl HandParser {
    pub fn new() -> Result<Self> {
        let hand_id_pattern =
            Regex::new(r"#(\S+)").context("failed to compile hand id pattern")?;
        let stakes_pattern =
            Regex::new(r"\$(\d+(?:\.\d+)?)").context("failed to compile stakes pattern")?;

        Ok(Self {
            hand_id_pattern,
            stakes_pattern,
        })
    }

    /// Parse a transcript into a record. Unparseable fields degrade to sentinel
    /// values so a malformed hand never aborts a batch; downstream treats
    /// "unknown" stakes or game type as first-class.
    pub fn parse(&self, text: &str) -> HandRecord {
        let header = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");

        let hand_id = self.extract_hand_id(header);
        let stakes = self.extract_stakes(header);
        let game_type = extract_game_type(header);

        if hand_id == UNKNOWN_SENTINEL || stakes == UNKNOWN_SENTINEL {
            debug!(
                hand_id = %hand_id,
                stakes = %stakes,
                game_type = game_type.as_str(),
                "header only partially parsed"
            );
        }

        HandRecord {
            hand_id,
            observed_at: now_utc_string(),
            stakes,
            game_type,
            raw_text: text.to_string(),
        }
    }

    fn extract_hand_id(&self, header: &str) -> String {
        self.hand_id_pattern
            .captures(header)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_SENTINEL.to_string())
    }

    fn extract_stakes(&self, header: &str) -> String {
        let mut tokens = self
            .stakes_pattern
            .captures_iter(header)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()));

        match (tokens.next(), tokens.next()) {
            // Historical export format: only the first token keeps its
            // currency symbol. Stored artifacts already use this shape.
            (Some(small), Some(big)) => format!("${small}/{big}"),
            _ => UNKNOWN_SENTINEL.to_string(),
        }
    }
}

fn extract_game_type(header: &str) -> GameType {
    if header.contains("Holdem") {
        GameType::Holdem
    } else if header.contains("Omaha") {
        GameType::Omaha
    } else {
        GameType::Unknown
    }
}
