use crate::model::SolverResult;

const EV_LOSS_WEIGHT: f64 = 10.0;
const PURE_STRATEGY_BONUS: f64 = 0.5;
const MIXED_STRATEGY_BONUS: f64 = 0.2;
const MIXED_BAND_LOW: f64 = 0.3;
const MIXED_BAND_HIGH: f64 = 0.7;

/// Triage heuristic, not a validated EV-loss metric: amplifies detected value
/// loss and rewards instructive frequency spots. This is the sole ranking key
/// for the explanation stage, so thresholds and rounding must stay stable.
pub fn deviation_score(result: &SolverResult) -> f64 {
    let mut total = 0.0;

    for value in result.ev_deltas.values() {
        if *value < 0.0 {
            total += value.abs() * EV_LOSS_WEIGHT;
        }
    }

    for value in result.frequencies.values() {
        if *value == 0.0 || *value == 1.0 {
            total += PURE_STRATEGY_BONUS;
        } else if (MIXED_BAND_LOW..=MIXED_BAND_HIGH).contains(value) {
            total += MIXED_STRATEGY_BONUS;
        }
    }

    (total * 100.0).round() / 100.0
}
