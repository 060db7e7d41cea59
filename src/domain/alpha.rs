//! Blending of per-source expected-return scores.

use std::collections::HashMap;

use super::signal::ScoreVector;

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Combine score vectors into one score per code in `universe`.
///
/// Each source is scaled by its own standard deviation (not demeaned), then
/// sources are summed per code. A code a source did not score contributes
/// zero for that source. A source with zero or non-finite spread contributes
/// zero everywhere.
pub fn combine_scores(universe: &[String], sources: &[ScoreVector]) -> Vec<f64> {
    let mut combined: HashMap<&str, f64> = HashMap::with_capacity(universe.len());

    for source in sources {
        let sd = std_dev(&source.scores);
        if !(sd.is_finite() && sd > 0.0) {
            log::warn!(
                "source {} has degenerate score spread ({}), ignoring it",
                source.source,
                sd
            );
            continue;
        }
        for (code, score) in source.codes.iter().zip(&source.scores) {
            *combined.entry(code.as_str()).or_insert(0.0) += score / sd;
        }
    }

    universe
        .iter()
        .map(|code| combined.get(code.as_str()).copied().unwrap_or(0.0))
        .collect()
}
