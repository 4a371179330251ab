use crate::error::{AnalysisError, Result};
use crate::models::{HeatmapPeak, RiskScore, TimelineHeatmap};
use crate::windower::bin_count;

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn intersects(score: &RiskScore, bin_start: f64, bin_end: f64) -> bool {
    score.start_sec < bin_end && score.end_sec > bin_start
}

/// Highest-risk window touching the bin, earliest start on ties.
fn dominant_window(scores: &[RiskScore], bin_start: f64, bin_end: f64) -> Option<&RiskScore> {
    scores
        .iter()
        .filter(|score| intersects(score, bin_start, bin_end))
        .fold(None, |best: Option<&RiskScore>, candidate| match best {
            Some(best)
                if best.score > candidate.score
                    || (best.score == candidate.score && best.start_sec <= candidate.start_sec) =>
            {
                Some(best)
            }
            _ => Some(candidate),
        })
}

pub fn build_heatmap(
    scores: &[RiskScore],
    duration_sec: f64,
    bin_size_sec: f64,
    peak_prominence: f64,
) -> Result<TimelineHeatmap> {
    if !bin_size_sec.is_finite() || bin_size_sec <= 0.0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "bin_size_sec must be positive, got {bin_size_sec}"
        )));
    }

    let num_bins = bin_count(duration_sec, bin_size_sec);
    let bounds = |bin: usize| (bin as f64 * bin_size_sec, (bin + 1) as f64 * bin_size_sec);

    let raw: Vec<f64> = (0..num_bins)
        .map(|bin| {
            let (start, end) = bounds(bin);
            scores
                .iter()
                .filter(|score| intersects(score, start, end))
                .map(|score| score.score)
                .fold(0.0, f64::max)
        })
        .collect();

    let max_raw = raw.iter().copied().fold(0.0, f64::max);
    let normalized: Vec<f64> = if max_raw > 0.0 {
        raw.iter().map(|value| value / max_raw).collect()
    } else {
        vec![0.0; num_bins]
    };

    let mut peaks = Vec::new();
    for (bin, value) in normalized.iter().copied().enumerate() {
        if value <= peak_prominence {
            continue;
        }
        let left_lower = bin == 0 || normalized[bin - 1] < value;
        let right_lower = bin + 1 >= num_bins || normalized[bin + 1] < value;
        if !(left_lower && right_lower) {
            continue;
        }
        let (start, end) = bounds(bin);
        if let Some(window) = dominant_window(scores, start, end) {
            peaks.push(HeatmapPeak {
                t: bin,
                value: round_to(value, 3),
                segment_id: window.window_id,
            });
        }
    }

    Ok(TimelineHeatmap {
        bin_size_sec,
        duration_sec,
        values: normalized.into_iter().map(|value| round_to(value, 3)).collect(),
        peaks,
    })
}
