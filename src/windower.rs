use crate::error::{AnalysisError, Result};
use crate::models::{Transcript, Window};

const TIME_EPSILON: f64 = 1e-9;

/// `ceil(duration / size)`, tolerant of floating point noise on exact multiples.
pub fn bin_count(duration_sec: f64, size_sec: f64) -> usize {
    if duration_sec <= 0.0 || size_sec <= 0.0 {
        return 0;
    }
    let raw = duration_sec / size_sec;
    let rounded = raw.round();
    let count = if (raw - rounded).abs() < TIME_EPSILON {
        rounded
    } else {
        raw.ceil()
    };
    (count as usize).max(1)
}

pub fn resolve_duration(transcript: &Transcript) -> Result<f64> {
    let duration = match transcript.duration_sec {
        Some(duration) => duration,
        None => transcript
            .segments
            .iter()
            .map(|span| span.end_sec)
            .fold(0.0, f64::max),
    };

    if !duration.is_finite() || duration <= 0.0 {
        return Err(AnalysisError::InvalidTranscript(format!(
            "duration must be positive, got {duration}"
        )));
    }
    Ok(duration)
}

fn validate_spans(transcript: &Transcript, duration: f64) -> Result<()> {
    let mut previous_start = 0.0;

    for (index, span) in transcript.segments.iter().enumerate() {
        if !span.start_sec.is_finite() || !span.end_sec.is_finite() {
            return Err(AnalysisError::InvalidTranscript(format!(
                "span {index} has a non-finite timestamp"
            )));
        }
        if span.start_sec < 0.0 {
            return Err(AnalysisError::InvalidTranscript(format!(
                "span {index} starts before zero ({})",
                span.start_sec
            )));
        }
        if span.end_sec < span.start_sec {
            return Err(AnalysisError::InvalidTranscript(format!(
                "span {index} ends at {} before it starts at {}",
                span.end_sec, span.start_sec
            )));
        }
        if span.start_sec < previous_start {
            return Err(AnalysisError::InvalidTranscript(format!(
                "timestamps are not monotonic at span {index} ({} < {previous_start})",
                span.start_sec
            )));
        }
        if span.end_sec > duration + TIME_EPSILON {
            return Err(AnalysisError::InvalidTranscript(format!(
                "span {index} ends at {} past the duration {duration}",
                span.end_sec
            )));
        }
        previous_start = span.start_sec;
    }

    Ok(())
}

/// Splits the transcript into contiguous windows covering `[0, duration]`.
/// A span belongs to the window containing its start; empty windows are kept.
pub fn build_windows(transcript: &Transcript, window_size_sec: f64) -> Result<Vec<Window>> {
    if !window_size_sec.is_finite() || window_size_sec <= 0.0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "window_size_sec must be positive, got {window_size_sec}"
        )));
    }

    let duration = resolve_duration(transcript)?;
    validate_spans(transcript, duration)?;

    let count = bin_count(duration, window_size_sec);
    let mut texts: Vec<Vec<&str>> = vec![Vec::new(); count];

    for span in &transcript.segments {
        let text = span.text.trim();
        if text.is_empty() {
            continue;
        }
        let index = ((span.start_sec / window_size_sec) as usize).min(count - 1);
        texts[index].push(text);
    }

    let windows = texts
        .into_iter()
        .enumerate()
        .map(|(id, parts)| Window {
            id,
            start_sec: id as f64 * window_size_sec,
            end_sec: ((id + 1) as f64 * window_size_sec).min(duration),
            text: parts.join(" "),
        })
        .collect();

    Ok(windows)
}
