use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::models::{Transcript, TranscriptSpan};

pub fn load(path: &Path) -> Result<Transcript> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => from_json(&std::fs::read_to_string(path)?),
        Some("csv") => from_csv(path),
        _ => Err(AnalysisError::InvalidTranscript(format!(
            "unsupported transcript format: {}",
            path.display()
        ))),
    }
}

pub fn from_json(content: &str) -> Result<Transcript> {
    Ok(serde_json::from_str(content)?)
}

/// Reads `start_sec,end_sec,text` rows. The duration is taken from the latest span end.
pub fn from_csv(path: &Path) -> Result<Transcript> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut segments = Vec::new();

    for row in reader.deserialize::<TranscriptSpan>() {
        segments.push(row?);
    }

    Ok(Transcript {
        duration_sec: None,
        segments,
    })
}
