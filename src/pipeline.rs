use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::breakdown::build_breakdown;
use crate::clarity;
use crate::collaborators::Collaborators;
use crate::collector;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::issues::build_issues;
use crate::models::{RunReport, Transcript};
use crate::risk;
use crate::timeline::build_heatmap;
use crate::windower::build_windows;

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<AnalysisConfig>,
    collaborators: Arc<dyn Collaborators>,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig, collaborators: Arc<dyn Collaborators>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            collaborators,
        })
    }

    /// Runs one analysis. Only invalid input fails the run; collaborator
    /// failures end up in `RunReport::warnings`.
    pub async fn run(
        &self,
        transcript: &Transcript,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        let config = self.config.as_ref();

        let windows = build_windows(transcript, config.window_size_sec)?;
        let duration_sec = windows.last().map(|window| window.end_sec).unwrap_or(0.0);

        let collection =
            collector::collect(&windows, Arc::clone(&self.collaborators), config, cancel).await;
        let scores = risk::score_all(&windows, &collection.observations, config)?;

        let (issues, issue_warnings) = build_issues(
            &windows,
            &collection.observations,
            &scores,
            self.collaborators.as_ref(),
            config,
        )
        .await;

        let heatmap = build_heatmap(
            &scores,
            duration_sec,
            config.bin_size_sec,
            config.peak_prominence,
        )?;
        let breakdown = build_breakdown(&issues, config.breakdown_mode);
        let clarity = clarity::summarize(&scores, &config.clarity);

        let mut warnings = collection.warnings;
        warnings.extend(issue_warnings);
        warnings.sort();

        info!(
            windows = windows.len(),
            flagged = risk::flagged(&scores, config.risk_threshold).len(),
            warnings = warnings.len(),
            clarity = clarity.score,
            "analysis complete"
        );

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            duration_sec,
            window_count: windows.len(),
            scores,
            issues,
            heatmap,
            breakdown,
            clarity,
            warnings,
        })
    }
}
