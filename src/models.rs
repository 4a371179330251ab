use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clarity defect categories. Declaration order is the canonical tie-break order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ConceptSpike,
    GroundingGap,
    Tmb,
    VisualMismatch,
    StructureOrder,
    RambleRatio,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::ConceptSpike,
        Signal::GroundingGap,
        Signal::Tmb,
        Signal::VisualMismatch,
        Signal::StructureOrder,
        Signal::RambleRatio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ConceptSpike => "concept_spike",
            Self::GroundingGap => "grounding_gap",
            Self::Tmb => "tmb",
            Self::VisualMismatch => "visual_mismatch",
            Self::StructureOrder => "structure_order",
            Self::RambleRatio => "ramble_ratio",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::ConceptSpike => "Concept Spike",
            Self::GroundingGap => "Grounding Gap",
            Self::Tmb => "Trust Me Bro",
            Self::VisualMismatch => "Visual Mismatch",
            Self::StructureOrder => "Structure Order",
            Self::RambleRatio => "Ramble Ratio",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSpan {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub duration_sec: Option<f64>,
    pub segments: Vec<TranscriptSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Hook,
    Problem,
    UserContext,
    Solution,
    Demo,
    Architecture,
    Metrics,
    Closing,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RambleResult {
    pub filler_ratio: f64,
    pub filler_count: usize,
    pub total_words: usize,
    pub repeated_phrases: Vec<String>,
    pub severity: f64,
}

/// Structured extractor output kept alongside the severities so that issue
/// evidence can be assembled without a second extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationContext {
    pub terms: Vec<String>,
    pub ungrounded_terms: Vec<String>,
    pub claims: Vec<String>,
    pub evidence: Vec<String>,
    pub role: Option<Role>,
    pub structure_violations: Vec<String>,
    pub ramble: RambleResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalObservation {
    pub window_id: usize,
    pub severities: BTreeMap<Signal, f64>,
    pub unavailable: BTreeSet<Signal>,
    pub context: ObservationContext,
}

impl SignalObservation {
    /// All-zero observation with every signal unavailable.
    pub fn failed(window_id: usize) -> Self {
        Self {
            window_id,
            severities: Signal::ALL.iter().map(|s| (*s, 0.0)).collect(),
            unavailable: Signal::ALL.iter().copied().collect(),
            context: ObservationContext::default(),
        }
    }

    pub fn is_available(&self, signal: Signal) -> bool {
        !self.unavailable.contains(&signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contribution {
    pub signal: Signal,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScore {
    pub window_id: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub score: f64,
    pub triggered: Vec<Contribution>,
}

impl RiskScore {
    pub fn triggered_signals(&self) -> Vec<Signal> {
        self.triggered.iter().map(|c| c.signal).collect()
    }

    /// A zero score is never flagged, even with a zero threshold.
    pub fn is_flagged(&self, risk_threshold: f64) -> bool {
        self.score > 0.0 && self.score >= risk_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    pub excerpt: String,
    pub terms: Vec<String>,
    pub ungrounded_terms: Vec<String>,
    pub claims: Vec<String>,
    pub evidence_cues: Vec<String>,
    pub structure_violations: Vec<String>,
    pub filler_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelFix {
    pub label: String,
    pub explanation: String,
    pub fix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub kind: String,
    pub honest: String,
    pub brutal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub segment_id: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub risk: f64,
    pub severity_tier: SeverityTier,
    pub signals_triggered: Vec<Signal>,
    pub signal_contributions: Vec<Contribution>,
    pub label: String,
    pub explanation: String,
    pub evidence: Evidence,
    pub fix: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPeak {
    pub t: usize,
    pub value: f64,
    pub segment_id: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineHeatmap {
    pub bin_size_sec: f64,
    pub duration_sec: f64,
    pub values: Vec<f64>,
    pub peaks: Vec<HeatmapPeak>,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BreakdownMode {
    #[default]
    Weighted,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownItem {
    pub signal: Signal,
    pub weight: f64,
    pub percent: f64,
    pub segments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBreakdown {
    pub mode: BreakdownMode,
    pub total_weight: f64,
    pub items: Vec<BreakdownItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaritySummary {
    pub score: u8,
    pub tier: String,
    pub total_risk: f64,
    pub window_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RunWarning {
    pub window_id: usize,
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub duration_sec: f64,
    pub window_count: usize,
    pub scores: Vec<RiskScore>,
    pub issues: Vec<Issue>,
    pub heatmap: TimelineHeatmap,
    pub breakdown: SignalBreakdown,
    pub clarity: ClaritySummary,
    pub warnings: Vec<RunWarning>,
}
