//! Analysis configuration.
//!
//! Every knob the pipeline reads lives here and is passed down explicitly as an
//! immutable [`AnalysisConfig`]. Values missing from a TOML file fall back to the
//! documented defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::models::{BreakdownMode, SeverityTier, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub window_size_sec: f64,
    pub bin_size_sec: f64,
    /// A window is flagged when its score reaches this value.
    pub risk_threshold: f64,
    /// Minimum weighted contribution for a signal to count as triggered.
    pub trigger_floor: f64,
    pub peak_prominence: f64,
    pub max_severity: f64,
    pub excerpt_chars: usize,
    pub max_definition_checks: usize,
    pub breakdown_mode: BreakdownMode,
    pub weights: SignalWeights,
    pub tiers: TierBreakpoints,
    pub clarity: ClarityConfig,
    pub collector: CollectorConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size_sec: 10.0,
            bin_size_sec: 1.0,
            risk_threshold: 4.0,
            trigger_floor: 0.0,
            peak_prominence: 0.3,
            max_severity: 2.0,
            excerpt_chars: 160,
            max_definition_checks: 3,
            breakdown_mode: BreakdownMode::Weighted,
            weights: SignalWeights::default(),
            tiers: TierBreakpoints::default(),
            clarity: ClarityConfig::default(),
            collector: CollectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub concept_spike: f64,
    pub grounding_gap: f64,
    pub tmb: f64,
    pub visual_mismatch: f64,
    pub structure_order: f64,
    pub ramble_ratio: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            concept_spike: 1.0,
            grounding_gap: 1.3,
            tmb: 1.2,
            visual_mismatch: 1.5,
            structure_order: 1.4,
            ramble_ratio: 0.8,
        }
    }
}

impl SignalWeights {
    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::ConceptSpike => self.concept_spike,
            Signal::GroundingGap => self.grounding_gap,
            Signal::Tmb => self.tmb,
            Signal::VisualMismatch => self.visual_mismatch,
            Signal::StructureOrder => self.structure_order,
            Signal::RambleRatio => self.ramble_ratio,
        }
    }

    pub fn set(&mut self, signal: Signal, weight: f64) {
        let slot = match signal {
            Signal::ConceptSpike => &mut self.concept_spike,
            Signal::GroundingGap => &mut self.grounding_gap,
            Signal::Tmb => &mut self.tmb,
            Signal::VisualMismatch => &mut self.visual_mismatch,
            Signal::StructureOrder => &mut self.structure_order,
            Signal::RambleRatio => &mut self.ramble_ratio,
        };
        *slot = weight;
    }
}

/// Risk breakpoints for severity tiers: `< medium` is low, `< high` is medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBreakpoints {
    pub medium: f64,
    pub high: f64,
}

impl Default for TierBreakpoints {
    fn default() -> Self {
        Self {
            medium: 5.0,
            high: 7.5,
        }
    }
}

impl TierBreakpoints {
    pub fn tier_for(&self, risk: f64) -> SeverityTier {
        if risk < self.medium {
            SeverityTier::Low
        } else if risk < self.high {
            SeverityTier::Medium
        } else {
            SeverityTier::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarityTier {
    pub min_score: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarityConfig {
    pub normalization_factor: f64,
    /// Ordered by descending `min_score`; the first tier whose `min_score` is met wins.
    pub tiers: Vec<ClarityTier>,
}

impl Default for ClarityConfig {
    fn default() -> Self {
        let tier = |min_score, label: &str| ClarityTier {
            min_score,
            label: label.to_string(),
        };
        Self {
            normalization_factor: 8.0,
            tiers: vec![
                tier(90, "Judge Whisperer"),
                tier(70, "Solid Senior Engineer"),
                tier(50, "Wait...what are we building?"),
                tier(0, "3AM Red Bull PowerPoint"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub max_concurrency: usize,
    pub call_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            call_timeout_ms: 20_000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), doubling and capped.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| AnalysisError::InvalidConfig(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("window_size_sec", self.window_size_sec),
            ("bin_size_sec", self.bin_size_sec),
            ("max_severity", self.max_severity),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        let non_negative = [
            ("risk_threshold", self.risk_threshold),
            ("trigger_floor", self.trigger_floor),
            ("peak_prominence", self.peak_prominence),
            ("clarity.normalization_factor", self.clarity.normalization_factor),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }

        for signal in Signal::ALL {
            let weight = self.weights.get(signal);
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "weight for {signal} must be non-negative, got {weight}"
                )));
            }
        }

        if self.tiers.medium > self.tiers.high {
            return Err(AnalysisError::InvalidConfig(format!(
                "tier breakpoints out of order: medium {} > high {}",
                self.tiers.medium, self.tiers.high
            )));
        }

        if let Some(pair) = self
            .clarity
            .tiers
            .windows(2)
            .find(|pair| pair[0].min_score < pair[1].min_score)
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "clarity tiers must be ordered by descending min_score: {} ({}) before {} ({})",
                pair[0].label, pair[0].min_score, pair[1].label, pair[1].min_score
            )));
        }

        if self.collector.max_concurrency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "collector.max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.weights.get(Signal::GroundingGap), 1.3);
        assert_eq!(config.risk_threshold, 4.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            risk_threshold = 3.5
            bin_size_sec = 5.0

            [weights]
            tmb = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.risk_threshold, 3.5);
        assert_eq!(config.bin_size_sec, 5.0);
        assert_eq!(config.weights.tmb, 2.0);
        assert_eq!(config.weights.concept_spike, 1.0);
        assert_eq!(config.window_size_sec, 10.0);
    }

    #[test]
    fn rejects_non_positive_window_size() {
        let err = AnalysisConfig::from_toml("window_size_sec = 0.0").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_negative_weight() {
        let mut config = AnalysisConfig::default();
        config.weights.set(Signal::RambleRatio, -1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_clarity_tiers_out_of_order() {
        let err = AnalysisConfig::from_toml(
            r#"
            [[clarity.tiers]]
            min_score = 50
            label = "Middling"

            [[clarity.tiers]]
            min_score = 90
            label = "Excellent"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn tier_breakpoints_bucket_monotonically() {
        let tiers = TierBreakpoints::default();
        assert_eq!(tiers.tier_for(4.0), SeverityTier::Low);
        assert_eq!(tiers.tier_for(5.0), SeverityTier::Medium);
        assert_eq!(tiers.tier_for(7.49), SeverityTier::Medium);
        assert_eq!(tiers.tier_for(7.5), SeverityTier::High);
    }

    #[test]
    fn retry_delay_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.delay_ms(1), 100);
        assert_eq!(policy.delay_ms(2), 200);
        assert_eq!(policy.delay_ms(3), 350);
    }

    #[test]
    fn toml_round_trip_preserves_config() {
        let config = AnalysisConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(AnalysisConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn loads_config_file_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "breakdown_mode = \"count\"").unwrap();
        writeln!(file, "[collector]").unwrap();
        writeln!(file, "max_concurrency = 2").unwrap();
        file.flush().unwrap();

        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.breakdown_mode, BreakdownMode::Count);
        assert_eq!(config.collector.max_concurrency, 2);
        assert_eq!(config.collector.retry.max_attempts, 3);
    }
}
