//! Tunable pipeline configuration
//!
//! Every weight and threshold the components use lives here. Defaults are
//! empirical starting points; subject-specific values can be supplied as a
//! YAML file where any omitted field keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for the whole per-paper pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmenter: SegmenterConfig,
    pub linker: LinkerConfig,
    pub tagger: TaggerConfig,
    pub semantic: SemanticConfig,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Reject weights and thresholds outside their meaningful ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.linker.weights;
        let t = &self.tagger.weights;
        let weights = [
            ("linker.weights.key", l.key),
            ("linker.weights.marks", l.marks),
            ("linker.weights.cues", l.cues),
            ("tagger.weights.lexical", t.lexical),
            ("tagger.weights.cue", t.cue),
            ("tagger.weights.structural", t.structural),
            ("tagger.weights.semantic", t.semantic),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.tagger.floor) {
            return Err(ConfigError::Invalid(format!(
                "tagger.floor must be within [0, 1], got {}",
                self.tagger.floor
            )));
        }
        if self.tagger.saturation <= 0.0 || !self.tagger.saturation.is_finite() {
            return Err(ConfigError::Invalid("tagger.saturation must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Fence segmenter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Fragments searched after a leading number for a capitalized word
    pub header_lookahead: usize,
    /// Pages with fewer non-whitespace characters raise the OCR flag.
    /// Pages holding nothing but furniture ("BLANK PAGE", "Turn over",
    /// "DO NOT WRITE IN THIS AREA", a page number) or no fragments at all
    /// are not counted.
    pub min_chars_per_page: usize,
    /// Fraction of page height at top and bottom treated as the page-number band
    pub page_number_margin: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            header_lookahead: 5,
            min_chars_per_page: 25,
            page_number_margin: 0.05,
        }
    }
}

/// Weights of the link confidence formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkWeights {
    pub key: f64,
    pub marks: f64,
    pub cues: f64,
}

impl Default for LinkWeights {
    fn default() -> Self {
        Self {
            key: 0.4,
            marks: 0.3,
            cues: 0.3,
        }
    }
}

/// Markscheme linker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    pub weights: LinkWeights,
    /// Fragments sampled from the start of the markscheme for format detection
    pub detection_window: usize,
    /// Links below this confidence (but above zero) are flagged
    pub low_confidence: f64,
    /// Maximum characters kept in a link snippet
    pub snippet_chars: usize,
    /// Vertical distance within which fragments share a table row
    pub row_tolerance: f64,
    /// Horizontal slack for "left margin" question numbers
    pub margin_tolerance: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            weights: LinkWeights::default(),
            detection_window: 200,
            low_confidence: 0.5,
            snippet_chars: 200,
            row_tolerance: 3.0,
            margin_tolerance: 30.0,
        }
    }
}

/// Weights of the topic final-score combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagWeights {
    pub lexical: f64,
    pub cue: f64,
    pub structural: f64,
    pub semantic: f64,
}

impl Default for TagWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            cue: 0.3,
            structural: 0.1,
            semantic: 0.2,
        }
    }
}

/// Topic tagger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    pub weights: TagWeights,
    /// Minimum final score for a kept tag
    pub floor: f64,
    /// Maximum tags kept per question
    pub cap: usize,
    /// Summed rule weight at which a rule signal saturates to 1.0
    pub saturation: f64,
    /// Rule evidence below which a question is sent to the semantic fallback
    pub min_evidence: f64,
    pub unit_bonus: f64,
    pub diagram_bonus: f64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            weights: TagWeights::default(),
            floor: 0.3,
            cap: 4,
            saturation: 3.0,
            min_evidence: 0.3,
            unit_bonus: 0.5,
            diagram_bonus: 0.5,
        }
    }
}

/// External semantic-similarity call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub timeout_ms: u64,
    /// Minimum delay between two calls to the service
    pub min_interval_ms: u64,
    /// Concurrent calls allowed across all papers
    pub max_in_flight: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            min_interval_ms: 250,
            max_in_flight: 1,
        }
    }
}

impl SemanticConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}
