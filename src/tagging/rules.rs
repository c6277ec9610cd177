//! Subject rule packs
//!
//! A rule pack is a YAML document listing the topics of one subject and the
//! phrase and formula rules that vote for them:
//!
//! ```yaml
//! subject: physics
//! version: "2024.1"
//! topics:
//!   - id: electricity
//!     name: Electricity
//!     description: Current, potential difference and resistance in circuits
//!     key_terms: [current, resistance, circuit]
//!     units: [A, V, Ω]
//! phrase_rules:
//!   - { pattern: "series circuit", topic: electricity, weight: 2.0 }
//! formula_rules:
//!   - { pattern: 'resistance\s*=\s*voltage\s*/\s*current', topic: electricity, weight: 5.0 }
//! ```
//!
//! Packs are loaded once, validated, compiled and then shared immutably
//! (`Arc<RulePack>`) across every paper of that subject.

use crate::cues::{bounded_pattern, KeyTermVocabulary};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Errors loading or validating a rule pack.
#[derive(Debug, thiserror::Error)]
pub enum RulePackError {
    #[error("cannot read rule pack {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("rule pack parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rule pack for '{0}' defines no topics")]
    NoTopics(String),
    #[error("duplicate topic id: {0}")]
    DuplicateTopic(String),
    #[error("rule '{pattern}' references unknown topic '{topic}'")]
    UnknownTopic { pattern: String, topic: String },
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("rule '{pattern}' has invalid weight {weight}")]
    InvalidWeight { pattern: String, weight: f64 },
    #[error("more than one rule pack for subject '{0}'")]
    DuplicateSubject(String),
    #[error("no rule pack loaded for subject '{0}'")]
    UnknownSubject(String),
}

/// A topic of the subject taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDef {
    pub id: String,
    pub name: String,
    /// Free-text description; the semantic fallback compares against it
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_terms: Vec<String>,
    #[serde(default)]
    pub units: Vec<String>,
}

impl TopicDef {
    /// Text compared against questions by the semantic fallback.
    pub fn semantic_text(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// One `pattern → topic → weight` rule as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub pattern: String,
    pub topic: String,
    pub weight: f64,
}

fn default_version() -> String {
    "0".to_string()
}

/// The deserialized, not yet validated, form of a rule pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePackSpec {
    pub subject: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub topics: Vec<TopicDef>,
    #[serde(default)]
    pub phrase_rules: Vec<RuleDef>,
    #[serde(default)]
    pub formula_rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Literal phrase, case-insensitive, word-bounded
    Phrase,
    /// Regular expression, case-insensitive
    Formula,
}

#[derive(Debug)]
struct CompiledRule {
    kind: RuleKind,
    regex: Regex,
    topic: usize,
    weight: f64,
}

/// Summed weights of the rules that fired for one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleWeights {
    pub phrase: f64,
    pub formula: f64,
}

impl RuleWeights {
    pub fn total(&self) -> f64 {
        self.phrase + self.formula
    }
}

/// A validated, compiled rule pack.
#[derive(Debug)]
pub struct RulePack {
    spec: RulePackSpec,
    rules: Vec<CompiledRule>,
    vocabulary: KeyTermVocabulary,
}

impl RulePack {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RulePackError> {
        let spec: RulePackSpec = serde_yaml::from_str(yaml)?;
        Self::compile(spec)
    }

    pub fn from_path(path: &Path) -> Result<Self, RulePackError> {
        let content = std::fs::read_to_string(path).map_err(|source| RulePackError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Validate a parsed pack and compile its rules.
    pub fn compile(spec: RulePackSpec) -> Result<Self, RulePackError> {
        if spec.topics.is_empty() {
            return Err(RulePackError::NoTopics(spec.subject));
        }

        let mut seen = HashSet::new();
        for topic in &spec.topics {
            if !seen.insert(topic.id.as_str()) {
                return Err(RulePackError::DuplicateTopic(topic.id.clone()));
            }
        }

        let phrases = spec.phrase_rules.iter().map(|r| (RuleKind::Phrase, r));
        let formulas = spec.formula_rules.iter().map(|r| (RuleKind::Formula, r));
        let mut rules = Vec::with_capacity(spec.phrase_rules.len() + spec.formula_rules.len());

        for (kind, rule) in phrases.chain(formulas) {
            let topic = spec
                .topics
                .iter()
                .position(|t| t.id == rule.topic)
                .ok_or_else(|| RulePackError::UnknownTopic {
                    pattern: rule.pattern.clone(),
                    topic: rule.topic.clone(),
                })?;
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(RulePackError::InvalidWeight {
                    pattern: rule.pattern.clone(),
                    weight: rule.weight,
                });
            }
            if rule.pattern.trim().is_empty() {
                return Err(RulePackError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    message: "pattern is blank and would match every question".to_string(),
                });
            }
            let source = match kind {
                RuleKind::Phrase => bounded_pattern(rule.pattern.trim()),
                RuleKind::Formula => format!("(?i){}", rule.pattern),
            };
            let regex = Regex::new(&source).map_err(|e| RulePackError::InvalidPattern {
                pattern: rule.pattern.clone(),
                message: e.to_string(),
            })?;
            rules.push(CompiledRule {
                kind,
                regex,
                topic,
                weight: rule.weight,
            });
        }

        let vocabulary =
            KeyTermVocabulary::new(spec.topics.iter().flat_map(|t| t.key_terms.iter()));
        debug!(
            subject = %spec.subject,
            topics = spec.topics.len(),
            rules = rules.len(),
            "compiled rule pack"
        );

        Ok(Self {
            spec,
            rules,
            vocabulary,
        })
    }

    pub fn subject(&self) -> &str {
        &self.spec.subject
    }

    pub fn version(&self) -> &str {
        &self.spec.version
    }

    /// Topics in definition order; tie-breaks follow this order.
    pub fn topics(&self) -> &[TopicDef] {
        &self.spec.topics
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Key terms of every topic, for cue extraction.
    pub fn vocabulary(&self) -> &KeyTermVocabulary {
        &self.vocabulary
    }

    /// Summed weights of the rules matching `text`, one slot per topic.
    /// A rule counts once however often it matches.
    pub fn score(&self, text: &str) -> Vec<RuleWeights> {
        let mut weights = vec![RuleWeights::default(); self.spec.topics.len()];
        for rule in self.rules.iter().filter(|r| r.regex.is_match(text)) {
            let slot = &mut weights[rule.topic];
            match rule.kind {
                RuleKind::Phrase => slot.phrase += rule.weight,
                RuleKind::Formula => slot.formula += rule.weight,
            }
        }
        weights
    }
}

/// One compiled rule pack per subject.
#[derive(Debug, Clone, Default)]
pub struct RulePackRegistry {
    packs: BTreeMap<String, Arc<RulePack>>,
}

impl RulePackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.yaml` / `.yml` file of a directory, in file-name order.
    pub fn load_dir(dir: &Path) -> Result<Self, RulePackError> {
        let io_err = |source| RulePackError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            registry.insert(RulePack::from_path(&path)?)?;
        }
        info!(dir = %dir.display(), subjects = registry.len(), "loaded rule packs");
        Ok(registry)
    }

    pub fn insert(&mut self, pack: RulePack) -> Result<Arc<RulePack>, RulePackError> {
        let key = pack.subject().to_lowercase();
        if self.packs.contains_key(&key) {
            return Err(RulePackError::DuplicateSubject(pack.subject().to_string()));
        }
        let pack = Arc::new(pack);
        self.packs.insert(key, Arc::clone(&pack));
        Ok(pack)
    }

    /// Case-insensitive lookup by subject.
    pub fn get(&self, subject: &str) -> Result<Arc<RulePack>, RulePackError> {
        self.packs
            .get(&subject.to_lowercase())
            .cloned()
            .ok_or_else(|| RulePackError::UnknownSubject(subject.to_string()))
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.packs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}
