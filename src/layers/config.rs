use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use strsim::levenshtein;

use crate::layers::matching::normalize_term;
use crate::layers::{ConfigError, StrategyNotFoundError, ValidationError};

const DEFAULT_MAX_RESULTS: usize = 20;
const DEFAULT_FETCH_LIMIT: usize = 100;

// Suggestions further away than this are noise.
const SUGGESTION_DISTANCE: usize = 4;

/// Relevance weight of one matched term from each set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWeights {
    pub required: u32,
    pub technology: u32,
    pub optional: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            required: 3,
            technology: 2,
            optional: 1,
        }
    }
}

/// A named rule set. Terms are stored normalized (lower case, single spaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStrategy {
    name: String,
    description: String,
    required_terms: BTreeSet<String>,
    optional_terms: BTreeSet<String>,
    technology_terms: BTreeSet<String>,
    max_results: usize,
}

impl SearchStrategy {
    pub fn new(name: impl Into<String>, max_results: usize) -> Result<Self, ValidationError> {
        if max_results == 0 {
            return Err(ValidationError::ZeroMaxResults);
        }
        Ok(Self {
            name: name.into(),
            description: String::new(),
            required_terms: BTreeSet::new(),
            optional_terms: BTreeSet::new(),
            technology_terms: BTreeSet::new(),
            max_results,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_required<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_terms.extend(normalize_all(terms));
        self
    }

    pub fn with_optional<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.optional_terms.extend(normalize_all(terms));
        self
    }

    pub fn with_technology<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.technology_terms.extend(normalize_all(terms));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn required_terms(&self) -> &BTreeSet<String> {
        &self.required_terms
    }

    pub fn optional_terms(&self) -> &BTreeSet<String> {
        &self.optional_terms
    }

    pub fn technology_terms(&self) -> &BTreeSet<String> {
        &self.technology_terms
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// True when the strategy has no terms at all and so matches every paper.
    pub fn is_unconstrained(&self) -> bool {
        self.required_terms.is_empty()
            && self.optional_terms.is_empty()
            && self.technology_terms.is_empty()
    }
}

fn normalize_all<I, S>(terms: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| normalize_term(t.as_ref()))
        .filter(|t| !t.is_empty())
}

/// Validated, immutable strategy catalog plus global search settings.
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    strategies: BTreeMap<String, SearchStrategy>,
    default_strategy: String,
    default_max_results: usize,
    fetch_limit: usize,
    weights: ScoringWeights,
}

#[derive(Deserialize)]
struct RawConfig {
    search_strategies: Option<BTreeMap<String, serde_yaml::Value>>,
    search_configuration: Option<RawSearchConfiguration>,
}

#[derive(Deserialize)]
struct RawSearchConfiguration {
    default_strategy: Option<String>,
    default_max_results: Option<i64>,
    fetch_limit: Option<i64>,
    #[serde(default)]
    weights: RawWeights,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawWeights {
    required: Option<u32>,
    technology: Option<u32>,
    optional: Option<u32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStrategy {
    description: String,
    #[serde(default)]
    required_terms: Vec<String>,
    #[serde(default)]
    optional_terms: Vec<String>,
    #[serde(default)]
    technology_terms: Vec<String>,
    max_results: Option<i64>,
}

impl KeywordConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded keyword configuration from {:?}", path);
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text).map_err(ConfigError::Malformed)?;

        let settings = raw.search_configuration.ok_or(ConfigError::InvalidSetting {
            field: "default_strategy",
            reason: "is required".to_string(),
        })?;
        let default_strategy = settings
            .default_strategy
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::InvalidSetting {
                field: "default_strategy",
                reason: "is required".to_string(),
            })?;
        let default_max_results =
            positive_setting("default_max_results", settings.default_max_results)?
                .unwrap_or(DEFAULT_MAX_RESULTS);
        let fetch_limit =
            positive_setting("fetch_limit", settings.fetch_limit)?.unwrap_or(DEFAULT_FETCH_LIMIT);
        let defaults = ScoringWeights::default();
        let weights = ScoringWeights {
            required: settings.weights.required.unwrap_or(defaults.required),
            technology: settings.weights.technology.unwrap_or(defaults.technology),
            optional: settings.weights.optional.unwrap_or(defaults.optional),
        };

        let raw_strategies = raw.search_strategies.unwrap_or_default();
        if raw_strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        let mut strategies = BTreeMap::new();
        for (name, value) in raw_strategies {
            let strategy = parse_strategy(&name, value, default_max_results)?;
            strategies.insert(name, strategy);
        }

        if !strategies.contains_key(&default_strategy) {
            return Err(ConfigError::UnknownDefaultStrategy(default_strategy));
        }

        Ok(Self {
            strategies,
            default_strategy,
            default_max_results,
            fetch_limit,
            weights,
        })
    }

    pub fn strategy(&self, name: &str) -> Result<&SearchStrategy, StrategyNotFoundError> {
        self.strategies.get(name).ok_or_else(|| {
            let available: Vec<String> = self.strategies.keys().cloned().collect();
            let suggestion = available
                .iter()
                .map(|candidate| (levenshtein(name, candidate), candidate))
                .filter(|(dist, _)| *dist <= SUGGESTION_DISTANCE)
                .min_by_key(|(dist, _)| *dist)
                .map(|(_, candidate)| candidate.clone());
            StrategyNotFoundError {
                name: name.to_string(),
                available,
                suggestion,
            }
        })
    }

    /// Strategies in name order.
    pub fn strategies(&self) -> impl Iterator<Item = &SearchStrategy> {
        self.strategies.values()
    }

    pub fn default_strategy_name(&self) -> &str {
        &self.default_strategy
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }
}

fn positive_setting(field: &'static str, value: Option<i64>) -> Result<Option<usize>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) if v > 0 => Ok(Some(v as usize)),
        Some(v) => Err(ConfigError::InvalidSetting {
            field,
            reason: format!("must be a positive integer, got {}", v),
        }),
    }
}

fn parse_strategy(
    name: &str,
    value: serde_yaml::Value,
    default_max_results: usize,
) -> Result<SearchStrategy, ConfigError> {
    let raw: RawStrategy =
        serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidStrategy {
            strategy: name.to_string(),
            reason: e.to_string(),
        })?;

    let max_results = match raw.max_results {
        None => default_max_results,
        Some(v) if v > 0 => v as usize,
        Some(v) => {
            return Err(ConfigError::InvalidField {
                strategy: name.to_string(),
                field: "max_results",
                reason: format!("must be a positive integer, got {}", v),
            })
        }
    };

    for (field, terms) in [
        ("required_terms", &raw.required_terms),
        ("optional_terms", &raw.optional_terms),
        ("technology_terms", &raw.technology_terms),
    ] {
        if terms.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::InvalidField {
                strategy: name.to_string(),
                field,
                reason: "contains a blank term".to_string(),
            });
        }
    }

    let strategy = SearchStrategy::new(name, max_results)
        .map_err(|e| ConfigError::InvalidField {
            strategy: name.to_string(),
            field: "max_results",
            reason: e.to_string(),
        })?
        .with_description(raw.description.trim())
        .with_required(&raw.required_terms)
        .with_optional(&raw.optional_terms)
        .with_technology(&raw.technology_terms);

    if strategy.is_unconstrained() {
        tracing::warn!("Strategy '{}' has no terms and will match every paper", name);
    }
    Ok(strategy)
}
