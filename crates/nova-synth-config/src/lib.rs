//! Configuration for expression synthesis sessions.
//!
//! Every tunable the search, the evaluation manager and the side-effect handler consult lives
//! here, so callers thread one [`SynthConfig`] value through a session instead of mutating
//! process-wide state.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod logging;

pub use logging::{init_tracing, LogBuffer, LoggingConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Depth budget for the enumerative generator.
    #[serde(default = "SearchConfig::default_max_depth")]
    pub max_depth: u32,

    /// Extra depth granted to `??` holes inside a skeleton.
    ///
    /// A skeleton with a single hole already gets one level; this is added on top.
    #[serde(default)]
    pub extra_depth: u32,
}

impl SearchConfig {
    fn default_max_depth() -> u32 {
        1
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            extra_depth: 0,
        }
    }
}

/// Classes and methods that candidate expressions must never touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenylistConfig {
    /// Fully-qualified class names. Members of these classes are never used.
    #[serde(default = "DenylistConfig::default_classes")]
    pub classes: Vec<String>,

    /// Methods keyed by declaring class.
    #[serde(default = "DenylistConfig::default_methods")]
    pub methods: BTreeMap<String, Vec<String>>,
}

impl DenylistConfig {
    fn default_classes() -> Vec<String> {
        vec!["codehint.CodeHint".to_owned()]
    }

    fn default_methods() -> BTreeMap<String, Vec<String>> {
        let file_mutators = [
            "createNewFile",
            "delete",
            "mkdir",
            "mkdirs",
            "renameTo",
            "setLastModified",
            "setReadOnly",
        ];
        BTreeMap::from([(
            "java.io.File".to_owned(),
            file_mutators.iter().map(|s| (*s).to_owned()).collect(),
        )])
    }

    pub fn denies_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn denies_method(&self, class: &str, method: &str) -> bool {
        self.denies_class(class)
            || self
                .methods
                .get(class)
                .is_some_and(|methods| methods.iter().any(|m| m == method))
    }
}

impl Default for DenylistConfig {
    fn default() -> Self {
        Self {
            classes: Self::default_classes(),
            methods: Self::default_methods(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Nominal number of possibly-throwing candidates compiled into one batch.
    #[serde(default = "EvaluationConfig::default_batch_size")]
    pub batch_size: usize,

    /// Below `2 * batch_size` candidates, split the work into this many batches.
    #[serde(default = "EvaluationConfig::default_min_num_batches")]
    pub min_num_batches: usize,

    /// Heartbeat poll interval for the evaluation watchdog (in milliseconds).
    #[serde(default = "EvaluationConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Poll interval used while side effects are being tracked (in milliseconds).
    #[serde(default = "EvaluationConfig::default_effect_timeout_ms")]
    pub effect_timeout_ms: u64,
}

impl EvaluationConfig {
    fn default_batch_size() -> usize {
        100
    }

    fn default_min_num_batches() -> usize {
        4
    }

    fn default_timeout_ms() -> u64 {
        1_000
    }

    fn default_effect_timeout_ms() -> u64 {
        5_000
    }

    pub fn timeout(&self, tracking_effects: bool) -> Duration {
        if tracking_effects {
            Duration::from_millis(self.effect_timeout_ms)
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// Size of the batches used for `n` possibly-throwing candidates.
    pub fn batch_size_for(&self, n: usize) -> usize {
        let batch_size = self.batch_size.max(1);
        let min_batches = self.min_num_batches.max(1);
        if n >= 2 * batch_size {
            batch_size
        } else if n >= min_batches {
            n / min_batches
        } else {
            1
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            min_num_batches: Self::default_min_num_batches(),
            timeout_ms: Self::default_timeout_ms(),
            effect_timeout_ms: Self::default_effect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffectsConfig {
    /// Track and undo side effects of candidate evaluation.
    #[serde(default = "EffectsConfig::default_enabled")]
    pub enabled: bool,

    /// Number of array reads through one watchpoint before it is disarmed for the batch.
    #[serde(default = "EffectsConfig::default_access_threshold")]
    pub access_threshold: u32,

    /// Per-class instance caps under which watchpoints are installed once per instance.
    ///
    /// Classes with exactly one live instance are always split.
    #[serde(default = "EffectsConfig::default_instance_split")]
    pub instance_split: BTreeMap<String, usize>,

    /// Cap applied to `java.util` map types.
    #[serde(default = "EffectsConfig::default_map_instance_split")]
    pub map_instance_split: usize,
}

impl EffectsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_access_threshold() -> u32 {
        10
    }

    fn default_map_instance_split() -> usize {
        2
    }

    fn default_instance_split() -> BTreeMap<String, usize> {
        BTreeMap::from([
            ("java.lang.AbstractStringBuilder".to_owned(), usize::MAX),
            ("java.util.ArrayList".to_owned(), 10),
            ("java.util.Vector".to_owned(), 10),
            ("java.util.Hashtable".to_owned(), 10),
            ("java.util.Arrays$ArrayList".to_owned(), 10),
            ("java.util.AbstractList".to_owned(), 20),
        ])
    }

    /// Whether a field declared in `class` with `instances` live instances should be watched
    /// per instance rather than for every instance at once.
    pub fn split_per_instance(&self, class: &str, instances: usize) -> bool {
        if instances == 0 {
            return false;
        }
        if instances == 1 {
            return true;
        }
        if let Some(cap) = self.instance_split.get(class) {
            return instances <= *cap;
        }
        class.starts_with("java.util.") && class.contains("Map") && instances <= self.map_instance_split
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            access_threshold: Self::default_access_threshold(),
            instance_split: Self::default_instance_split(),
            map_instance_split: Self::default_map_instance_split(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub denylist: DenylistConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub effects: EffectsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl SynthConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: SynthConfig = toml::from_str(text)?;
        tracing::debug!(
            target: "nova.synth.config",
            max_depth = config.search.max_depth,
            batch_size = config.evaluation.batch_size,
            "loaded synthesis config"
        );
        Ok(config)
    }
}
