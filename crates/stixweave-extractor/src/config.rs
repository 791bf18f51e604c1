//! Configuration for the Extractor

use serde::{Deserialize, Serialize};
use std::time::Duration;
use stixweave_bundler::BundlerConfig;
use stixweave_gatekeeper::ValidationConfig;

/// How chunk loops are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One chunk after another
    #[default]
    Sequential,
    /// Up to `concurrency` chunks at once
    Parallel,
}

/// Backoff settings for transient capability failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Configuration for the Extractor
///
/// # Examples
///
/// ```
/// use stixweave_extractor::{ExecutionMode, ExtractorConfig};
///
/// let config = ExtractorConfig::from_toml(r#"
///     chunk_size = 3000
///     execution = "parallel"
///
///     [retry]
///     max_retries = 5
/// "#).unwrap();
///
/// assert_eq!(config.chunk_size, 3000);
/// assert_eq!(config.overlap, 200);
/// assert_eq!(config.execution, ExecutionMode::Parallel);
/// assert_eq!(config.retry.max_retries, 5);
/// assert_eq!(config.retry.base_delay_ms, 500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Maximum chunk length (characters)
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub overlap: usize,

    /// Reasoning cycles per chunk before it is marked incomplete
    pub max_iterations: usize,

    /// Conversation window size (turns)
    pub max_turns: usize,

    /// Bound on a single capability call (seconds)
    pub call_timeout_secs: u64,

    /// Chunk scheduling
    pub execution: ExecutionMode,

    /// Chunks in flight when `execution` is parallel
    pub concurrency: usize,

    /// On cancellation, post-process finished chunks instead of failing the run
    pub emit_partial_on_cancel: bool,

    /// Retry policy for transient failures
    pub retry: RetryConfig,

    /// Post-processing settings
    pub bundler: BundlerConfig,

    /// Rules for the draft-validation tool
    pub draft_validation: ValidationConfig,
}

impl ExtractorConfig {
    /// Get the per-call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if self.overlap >= self.chunk_size {
            return Err(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be greater than 0".to_string());
        }
        if self.max_turns < 4 {
            return Err("max_turns must be at least 4".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err("retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string());
        }
        self.draft_validation.validate()
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            overlap: 200,
            max_iterations: 5,
            max_turns: 24,
            call_timeout_secs: 120,
            execution: ExecutionMode::Sequential,
            concurrency: 4,
            emit_partial_on_cancel: false,
            retry: RetryConfig::default(),
            bundler: BundlerConfig::default(),
            draft_validation: ValidationConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// Fast preset: larger chunks, fewer cycles, parallel execution
    pub fn fast() -> Self {
        Self {
            chunk_size: 4_000,
            overlap: 200,
            max_iterations: 3,
            max_turns: 16,
            call_timeout_secs: 60,
            execution: ExecutionMode::Parallel,
            concurrency: 8,
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 250,
                max_delay_ms: 4_000,
            },
            ..Self::default()
        }
    }

    /// Thorough preset: smaller chunks, more cycles, strict draft validation
    pub fn thorough() -> Self {
        Self {
            chunk_size: 1_500,
            overlap: 300,
            max_iterations: 8,
            max_turns: 32,
            call_timeout_secs: 300,
            retry: RetryConfig {
                max_retries: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 16_000,
            },
            draft_validation: ValidationConfig::strict(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExtractorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 2_000);
        assert_eq!(config.overlap, 200);
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(ExtractorConfig::fast().validate().is_ok());
        assert!(ExtractorConfig::thorough().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let config = ExtractorConfig {
            overlap: 2_000,
            ..ExtractorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let config = ExtractorConfig {
            chunk_size: 0,
            overlap: 0,
            ..ExtractorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_retry_delays() {
        let mut config = ExtractorConfig::default();
        config.retry.base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ExtractorConfig::thorough();
        let toml_str = config.to_toml().unwrap();
        let parsed = ExtractorConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_nested_bundler_table() {
        let config = ExtractorConfig::from_toml(
            r#"
            [bundler]
            unknown_source_types = "drop"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.bundler.unknown_source_types,
            stixweave_bundler::UnknownTypePolicy::Drop
        );
        assert!(config.bundler.fill_defaults);
    }
}
