use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, KoseiError};

// Default values for correction knobs added after the initial release
fn default_max_attempts() -> u32 {
    3
}

fn default_short_text_word_cutoff() -> usize {
    10
}

fn default_short_text_threshold() -> f64 {
    0.3
}

fn default_long_text_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub correct: CorrectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint URL
    pub endpoint: String,
    /// API key; empty for local endpoints that accept anonymous requests
    pub api_key: String,
    /// Model used for correction
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum network retries for a single request
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectConfig {
    /// Number of segments per correction batch
    pub batch_size: usize,
    /// Number of batches processed concurrently
    pub concurrency: usize,
    /// Maximum call/validate attempts per batch
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Word count at or below which a text is considered short
    #[serde(default = "default_short_text_word_cutoff")]
    pub short_text_word_cutoff: usize,
    /// Minimum similarity ratio accepted for short texts
    #[serde(default = "default_short_text_threshold")]
    pub short_text_threshold: f64,
    /// Minimum similarity ratio accepted for everything else
    #[serde(default = "default_long_text_threshold")]
    pub long_text_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                endpoint: "https://api.openai.com".to_string(),
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.2,
                max_retries: 5,
            },
            correct: CorrectConfig {
                batch_size: 10,
                concurrency: 10,
                max_attempts: default_max_attempts(),
                short_text_word_cutoff: default_short_text_word_cutoff(),
                short_text_threshold: default_short_text_threshold(),
                long_text_threshold: default_long_text_threshold(),
            },
        }
    }
}

impl CorrectConfig {
    /// Similarity floor for one original text, based on its word count.
    pub fn similarity_threshold(&self, word_count: usize) -> f64 {
        if word_count <= self.short_text_word_cutoff {
            self.short_text_threshold
        } else {
            self.long_text_threshold
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KoseiError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| KoseiError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KoseiError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| KoseiError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.correct.similarity_threshold(5), 0.3);
        assert_eq!(config.correct.similarity_threshold(10), 0.3);
        assert_eq!(config.correct.similarity_threshold(11), 0.7);
    }

    #[test]
    fn test_missing_knobs_fall_back_to_defaults() {
        let toml_str = r#"
            [llm]
            endpoint = "http://localhost:11434"
            api_key = ""
            model = "llama3.2:3b"
            temperature = 0.2
            max_retries = 3

            [correct]
            batch_size = 20
            concurrency = 4
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.correct.batch_size, 20);
        assert_eq!(config.correct.max_attempts, 3);
        assert_eq!(config.correct.short_text_word_cutoff, 10);
        assert_eq!(config.correct.long_text_threshold, 0.7);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::default();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.llm.model, config.llm.model);
        assert_eq!(loaded.correct.batch_size, config.correct.batch_size);
    }
}
