//! Configuration types for the log analyzer.

use crate::decoder::LogField;
use crate::verifier::{default_known_bots, KnownBot};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration. Every section has working defaults; a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Known crawler table
    pub bots: BotTableConfig,

    /// Decision cache locations
    pub cache: CacheConfig,

    /// Rule matcher settings
    pub matcher: MatcherConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            bots: BotTableConfig::default(),
            cache: CacheConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse YAML config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON config {}", path.display()))?
        };
        Ok(config)
    }
}

/// Known crawler table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotTableConfig {
    /// Ordered crawler entries; the first name found in a user agent decides
    /// which suffixes are checked.
    pub known_bots: Vec<KnownBot>,
}

impl Default for BotTableConfig {
    fn default() -> Self {
        Self {
            known_bots: default_known_bots(),
        }
    }
}

/// Where the two decision sets persist between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Verified crawler IPs
    pub verified_path: PathBuf,

    /// Spoofed crawler IPs
    pub spoofed_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            verified_path: PathBuf::from("verified_bots.json"),
            spoofed_path: PathBuf::from("spoofed_bots.json"),
        }
    }
}

/// Rule matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Record fields the matcher inspects, in order.
    pub inspect_fields: Vec<LogField>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            inspect_fields: vec![LogField::Url],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.bots.known_bots.len(), 9);
        assert_eq!(config.bots.known_bots[0].name, "Googlebot");
        assert_eq!(config.cache.verified_path, PathBuf::from("verified_bots.json"));
        assert_eq!(config.matcher.inspect_fields, vec![LogField::Url]);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "bots": {
                "known_bots": [
                    {"name": "TestBot", "suffixes": [".test.example"]}
                ]
            },
            "cache": {
                "verified_path": "/var/cache/verified.json",
                "spoofed_path": "/var/cache/spoofed.json"
            },
            "matcher": {
                "inspect_fields": ["url", "referrer"]
            }
        }"#;

        let config: AnalyzerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bots.known_bots.len(), 1);
        assert_eq!(config.bots.known_bots[0].name, "TestBot");
        assert_eq!(
            config.matcher.inspect_fields,
            vec![LogField::Url, LogField::Referrer]
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let json = r#"{"cache": {"verified_path": "v.json", "spoofed_path": "s.json"}}"#;
        let config: AnalyzerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bots.known_bots.len(), 9);
        assert_eq!(config.cache.verified_path, PathBuf::from("v.json"));
    }

    #[test]
    fn test_config_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "matcher:\n  inspect_fields:\n    - url\n    - user_agent\n",
        )
        .unwrap();

        let config = AnalyzerConfig::from_file(&path).unwrap();
        assert_eq!(
            config.matcher.inspect_fields,
            vec![LogField::Url, LogField::UserAgent]
        );
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = AnalyzerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AnalyzerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.bots.known_bots.len(), config.bots.known_bots.len());
    }
}
