//! Attack signature rules.
//!
//! Rules are loaded once from a JSON file, compiled case-insensitively, and
//! scanned in file order against the decoded record. The first matching rule
//! wins. Which record fields are inspected is configuration, not matcher
//! logic; the default is the URL only.

use crate::decoder::{LogField, LogRecord};
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One rule as it appears in the rules file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    /// Unique identifier reported on match
    pub id: String,
    /// Human-readable explanation, not used by the matcher
    #[serde(default)]
    pub description: Option<String>,
    /// Regular expression source, compiled case-insensitively
    pub pattern: String,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub pattern: Regex,
}

impl Rule {
    /// Compile a rule definition. The pattern is made case-insensitive.
    pub fn compile(def: &RuleDef) -> anyhow::Result<Self> {
        let pattern = Regex::new(&format!("(?i){}", def.pattern))
            .with_context(|| format!("invalid pattern in rule '{}'", def.id))?;
        Ok(Self {
            id: def.id.clone(),
            pattern,
        })
    }
}

/// Load and compile rules from a JSON file, preserving file order. Any
/// invalid pattern fails the whole load; rules are validated before the run
/// starts, never during it.
pub fn load_rules(path: &Path) -> anyhow::Result<Vec<Rule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let defs: Vec<RuleDef> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse rules file {}", path.display()))?;

    defs.iter().map(Rule::compile).collect()
}

/// Scans decoded records against an ordered rule list.
pub struct RuleMatcher {
    rules: Vec<Rule>,
    inspect: Vec<LogField>,
}

impl RuleMatcher {
    /// Create a matcher inspecting only the URL field.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            inspect: vec![LogField::Url],
        }
    }

    /// Create a matcher inspecting the given fields, in order.
    pub fn with_fields(rules: Vec<Rule>, inspect: Vec<LogField>) -> Self {
        Self { rules, inspect }
    }

    /// Number of loaded rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Return the id of the first rule matching any inspected field, or
    /// `None` when nothing matches.
    pub fn scan(&self, record: &LogRecord) -> Option<&str> {
        for field in &self.inspect {
            let content = record.field(*field);
            for rule in &self.rules {
                if rule.pattern.is_match(content) {
                    return Some(&rule.id);
                }
            }
        }
        None
    }
}
