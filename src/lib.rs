//! LogSleuth access log analyzer
//!
//! Scans web-server access logs, reverses obfuscation in request fields,
//! filters out DNS-verified crawlers, and flags remaining requests matching
//! known attack signatures.
//!
//! # Features
//!
//! - Combined-format log parsing with layered decoding (percent-encoding,
//!   byte escapes, base64 path segments)
//! - Crawler spoofing detection via reverse/forward DNS cross-check
//! - Persistent one-way decision cache (verified/spoofed IP sets)
//! - Ordered regex signature matching over decoded fields
//!
//! # Example
//!
//! ```ignore
//! use logsleuth::decoder;
//! use logsleuth::rules::{load_rules, RuleMatcher};
//!
//! let rules = load_rules(Path::new("rules.json"))?;
//! let matcher = RuleMatcher::new(rules);
//! if let Some((decoded, record)) = decoder::decode_line(&line) {
//!     if let Some(rule_id) = matcher.scan(&record) {
//!         println!("{lineno} {rule_id} {decoded}");
//!     }
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod dns;
pub mod rules;
pub mod store;
pub mod verifier;

pub use config::AnalyzerConfig;
pub use decoder::{decode_line, LogField, LogRecord};
pub use dns::{Dns, SystemDns};
pub use rules::{load_rules, Rule, RuleMatcher};
pub use store::{DecisionStore, JsonFileStore};
pub use verifier::{default_known_bots, BotVerifier, KnownBot};
