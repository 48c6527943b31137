//! Crawler authenticity verification.
//!
//! A user agent claiming to be Googlebot proves nothing; the IP has to back
//! the claim. Verification is the classic two-step cross-check:
//! reverse-resolve the IP, require the hostname to end in one of the
//! crawler's published domains, then forward-resolve the hostname and require
//! it to point back at the same IP.
//!
//! Results are cached in two persistent sets of IP strings. A decision is
//! one-way and terminal: an IP placed in `verified` or `spoofed` never moves
//! for the life of the cache.

use crate::dns::Dns;
use crate::store::DecisionStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// One known crawler: display name plus the reverse-DNS domain suffixes its
/// operator publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownBot {
    /// Name as it appears in User-Agent strings (e.g. "Googlebot")
    pub name: String,
    /// Accepted reverse-DNS suffixes (e.g. ".googlebot.com")
    pub suffixes: Vec<String>,
}

impl KnownBot {
    /// Convenience constructor used by the default table and tests.
    pub fn new(name: &str, suffixes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The built-in crawler table. Entry order matters: the first entry whose
/// name appears in the user agent decides the verification.
pub fn default_known_bots() -> Vec<KnownBot> {
    vec![
        KnownBot::new("Googlebot", &[".googlebot.com"]),
        KnownBot::new("Bingbot", &[".search.msn.com"]),
        KnownBot::new("AhrefsBot", &[".ahrefs.com", ".ahrefs.net"]),
        KnownBot::new("YandexBot", &[".yandex.ru", ".yandex.com", ".yandex.net"]),
        KnownBot::new("SemrushBot", &[".semrush.com"]),
        KnownBot::new("DuckDuckBot", &[".duckduckgo.com"]),
        KnownBot::new("MJ12bot", &[".majestic12.co.uk"]),
        KnownBot::new("Slurp", &[".crawl.yahoo.net"]),
        KnownBot::new("Applebot", &[".apple.com"]),
    ]
}

/// Decides whether an (IP, user agent) pair is a legitimate crawler.
///
/// Sole owner and mutator of the two decision sets; they are loaded from the
/// stores at construction and written back exactly once by [`flush`], which
/// also runs on drop if it has not been called.
///
/// [`flush`]: BotVerifier::flush
pub struct BotVerifier {
    known_bots: Vec<KnownBot>,
    verified: HashSet<String>,
    spoofed: HashSet<String>,
    dns: Box<dyn Dns>,
    verified_store: Box<dyn DecisionStore>,
    spoofed_store: Box<dyn DecisionStore>,
    flushed: bool,
}

impl BotVerifier {
    /// Create a verifier with the given crawler table, resolver and decision
    /// stores. Unreadable stores degrade to empty sets.
    pub fn new(
        known_bots: Vec<KnownBot>,
        dns: Box<dyn Dns>,
        verified_store: Box<dyn DecisionStore>,
        spoofed_store: Box<dyn DecisionStore>,
    ) -> Self {
        let verified = verified_store.load();
        let spoofed = spoofed_store.load();
        info!(
            verified = verified.len(),
            spoofed = spoofed.len(),
            "loaded bot decision caches"
        );

        Self {
            known_bots,
            verified,
            spoofed,
            dns,
            verified_store,
            spoofed_store,
            flushed: false,
        }
    }

    /// Decide whether the request comes from a legitimate known crawler.
    ///
    /// Cached decisions answer without DNS traffic. An uncached IP whose user
    /// agent names a known crawler goes through the DNS cross-check and the
    /// outcome is recorded permanently. A user agent that names no known
    /// crawler returns false without recording anything: not claiming to be a
    /// bot is not evidence of spoofing, so it must not poison the spoofed set.
    pub fn is_valid_bot(&mut self, ip: &str, user_agent: &str) -> bool {
        if self.verified.contains(ip) {
            return true;
        }
        if self.spoofed.contains(ip) {
            return false;
        }

        let ua_lower = user_agent.to_lowercase();
        // First matching entry wins; later entries are never consulted, even
        // when the first claim fails both DNS steps.
        let claimed = self
            .known_bots
            .iter()
            .find(|bot| ua_lower.contains(&bot.name.to_lowercase()));

        let Some(bot) = claimed else {
            return false;
        };

        if cross_check(self.dns.as_ref(), ip, bot) {
            debug!(ip, bot = %bot.name, "crawler identity verified");
            self.verified.insert(ip.to_string());
            true
        } else {
            debug!(ip, bot = %bot.name, "crawler identity spoofed");
            self.spoofed.insert(ip.to_string());
            false
        }
    }

    /// Whether the IP has been verified (cache inspection, no DNS).
    pub fn is_verified(&self, ip: &str) -> bool {
        self.verified.contains(ip)
    }

    /// Whether the IP has been marked spoofed (cache inspection, no DNS).
    pub fn is_spoofed(&self, ip: &str) -> bool {
        self.spoofed.contains(ip)
    }

    /// Number of verified entries.
    pub fn verified_count(&self) -> usize {
        self.verified.len()
    }

    /// Number of spoofed entries.
    pub fn spoofed_count(&self) -> usize {
        self.spoofed.len()
    }

    /// Write both decision sets to their stores. Runs at most once; a failed
    /// save is a warning, next run simply relearns the lost decisions.
    pub fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        if let Err(e) = self.verified_store.save(&self.verified) {
            warn!(error = %e, "failed to save verified bot cache");
        }
        if let Err(e) = self.spoofed_store.save(&self.spoofed) {
            warn!(error = %e, "failed to save spoofed bot cache");
        }
    }
}

impl Drop for BotVerifier {
    fn drop(&mut self) {
        self.flush();
    }
}

/// The reverse/forward DNS cross-check for one crawler claim.
///
/// Any failure along the way (unparseable address, failed reverse lookup,
/// hostname outside the crawler's domains, forward lookup not returning the
/// original IP) is treated as positive evidence of spoofing. This is policy:
/// crawler-identity claims fail closed, a transient DNS outage marks the IP
/// spoofed for the life of the cache.
fn cross_check(dns: &dyn Dns, ip: &str, bot: &KnownBot) -> bool {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return false;
    };

    let Some(hostname) = dns.reverse(addr) else {
        return false;
    };

    if !bot.suffixes.iter().any(|sfx| hostname.ends_with(sfx.as_str())) {
        return false;
    }

    dns.forward(&hostname) == Some(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted resolver: fixed PTR and A records plus a call counter.
    struct FakeDns {
        ptr: HashMap<IpAddr, String>,
        a: HashMap<String, IpAddr>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeDns {
        fn new(records: &[(&str, &str)]) -> (Self, Arc<AtomicUsize>) {
            let mut ptr = HashMap::new();
            let mut a = HashMap::new();
            for (ip, host) in records {
                let addr: IpAddr = ip.parse().unwrap();
                ptr.insert(addr, host.to_string());
                a.insert(host.to_string(), addr);
            }
            let calls = Arc::new(AtomicUsize::new(0));
            let handle = Arc::clone(&calls);
            (Self { ptr, a, calls }, handle)
        }
    }

    impl Dns for FakeDns {
        fn reverse(&self, ip: IpAddr) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ptr.get(&ip).cloned()
        }

        fn forward(&self, hostname: &str) -> Option<IpAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.a.get(hostname).copied()
        }
    }

    /// In-memory store exposing what was saved and how many times.
    #[derive(Clone, Default)]
    struct MemoryStore {
        initial: HashSet<String>,
        saved: Arc<Mutex<Vec<HashSet<String>>>>,
    }

    impl MemoryStore {
        fn with_ips(ips: &[&str]) -> Self {
            Self {
                initial: ips.iter().map(|s| s.to_string()).collect(),
                saved: Arc::default(),
            }
        }
    }

    impl DecisionStore for MemoryStore {
        fn load(&self) -> HashSet<String> {
            self.initial.clone()
        }

        fn save(&self, ips: &HashSet<String>) -> anyhow::Result<()> {
            self.saved.lock().unwrap().push(ips.clone());
            Ok(())
        }
    }

    fn verifier_with(
        dns: FakeDns,
        verified: MemoryStore,
        spoofed: MemoryStore,
    ) -> BotVerifier {
        BotVerifier::new(
            default_known_bots(),
            Box::new(dns),
            Box::new(verified),
            Box::new(spoofed),
        )
    }

    const GOOGLEBOT_UA: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_genuine_googlebot_verified_and_cached() {
        let (dns, calls) = FakeDns::new(&[("66.249.66.1", "crawl-66-249-66-1.googlebot.com")]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(verifier.is_valid_bot("66.249.66.1", GOOGLEBOT_UA));
        assert!(verifier.is_verified("66.249.66.1"));

        // Second call is a pure cache hit.
        let after_first = calls.load(Ordering::SeqCst);
        assert!(verifier.is_valid_bot("66.249.66.1", GOOGLEBOT_UA));
        assert_eq!(calls.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn test_wrong_reverse_dns_marks_spoofed() {
        let (dns, calls) = FakeDns::new(&[("203.0.113.5", "malicious.example.net")]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(!verifier.is_valid_bot("203.0.113.5", GOOGLEBOT_UA));
        assert!(verifier.is_spoofed("203.0.113.5"));

        let after_first = calls.load(Ordering::SeqCst);
        assert!(!verifier.is_valid_bot("203.0.113.5", GOOGLEBOT_UA));
        assert_eq!(calls.load(Ordering::SeqCst), after_first, "cached, no DNS");
    }

    #[test]
    fn test_reverse_lookup_failure_marks_spoofed() {
        let (dns, _) = FakeDns::new(&[]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(!verifier.is_valid_bot("203.0.113.9", GOOGLEBOT_UA));
        assert!(verifier.is_spoofed("203.0.113.9"));
    }

    #[test]
    fn test_forward_mismatch_marks_spoofed() {
        let (mut dns, _) = FakeDns::new(&[("66.249.66.2", "crawl.googlebot.com")]);
        // Forward record points somewhere else entirely.
        dns.a
            .insert("crawl.googlebot.com".to_string(), "198.51.100.1".parse().unwrap());
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(!verifier.is_valid_bot("66.249.66.2", GOOGLEBOT_UA));
        assert!(verifier.is_spoofed("66.249.66.2"));
    }

    #[test]
    fn test_non_bot_user_agent_records_nothing() {
        let (dns, calls) = FakeDns::new(&[]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(!verifier.is_valid_bot("192.0.2.1", "Mozilla/5.0"));
        assert!(!verifier.is_verified("192.0.2.1"));
        assert!(!verifier.is_spoofed("192.0.2.1"));
        // No crawler claim, no DNS traffic.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unparseable_ip_fails_closed() {
        let (dns, _) = FakeDns::new(&[]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(!verifier.is_valid_bot("not-an-ip", GOOGLEBOT_UA));
        assert!(verifier.is_spoofed("not-an-ip"));
    }

    #[test]
    fn test_crawler_name_match_is_case_insensitive() {
        let (dns, _) = FakeDns::new(&[("66.249.66.3", "crawl.googlebot.com")]);
        let mut verifier = verifier_with(dns, MemoryStore::default(), MemoryStore::default());

        assert!(verifier.is_valid_bot("66.249.66.3", "GOOGLEBOT/2.1"));
    }

    #[test]
    fn test_first_matching_entry_wins() {
        // UA names both crawlers; only the first table entry's suffixes are
        // consulted, so a hostname under the second entry's domain still
        // counts as spoofed.
        let table = vec![
            KnownBot::new("Alphabot", &[".alpha.example"]),
            KnownBot::new("Betabot", &[".beta.example"]),
        ];
        let (dns, _) = FakeDns::new(&[("192.0.2.77", "node7.beta.example")]);
        let mut verifier = BotVerifier::new(
            table,
            Box::new(dns),
            Box::new(MemoryStore::default()),
            Box::new(MemoryStore::default()),
        );

        assert!(!verifier.is_valid_bot("192.0.2.77", "Alphabot Betabot"));
        assert!(verifier.is_spoofed("192.0.2.77"));
    }

    #[test]
    fn test_preloaded_caches_answer_without_dns() {
        let (dns, calls) = FakeDns::new(&[]);
        let mut verifier = verifier_with(
            dns,
            MemoryStore::with_ips(&["66.249.66.1"]),
            MemoryStore::with_ips(&["203.0.113.5"]),
        );

        assert!(verifier.is_valid_bot("66.249.66.1", GOOGLEBOT_UA));
        assert!(!verifier.is_valid_bot("203.0.113.5", GOOGLEBOT_UA));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_flush_saves_once_including_drop() {
        let verified = MemoryStore::default();
        let spoofed = MemoryStore::default();
        let saved = Arc::clone(&verified.saved);

        let (dns, _) = FakeDns::new(&[("66.249.66.1", "crawl.googlebot.com")]);
        let mut verifier = verifier_with(dns, verified, spoofed);
        verifier.is_valid_bot("66.249.66.1", GOOGLEBOT_UA);

        verifier.flush();
        drop(verifier);

        let snapshots = saved.lock().unwrap();
        assert_eq!(snapshots.len(), 1, "flush then drop saves exactly once");
        assert!(snapshots[0].contains("66.249.66.1"));
    }

    #[test]
    fn test_drop_without_flush_still_saves() {
        let verified = MemoryStore::default();
        let spoofed = MemoryStore::default();
        let saved = Arc::clone(&spoofed.saved);

        let (dns, _) = FakeDns::new(&[]);
        {
            let mut verifier = verifier_with(dns, verified, spoofed);
            verifier.is_valid_bot("203.0.113.8", GOOGLEBOT_UA);
        }

        let snapshots = saved.lock().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].contains("203.0.113.8"));
    }
}
