//! LogSleuth access log analyzer
//!
//! Scans an access log, skips DNS-verified crawlers, and writes one line per
//! rule match: `<lineno> <rule_id> <decoded_line>`.

use anyhow::{Context, Result};
use clap::Parser;
use logsleuth::{
    decode_line, load_rules, AnalyzerConfig, BotVerifier, JsonFileStore, RuleMatcher, SystemDns,
};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "logsleuth")]
#[command(author, version, about = "Access log analyzer with crawler verification and attack signature matching")]
struct Args {
    /// Access log file in combined format
    log_file: PathBuf,

    /// JSON rules file: array of {id, description, pattern}
    rules_file: PathBuf,

    /// Output file for matched lines
    output_file: PathBuf,

    /// Path to configuration file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the verified-crawler cache path from the config
    #[arg(long)]
    verified_cache: Option<PathBuf>,

    /// Override the spoofed-crawler cache path from the config
    #[arg(long)]
    spoofed_cache: Option<PathBuf>,

    /// Skip crawler verification and analyze every request
    #[arg(long)]
    no_verify_bots: bool,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let config = match &args.config {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };

    let rules = load_rules(&args.rules_file)?;
    info!(
        count = rules.len(),
        path = %args.rules_file.display(),
        "loaded rules"
    );
    let matcher = RuleMatcher::with_fields(rules, config.matcher.inspect_fields.clone());

    let mut verifier = if args.no_verify_bots {
        None
    } else {
        let verified_path = args
            .verified_cache
            .unwrap_or_else(|| config.cache.verified_path.clone());
        let spoofed_path = args
            .spoofed_cache
            .unwrap_or_else(|| config.cache.spoofed_path.clone());
        Some(BotVerifier::new(
            config.bots.known_bots.clone(),
            Box::new(SystemDns::new()?),
            Box::new(JsonFileStore::new(verified_path)),
            Box::new(JsonFileStore::new(spoofed_path)),
        ))
    };

    let logfile = File::open(&args.log_file)
        .with_context(|| format!("failed to open log file {}", args.log_file.display()))?;
    let mut reader = BufReader::new(logfile);

    let outfile = File::create(&args.output_file)
        .with_context(|| format!("failed to create output file {}", args.output_file.display()))?;
    let mut out = BufWriter::new(outfile);

    let mut lineno: u64 = 0;
    let mut matched: u64 = 0;
    let mut unparsable: u64 = 0;
    let mut bots_skipped: u64 = 0;

    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .context("failed to read log file")?;
        if n == 0 {
            break;
        }
        lineno += 1;

        // Invalid UTF-8 never aborts the run; the offending bytes become
        // replacement characters.
        let line = String::from_utf8_lossy(&buf);

        let Some((decoded, record)) = decode_line(&line) else {
            unparsable += 1;
            continue;
        };

        if let Some(verifier) = verifier.as_mut() {
            if verifier.is_valid_bot(&record.ip, &record.user_agent) {
                bots_skipped += 1;
                continue;
            }
        }

        if let Some(rule_id) = matcher.scan(&record) {
            writeln!(out, "{lineno} {rule_id} {decoded}")
                .context("failed to write output file")?;
            matched += 1;
        }
    }

    out.flush().context("failed to flush output file")?;

    // Explicit release after the loop; Drop covers early-exit paths.
    if let Some(verifier) = verifier.as_mut() {
        verifier.flush();
    }

    info!(
        lines = lineno,
        matched,
        unparsable,
        bots_skipped,
        output = %args.output_file.display(),
        "analysis complete"
    );

    Ok(())
}
