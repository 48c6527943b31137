//! Access log field decoder.
//!
//! Parses one raw line of combined access-log format into a [`LogRecord`] and
//! reverses layered obfuscation in the request fields:
//! - URL percent-encoding (single and double)
//! - C-style byte/Unicode escape sequences
//! - base64-encoded trailing path segments
//!
//! Decoding is fail-soft: a stage that cannot decode leaves the text as the
//! previous stage produced it. Only a line that does not match the log grammar
//! is rejected, and that is reported as `None`, never as an error.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Combined access-log grammar:
/// `IP - - [TIME] "METHOD URL PROTOCOL" STATUS SIZE "REFERRER" "USER_AGENT" "EXTRA"`
static LOG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) - - \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<url>\S+) (?P<protocol>[^"]+)" (?P<status>\d+) (?P<size>\d+) "(?P<referrer>[^"]*)" "(?P<user_agent>[^"]*)" "(?P<extra>[^"]*)""#,
    )
    .expect("valid log grammar regex")
});

/// A trailing path segment that looks like base64: alphabet chars only, at
/// least 8 of them.
static BASE64_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/=]{8,}$").expect("valid base64 segment regex"));

/// Non-strict base64: attackers rarely bother with canonical padding or zeroed
/// trailing bits, so the decoder accepts both.
const BASE64_RELAXED: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One parsed access-log entry. Fields are sanitized on construction via
/// [`decode_line`]; `url` and `referrer` are additionally normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ip: String,
    pub time: String,
    pub method: String,
    pub url: String,
    pub protocol: String,
    pub status: String,
    pub size: String,
    pub referrer: String,
    pub user_agent: String,
    pub extra: String,
}

/// Names of the record fields, used to configure which fields the rule
/// matcher inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogField {
    Ip,
    Time,
    Method,
    Url,
    Protocol,
    Status,
    Size,
    Referrer,
    UserAgent,
    Extra,
}

impl LogRecord {
    /// Access a field by name.
    pub fn field(&self, field: LogField) -> &str {
        match field {
            LogField::Ip => &self.ip,
            LogField::Time => &self.time,
            LogField::Method => &self.method,
            LogField::Url => &self.url,
            LogField::Protocol => &self.protocol,
            LogField::Status => &self.status,
            LogField::Size => &self.size,
            LogField::Referrer => &self.referrer,
            LogField::UserAgent => &self.user_agent,
            LogField::Extra => &self.extra,
        }
    }
}

/// Parse a raw line against the log grammar. Fields are returned exactly as
/// they appear in the line; returns `None` for anything that does not match.
pub fn parse(line: &str) -> Option<LogRecord> {
    let caps = LOG_PATTERN.captures(line)?;
    let get = |name: &str| caps.name(name).map_or("", |m| m.as_str()).to_string();

    Some(LogRecord {
        ip: get("ip"),
        time: get("time"),
        method: get("method"),
        url: get("url"),
        protocol: get("protocol"),
        status: get("status"),
        size: get("size"),
        referrer: get("referrer"),
        user_agent: get("user_agent"),
        extra: get("extra"),
    })
}

/// Sanitize a field for single-line output: line breaks become their visible
/// two-character escapes and surrounding whitespace is trimmed. Guarantees one
/// physical output line per input line regardless of field content.
pub fn sanitize(text: &str) -> String {
    text.replace('\n', "\\n").replace('\r', "\\r").trim().to_string()
}

/// Reverse layered obfuscation in a request field. Three stages, each
/// fail-soft; the result is always some string, never an error.
pub fn normalize(text: &str) -> String {
    // Stage 1: percent-decode twice, unconditionally. The second pass also
    // decodes %XX text produced by the first, which recovers double-encoded
    // payloads; that over-decode is an accepted quirk of the heuristic.
    let mut text = percent_decode(text);
    text = percent_decode(&text);

    // Stage 2: byte-escape sequences, only when the marker is present. A
    // malformed \x escape fails the whole stage and keeps the stage-1 text.
    if text.contains("\\x") || text.contains("\\u") {
        if let Some(decoded) = decode_byte_escapes(&text) {
            text = decoded;
        }
    }

    // Stage 3: base64 insight on the final path segment, additive only.
    append_base64_insight(text)
}

/// Parse and decode a single access-log line.
///
/// Runs [`parse`], sanitizes every field, normalizes `url` and `referrer`,
/// then re-sanitizes those two (normalization may have revealed control
/// bytes that the single-line guarantee must still escape). Returns the
/// reconstructed canonical line together with the record, or `None` when the
/// line does not match the grammar.
pub fn decode_line(line: &str) -> Option<(String, LogRecord)> {
    let raw = parse(line)?;

    let record = LogRecord {
        ip: sanitize(&raw.ip),
        time: sanitize(&raw.time),
        method: sanitize(&raw.method),
        url: sanitize(&normalize(&sanitize(&raw.url))),
        protocol: sanitize(&raw.protocol),
        status: sanitize(&raw.status),
        size: sanitize(&raw.size),
        referrer: sanitize(&normalize(&sanitize(&raw.referrer))),
        user_agent: sanitize(&raw.user_agent),
        extra: sanitize(&raw.extra),
    };

    let line = format!(
        "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\" \"{}\"",
        record.ip,
        record.time,
        record.method,
        record.url,
        record.protocol,
        record.status,
        record.size,
        record.referrer,
        record.user_agent,
        record.extra,
    );

    Some((line, record))
}

/// Binary-safe percent-decode; bytes that do not form valid UTF-8 become the
/// replacement character. Malformed `%` sequences pass through untouched.
fn percent_decode(text: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(text.as_bytes())).into_owned()
}

/// Decode C-style escape sequences (`\xNN`, `\uNNNN`, single-character
/// escapes, octal) into bytes, then into UTF-8 with replacement characters
/// for anything undecodable. Returns `None` when a `\x` escape is malformed,
/// which fails the stage as a whole. Unknown escapes pass through literally.
fn decode_byte_escapes(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes[i + 1] {
            b'x' => {
                let hi = bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16))?;
                let lo = bytes.get(i + 3).and_then(|b| (*b as char).to_digit(16))?;
                out.push((hi * 16 + lo) as u8);
                i += 4;
            }
            b'u' => {
                // \u not followed by four hex digits stays literal text.
                let code = hex4(&bytes[i + 2..]);
                match code {
                    Some(value) => {
                        match char::from_u32(value) {
                            Some(c) => {
                                let mut buf = [0u8; 4];
                                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                            }
                            // Lone surrogates cannot be encoded.
                            None => out.extend_from_slice("\u{FFFD}".as_bytes()),
                        }
                        i += 6;
                    }
                    None => {
                        out.push(b'\\');
                        i += 1;
                    }
                }
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'\'' => {
                out.push(b'\'');
                i += 2;
            }
            b'"' => {
                out.push(b'"');
                i += 2;
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut len = 0;
                while len < 3 {
                    match bytes.get(i + 1 + len).copied() {
                        Some(b @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(b - b'0');
                            len += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
                i += 1 + len;
            }
            _ => {
                out.push(b'\\');
                i += 1;
            }
        }
    }

    Some(String::from_utf8_lossy(&out).into_owned())
}

fn hex4(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 4 {
        return None;
    }
    let mut value = 0u32;
    for b in &bytes[..4] {
        value = value * 16 + (*b as char).to_digit(16)?;
    }
    Some(value)
}

/// If the final `/`-segment of the text looks like base64, decode it and
/// append the result as a `-base64:` suffix. Additive: the original text is
/// never replaced, and a failed decode leaves it unchanged.
fn append_base64_insight(text: String) -> String {
    let last = text.rsplit('/').next().unwrap_or("");
    if !BASE64_SEGMENT.is_match(last) {
        return text;
    }

    match BASE64_RELAXED.decode(last) {
        Ok(bytes) => {
            // Undecodable bytes are dropped rather than replaced; the suffix
            // is a hint for a human reader, not a faithful transcript.
            let decoded = String::from_utf8_lossy(&bytes).replace('\u{FFFD}', "");
            format!("{text}-base64:{decoded}")
        }
        Err(_) => text,
    }
}
