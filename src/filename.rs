use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::sync::OnceLock;
use time::{OffsetDateTime, UtcOffset, format_description};
use unicode_normalization::UnicodeNormalization;

/// `dd-mm-yyyy-hh-mm-ss-am` on a 12-hour clock.
const TIMESTAMP_FORMAT: &str =
    "[day]-[month]-[year]-[hour repr:12]-[minute]-[second]-[period case:lower]";

struct Patterns {
    whitespace: Regex,
    disallowed: Regex,
    underscores: Regex,
    edges: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        whitespace: Regex::new(r"\s+").expect("valid regex"),
        disallowed: Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid regex"),
        underscores: Regex::new(r"_+").expect("valid regex"),
        edges: Regex::new(r"^[_.\-]+|[_.\-]+$").expect("valid regex"),
    })
}

/// Make `name` safe as a file name on common filesystems. Idempotent.
pub fn sanitize_filename(name: &str) -> String {
    let p = patterns();
    let normalized: String = name.nfkc().collect();
    let s = p.whitespace.replace_all(normalized.trim(), "_");
    let s = p.disallowed.replace_all(&s, "");
    let s = p.underscores.replace_all(&s, "_");
    p.edges.replace_all(&s, "").into_owned()
}

pub fn format_timestamp(at: OffsetDateTime, offset: UtcOffset) -> Result<String> {
    let fmt = format_description::parse(TIMESTAMP_FORMAT)
        .map_err(|e| anyhow!("bad timestamp format: {e}"))?;
    at.to_offset(offset)
        .format(&fmt)
        .with_context(|| "formatting file name timestamp")
}

pub fn build_file_name_root_at(at: OffsetDateTime, offset: UtcOffset) -> Result<String> {
    Ok(sanitize_filename(&format_timestamp(at, offset)?))
}

pub fn build_file_name_root(offset: UtcOffset) -> Result<String> {
    build_file_name_root_at(OffsetDateTime::now_utc(), offset)
}

/// Parse `+05:30`, `-08:00`, `Z` or `UTC`.
pub fn parse_utc_offset(s: &str) -> Result<UtcOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1i8, &s[1..]),
        Some(b'-') => (-1i8, &s[1..]),
        _ => return Err(anyhow!("UTC offset must start with + or -: {s}")),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i8 = h.parse().with_context(|| format!("offset hours: {s}"))?;
    let minutes: i8 = m.parse().with_context(|| format!("offset minutes: {s}"))?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0)
        .map_err(|e| anyhow!("UTC offset out of range {s}: {e}"))
}
