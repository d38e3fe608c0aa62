//! Date parsing and formatting routines.
//!
//! Feeds carry timestamps in two families: RFC 822 (`pubDate` in RSS) and
//! ISO 8601 / W3CDTF (`dc:date`, Atom `updated`). Real-world feeds are sloppy
//! with both, so the parsers here are tolerant: optional seconds, two-digit
//! years, missing timezones, and a wide set of named zones beyond what
//! RFC 822 actually allows. Both entry points return `0` on failure rather
//! than an error, because a bad date must never abort a feed parse.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// In theory only the RFC 822 timezones would be needed here; in practice
/// feeds use many others. Order matters: lookup is by prefix match and the
/// daylight-saving variants must win over their standard-zone prefixes
/// (e.g. CEST before CET).
const TZ_OFFSETS: &[(&str, i32)] = &[
    ("IDLW", -1200),
    ("HAST", -1000),
    ("AKST", -900),
    ("AKDT", -800),
    ("WESZ", 100),
    ("WEST", 100),
    ("WEDT", 100),
    ("MEST", 200),
    ("MESZ", 200),
    ("CEST", 200),
    ("CEDT", 200),
    ("EEST", 300),
    ("EEDT", 300),
    ("IRST", 430),
    ("CNST", 800),
    ("ACST", 930),
    ("ACDT", 1030),
    ("AEST", 1000),
    ("AEDT", 1100),
    ("IDLE", 1200),
    ("NZST", 1200),
    ("NZDT", 1300),
    ("GMT", 0),
    ("EST", -500),
    ("EDT", -400),
    ("CST", -600),
    ("CDT", -500),
    ("MST", -700),
    ("MDT", -600),
    ("PST", -800),
    ("PDT", -700),
    ("HDT", -900),
    ("YST", -900),
    ("YDT", -800),
    ("AST", -400),
    ("ADT", -300),
    ("VST", -430),
    ("NST", -330),
    ("NDT", -230),
    ("WET", 0),
    ("WEZ", 0),
    ("IST", 100),
    ("CET", 100),
    ("MEZ", 100),
    ("EET", 200),
    ("MSK", 300),
    ("MSD", 400),
    ("IRT", 330),
    ("ICT", 700),
    ("JST", 900),
    ("NFT", 1130),
    ("UT", 0),
    ("PT", -800),
    ("BT", 300),
    ("Z", 0),
    ("A", -100),
    ("M", -1200),
    ("N", 100),
    ("Y", 1200),
];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parses an ISO 8601 / W3CDTF date string to a UNIX timestamp.
///
/// Accepts `YYYY-MM-DD[Thh:mm:ss[.sss]][Z|±hh[:]mm]`; a bare date is taken as
/// midnight UTC, a datetime without zone as UTC. Returns 0 if nothing in the
/// string parses.
pub fn parse_iso8601(date: &str) -> i64 {
    let date = date.trim();
    if date.is_empty() {
        return 0;
    }

    // Fully specified variant, with Z or a colon offset.
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return dt.timestamp();
    }
    // Offsets without a colon ("+0100") are not RFC 3339 but are common.
    if let Ok(dt) = DateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return dt.timestamp();
    }
    // No timezone info at all: assume UTC.
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.and_utc().timestamp();
    }
    // Date only.
    if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return dt.and_utc().timestamp();
        }
    }

    tracing::debug!("invalid ISO 8601 date \"{}\"", date);
    0
}

/// Formats a UNIX timestamp as an ISO 8601 string in UTC.
///
/// The output round-trips through [`parse_iso8601`].
pub fn format_iso8601(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => String::new(),
    }
}

/// Parses an RFC 822 date string to a UNIX timestamp.
///
/// We expect at least something like `03 Dec 12 01:38:34` and require neither
/// the day of week nor seconds nor a timezone; the most specific accepted
/// form is `Fri, 03 Dec 12 01:38:34 CET`. Two-digit years after 68 are in the
/// 20th century (strptime convention). Unknown timezones fall back to UTC.
/// Returns 0 on failure.
pub fn parse_rfc822(date: &str) -> i64 {
    match parse_rfc822_inner(date) {
        Some(t) => t,
        None => {
            tracing::debug!("invalid RFC 822 date \"{}\"", date);
            0
        }
    }
}

fn parse_rfc822_inner(date: &str) -> Option<i64> {
    // Skip the (possibly localized) day of week.
    let rest = match date.find(',') {
        Some(pos) => &date[pos + 1..],
        None => date,
    };

    let (day, rest) = take_number(rest)?;
    let (month, rest) = take_month(rest)?;
    let (mut year, rest) = take_number(rest)?;
    if year < 100 {
        year += if year > 68 { 1900 } else { 2000 };
    }

    let (hour, rest) = take_number(rest)?;
    let rest = rest.strip_prefix(':')?;
    let (minute, rest) = take_number(rest)?;
    let (second, rest) = match rest.strip_prefix(':') {
        Some(r) => take_number(r)?,
        None => (0, rest),
    };

    let tz = rest.trim();
    let offset_seconds = if tz.is_empty() { 0 } else { parse_rfc822_tz(tz) };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    let offset = FixedOffset::east_opt(offset_seconds)?;
    Some(naive.and_utc().timestamp() - i64::from(offset.local_minus_utc()))
}

/// Resolves an RFC 822 timezone token to an offset in seconds east of UTC.
fn parse_rfc822_tz(token: &str) -> i32 {
    let token = token.strip_prefix('(').unwrap_or(token);

    if let Some(stripped) = token.strip_prefix('+') {
        return numeric_offset(stripped);
    }
    if let Some(stripped) = token.strip_prefix('-') {
        return -numeric_offset(stripped);
    }

    for (name, hhmm) in TZ_OFFSETS {
        if token.len() >= name.len() && token[..name.len()].eq_ignore_ascii_case(name) {
            let hours = hhmm / 100;
            let minutes = hhmm % 100;
            return hours * 3600 + minutes * 60;
        }
    }

    0
}

/// Parses `hh`, `hhmm` or `hh:mm` digits into seconds east of UTC.
fn numeric_offset(digits: &str) -> i32 {
    let digits: String = digits.chars().filter(|c| c.is_ascii_digit()).collect();
    let value: i32 = match digits.parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    let (hours, minutes) = if digits.len() > 2 {
        (value / 100, value % 100)
    } else {
        (value, 0)
    };
    hours * 3600 + minutes * 60
}

/// Reads a decimal number, skipping leading whitespace. Fails on no digits.
fn take_number(s: &str) -> Option<(u32, &str)> {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

/// Reads a three-letter English month name, skipping leading whitespace.
fn take_month(s: &str) -> Option<(u32, &str)> {
    let s = s.trim_start();
    if s.len() < 3 {
        return None;
    }
    for (i, name) in MONTHS.iter().enumerate() {
        if s[..3].eq_ignore_ascii_case(name) {
            return Some((i as u32 + 1, &s[3..]));
        }
    }
    None
}
