pub mod entry;
pub mod unix;
pub mod windows;

pub use entry::{Entry, EntryType};

use chrono::{Local, NaiveDate};
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Listing dialect of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    #[default]
    Unknown,
    Unix,
    Windows,
}

impl ServerType {
    /// Reads the system name out of a `SYST` reply text, e.g. `UNIX Type: L8`.
    pub fn from_system_reply(text: &str) -> ServerType {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"(?i)\b(unix|linux|windows)").unwrap());
        match re.captures(text) {
            Some(caps) if caps[1].eq_ignore_ascii_case("windows") => ServerType::Windows,
            Some(_) => ServerType::Unix,
            None => ServerType::Unknown,
        }
    }

    /// Only recognises the IIS welcome message.
    pub fn from_banner(text: &str) -> ServerType {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r"(?i)\b(microsoft|windows)\b").unwrap());
        if re.is_match(text) {
            ServerType::Windows
        } else {
            ServerType::Unknown
        }
    }
}

/// Extra input the dialect parsers need to date recent entries.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub today: NaiveDate,
}

impl ParseContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Default for ParseContext {
    fn default() -> Self {
        Self::new(Local::now().date_naive())
    }
}

/// Result of parsing a whole listing.
#[derive(Debug, Clone)]
pub struct Listing {
    pub entries: Vec<Entry>,
    pub dialect: ServerType, // The dialect that produced `entries`
}

/// Parses one line with the parser of `dialect`.
pub fn parse_line(dialect: ServerType, line: &str, context: &ParseContext) -> Option<Entry> {
    match dialect {
        ServerType::Windows => windows::parse_line(line, context),
        ServerType::Unix => unix::parse_line(line, context),
        ServerType::Unknown => {
            unix::parse_line(line, context).or_else(|| windows::parse_line(line, context))
        }
    }
}

/// Parses listing lines with the dialect of `server_type`.
///
/// When that dialect yields nothing from a non-empty listing, the other
/// dialect is tried. `.` and `..` are removed. Unparsable lines are skipped.
pub fn parse_listing<'a, I>(lines: I, server_type: ServerType, context: &ParseContext) -> Listing
where
    I: IntoIterator<Item = &'a str>,
{
    let lines: Vec<&str> = lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let preferred = match server_type {
        ServerType::Windows => ServerType::Windows,
        _ => ServerType::Unix,
    };
    let mut dialect = preferred;
    let mut entries = parse_with(preferred, &lines, context);

    if entries.is_empty() && !lines.is_empty() {
        let other = match preferred {
            ServerType::Windows => ServerType::Unix,
            _ => ServerType::Windows,
        };
        let fallback = parse_with(other, &lines, context);
        if !fallback.is_empty() {
            debug!("Listing parsed as {:?} instead of {:?}", other, preferred);
            dialect = other;
            entries = fallback;
        }
    }

    if entries.is_empty() {
        dialect = server_type;
    }
    let skipped = lines.len() - entries.len();
    if skipped > 0 {
        debug!("Skipped {} unparsable listing line(s)", skipped);
    }

    entries.retain(|entry| !entry.is_navigation());
    Listing { entries, dialect }
}

fn parse_with(dialect: ServerType, lines: &[&str], context: &ParseContext) -> Vec<Entry> {
    lines
        .iter()
        .filter_map(|line| parse_line(dialect, line, context))
        .collect()
}

/// Splits off `count` whitespace-delimited fields and returns them with the
/// rest of the line, which must not be empty.
pub(crate) fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();
    for _ in 0..count {
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() {
        None
    } else {
        Some((fields, rest))
    }
}
