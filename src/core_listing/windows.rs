use super::entry::{Entry, EntryType};
use super::{split_fields, ParseContext};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

const DIR_MARKER: &str = "<DIR>";

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d{1,2})[-/](\d{1,2})[-/](\d{2}|\d{4})|(\d{4})[-/](\d{1,2})[-/](\d{1,2}))$")
            .unwrap()
    })
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})(?::\d{2})?([AaPp][Mm])?$").unwrap())
}

/// Parses one IIS `dir` style line:
///
/// ```text
///     03-07-15  03:52PM                22286 03265480-photo-logo.png
///     04-04-15  12:12PM       <DIR>          New folder
/// ```
pub fn parse_line(line: &str, _context: &ParseContext) -> Option<Entry> {
    let (fields, name) = split_fields(line, 3)?;
    let date = date_regex().captures(fields[0])?;
    let time = time_regex().captures(fields[1])?;

    let mut entry = if fields[2].eq_ignore_ascii_case(DIR_MARKER) {
        Entry::new(name, EntryType::Directory)
    } else {
        let mut file = Entry::new(name, EntryType::File);
        file.size = Some(fields[2].parse::<u64>().ok()?);
        file
    };
    entry.modified_at = to_date(&date).and_then(|d| Some(d.and_time(to_time(&time)?)));
    Some(entry)
}

fn to_date(captures: &regex::Captures) -> Option<NaiveDate> {
    let number = |i: usize| captures.get(i).and_then(|m| m.as_str().parse::<i32>().ok());
    if let Some(year) = number(4) {
        return NaiveDate::from_ymd_opt(year, number(5)? as u32, number(6)? as u32);
    }
    let year = match captures.get(3)?.as_str() {
        short if short.len() == 2 => {
            let yy: i32 = short.parse().ok()?;
            if yy < 70 {
                2000 + yy
            } else {
                1900 + yy
            }
        }
        long => long.parse().ok()?,
    };
    NaiveDate::from_ymd_opt(year, number(1)? as u32, number(2)? as u32)
}

fn to_time(captures: &regex::Captures) -> Option<NaiveTime> {
    let mut hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2)?.as_str().parse().ok()?;
    if let Some(meridiem) = captures.get(3) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
