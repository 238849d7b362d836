use super::entry::{Entry, EntryType};
use super::{split_fields, ParseContext};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;

const LINK_SEPARATOR: &str = " -> ";

fn permissions_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-dlbcpsD][-rwxsStTlL]{9}[.+@]?$").unwrap())
}

/// Parses one `ls -l` style line:
///
/// ```text
/// drwxr-xr-x    4 1001     1001         4096 Jan 21 14:41 nas-1
/// lrwxrwxrwx    1 0        0               4 Sep 03  2009 lib64 -> /lib
/// ```
///
/// Everything after the date is the name, spaces included. Lines without a
/// group column are recognised too.
pub fn parse_line(line: &str, context: &ParseContext) -> Option<Entry> {
    let (fields, short_remainder) = split_fields(line, 7)?;
    if !permissions_regex().is_match(fields[0]) {
        return None;
    }

    // No group column: the month sits where the size normally is.
    let (size_field, date_fields, name_part) = if month_number(fields[5]).is_none()
        && month_number(fields[4]).is_some()
    {
        (fields[3], [fields[4], fields[5], fields[6]], short_remainder)
    } else {
        let (full, remainder) = split_fields(line, 8)?;
        (full[4], [full[5], full[6], full[7]], remainder)
    };

    let entry_type = match fields[0].as_bytes()[0] {
        b'd' | b'D' => EntryType::Directory,
        b'l' => EntryType::Link,
        _ => EntryType::File,
    };

    let (name, link_target) = match entry_type {
        EntryType::Link => match name_part.split_once(LINK_SEPARATOR) {
            Some((name, target)) => (name, Some(target.to_string())),
            None => (name_part, None),
        },
        _ => (name_part, None),
    };

    let mut entry = Entry::new(name, entry_type);
    entry.size = size_field.parse::<u64>().ok();
    entry.modified_at = parse_date(date_fields[0], date_fields[1], date_fields[2], context);
    entry.link_target = link_target;
    Some(entry)
}

fn month_number(month: &str) -> Option<u32> {
    if month.len() != 3 {
        return None;
    }
    let number = match month.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(number)
}

/// `Jan 21 14:41` (recent, year implied) or `Sep 03 2009`.
fn parse_date(
    month: &str,
    day: &str,
    time_or_year: &str,
    context: &ParseContext,
) -> Option<NaiveDateTime> {
    let month = month_number(month)?;
    let day: u32 = day.parse().ok()?;

    match time_or_year.split_once(':') {
        Some((hour, minute)) => {
            let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
            let year = context.today.year();
            let tomorrow = context.today.succ_opt().unwrap_or(context.today);
            // ls only omits the year for the last six months
            let date = match NaiveDate::from_ymd_opt(year, month, day) {
                Some(date) if date <= tomorrow => date,
                _ => NaiveDate::from_ymd_opt(year - 1, month, day)?,
            };
            Some(date.and_time(time))
        }
        None => {
            let year: i32 = time_or_year.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
        }
    }
}
