use crate::core_error::{FtpError, Result};
use std::fmt;

/// Class of a reply, given by the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Preliminary,
    Success,
    Intermediate,
    TransientFailure,
    PermanentFailure,
}

/// One complete control-connection reply.
///
/// `lines` holds the message text: for a single-line reply, the text after the
/// code; for a multi-line reply, the first line's text, every continuation line
/// verbatim, then the terminating line's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Success,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            _ => ReplyClass::PermanentFailure,
        }
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == ReplyClass::Preliminary
    }

    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::Success
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == ReplyClass::Intermediate
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.class(),
            ReplyClass::TransientFailure | ReplyClass::PermanentFailure
        )
    }

    /// First line of the message, the usual human-readable part.
    pub fn message(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    /// Whole message, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

enum ParserState {
    AwaitingFirstLine,
    AccumulatingContinuation { code: u16, lines: Vec<String> },
    Done,
}

/// Assembles a [`Reply`] from raw control lines, one line at a time.
///
/// A first line `DDD-text` opens a multi-line reply that only ends on a line
/// starting with the same code followed by a space. Anything in between is
/// kept verbatim, including lines that look like other codes.
pub struct ReplyParser {
    state: ParserState,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingFirstLine,
        }
    }

    /// Feeds one line (without its line terminator).
    ///
    /// Returns `Ok(Some(reply))` once the reply is complete, `Ok(None)` while
    /// continuation lines are still expected.
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>> {
        match std::mem::replace(&mut self.state, ParserState::Done) {
            ParserState::AwaitingFirstLine => {
                let (code, separator, text) = split_status_line(line)?;
                if separator == Some('-') {
                    self.state = ParserState::AccumulatingContinuation {
                        code,
                        lines: vec![text.to_string()],
                    };
                    Ok(None)
                } else {
                    Ok(Some(Reply::new(code, vec![text.to_string()])))
                }
            }
            ParserState::AccumulatingContinuation { code, mut lines } => {
                if let Some(text) = terminator_text(line, code) {
                    lines.push(text.to_string());
                    Ok(Some(Reply::new(code, lines)))
                } else {
                    lines.push(line.to_string());
                    self.state = ParserState::AccumulatingContinuation { code, lines };
                    Ok(None)
                }
            }
            ParserState::Done => Err(FtpError::Protocol(format!(
                "line received after reply was complete: '{}'",
                line
            ))),
        }
    }
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `DDD<sep>text` into its parts. A bare `DDD` is accepted with empty text.
fn split_status_line(line: &str) -> Result<(u16, Option<char>, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(FtpError::Protocol(format!("malformed reply line: '{}'", line)));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| FtpError::Protocol(format!("malformed reply code: '{}'", line)))?;
    if !(100..600).contains(&code) {
        return Err(FtpError::Protocol(format!("reply code out of range: '{}'", line)));
    }
    match bytes.get(3) {
        None => Ok((code, None, "")),
        Some(b' ') => Ok((code, Some(' '), &line[4..])),
        Some(b'-') => Ok((code, Some('-'), &line[4..])),
        Some(_) => Err(FtpError::Protocol(format!(
            "missing separator after reply code: '{}'",
            line
        ))),
    }
}

/// Text of `line` if it terminates a multi-line reply with `code`.
fn terminator_text(line: &str, code: u16) -> Option<&str> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    if line[..3].parse::<u16>().ok()? != code {
        return None;
    }
    match bytes.get(3) {
        None => Some(""),
        Some(b' ') => Some(&line[4..]),
        Some(_) => None,
    }
}
