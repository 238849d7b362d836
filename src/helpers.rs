use crate::core_error::{FtpError, Result};
use std::future::Future;
use std::time::Duration;

/// Runs an I/O future under the session timeout, if one is configured.
pub async fn with_timeout<T, F>(limit: Option<Duration>, what: &str, future: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => result.map_err(FtpError::from),
            Err(_) => Err(FtpError::timed_out(what)),
        },
        None => future.await.map_err(FtpError::from),
    }
}

/// Formats a command line for the log, hiding passwords.
pub fn loggable_command(verb: &str, arg: &str) -> String {
    if verb.eq_ignore_ascii_case("PASS") {
        format!("{} ****", verb)
    } else if arg.is_empty() {
        verb.to_string()
    } else {
        format!("{} {}", verb, arg)
    }
}

/// Splits a remote path into its parent directory and final segment.
///
/// Returns `None` for the root, which has no final segment. A bare name
/// belongs to the current directory, `.`.
pub fn split_path(path: &str) -> Option<(String, String)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some(("/".to_string(), trimmed[1..].to_string())),
        Some(index) => Some((
            trimmed[..index].to_string(),
            trimmed[index + 1..].to_string(),
        )),
        None => Some((".".to_string(), trimmed.to_string())),
    }
}
