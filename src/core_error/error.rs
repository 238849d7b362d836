// Error taxonomy shared by every client operation
use crate::constants::status::*;
use crate::core_reply::Reply;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {code} {message}")]
    Authentication { code: u16, message: String },

    #[error("Not found: {path} ({code} {message})")]
    NotFound {
        path: String,
        code: u16,
        message: String,
    },

    #[error("Write refused for {path}: {code} {message}")]
    Write {
        path: String,
        code: u16,
        message: String,
    },

    #[error("Command {verb} rejected: {code} {message}")]
    Rejected {
        verb: String,
        code: u16,
        message: String,
    },

    #[error("Local I/O error: {0}")]
    Local(std::io::Error), // Caller-side reader or writer, the session is unaffected

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Session is disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, FtpError>;

impl FtpError {
    /// Classifies a failure reply to a path-addressed command.
    pub fn from_reply(verb: &str, path: &str, reply: &Reply) -> Self {
        let message = reply.message().to_string();
        match (verb, reply.code) {
            ("STOR", FILE_ACTION_NOT_TAKEN)
            | ("STOR", INSUFFICIENT_STORAGE)
            | ("STOR", FILE_NOT_AVAILABLE)
            | ("STOR", FILE_ACTION_ABORTED)
            | ("STOR", FILE_NAME_NOT_ALLOWED) => FtpError::Write {
                path: path.to_string(),
                code: reply.code,
                message,
            },
            (_, FILE_NOT_AVAILABLE) => FtpError::NotFound {
                path: path.to_string(),
                code: reply.code,
                message,
            },
            (_, NOT_LOGGED_IN) => FtpError::Authentication {
                code: reply.code,
                message,
            },
            _ => FtpError::Rejected {
                verb: verb.to_string(),
                code: reply.code,
                message,
            },
        }
    }

    /// Server reply code carried by the error, if any.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            FtpError::Authentication { code, .. }
            | FtpError::NotFound { code, .. }
            | FtpError::Write { code, .. }
            | FtpError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the session cannot be used any more after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FtpError::Transport(_) | FtpError::Protocol(_) | FtpError::Disconnected
        )
    }

    pub(crate) fn timed_out(what: &str) -> Self {
        FtpError::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out", what),
        ))
    }
}
