pub mod client;
pub mod config;
pub mod constants;
pub mod core_error;
pub mod core_listing;
pub mod core_log;
pub mod core_network;
pub mod core_reply;
pub mod helpers;
pub mod session;

pub use client::FtpClient;
pub use config::{ClientConfig, Config, TransferMode};
pub use core_error::{FtpError, Result};
pub use core_listing::{Entry, EntryType, ServerType};
pub use core_network::{ControlStream, DataStream, Direction};
pub use core_reply::Reply;
pub use session::SessionPhase;
