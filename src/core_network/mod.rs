pub mod control;
pub mod data;
pub mod pasv;
pub mod port;

pub use control::{ControlChannel, ControlStream};
pub use data::{DataStream, Direction, PendingData};
