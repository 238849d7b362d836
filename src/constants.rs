// src/constants.rs

pub const DEFAULT_PORT: u16 = 21;
pub const ANONYMOUS_USER: &str = "anonymous";
pub const ANONYMOUS_PASSWORD: &str = "anonymous@";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Reply codes the client reacts to.
pub mod status {
    pub const READY_MINUTE: u16 = 120;

    pub const NAME_SYSTEM: u16 = 215;
    pub const SERVICE_READY: u16 = 220;
    pub const SERVICE_CLOSING: u16 = 221;
    pub const PASSIVE_MODE: u16 = 227;
    pub const PATH_CREATED: u16 = 257;

    pub const NEED_PASSWORD: u16 = 331;
    pub const NEED_ACCOUNT: u16 = 332;
    pub const FILE_ACTION_PENDING: u16 = 350;

    pub const FILE_ACTION_NOT_TAKEN: u16 = 450;
    pub const INSUFFICIENT_STORAGE: u16 = 452;

    pub const NOT_LOGGED_IN: u16 = 530;
    pub const FILE_NOT_AVAILABLE: u16 = 550;
    pub const FILE_ACTION_ABORTED: u16 = 552;
    pub const FILE_NAME_NOT_ALLOWED: u16 = 553;
}
