//! # Shared Constants
//!
//! Constants used by every role.

/// Version of the rigsync protocol
pub const RIGSYNC_PROTOCOL_VERSION: &str = "0.1.0";

/// Object id constants
pub mod ids {
    /// Special object id indicating "no object"
    pub const NULL_OBJECT_ID: u64 = 0;

    /// First canonical id handed out by the simulator
    pub const FIRST_CANONICAL_ID: u64 = 2;

    /// First temporary id handed out by a non-authority registry
    pub const FIRST_TEMPORARY_ID: u64 = 1;

    /// Distance between consecutive ids of the same parity
    pub const ID_STRIDE: u64 = 2;
}

/// Frame protocol constants
pub mod frame {
    /// Default simulator frame interval (in seconds)
    pub const DEFAULT_FRAME_INTERVAL: f32 = 1.0 / 60.0;

    /// Default maximum encoded message size (in bytes)
    pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

    /// Size of the length prefix on the byte stream transport
    pub const LENGTH_PREFIX_SIZE: usize = 4;
}

/// Logging constants
pub mod logging {
    /// Log scope of the simulator loop
    pub const SIMULATOR_SCOPE: &str = "simulator";

    /// Log scope of the frontend loop
    pub const FRONTEND_SCOPE: &str = "frontend";

    /// Log scope of the slave loop
    pub const SLAVE_SCOPE: &str = "slave";

    /// Log scope of the editor side client
    pub const EDITOR_SCOPE: &str = "editor";

    /// Environment variable enabling call stack capture for queued operations
    pub const BACKTRACE_ENV_VAR: &str = "RIGSYNC_BACKTRACE";

    /// Maximum frames kept per captured call stack
    pub const MAX_BACKTRACE_FRAMES: usize = 32;
}
