pub mod cache;
pub mod error;
pub mod flags;
pub mod health;
pub mod measurement;
pub mod pending;
pub mod ring;
pub mod throttle;

/// Wire protocol version for the broker session (MQTT 3.1.1 semantics).
pub const PROTOCOL_VERSION: u8 = 1;

/// Default HTTP status-surface bind port, per the original firmware's
/// `http_server.c` (port 80).
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Git short hash baked in by `build.rs`, reported in `/status` and the
/// status dump as part of the firmware-version string.
pub const GIT_HASH: &str = env!("DATALOGGER_GIT_HASH");
