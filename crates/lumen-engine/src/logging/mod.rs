//! Logger initialization.
//!
//! The engine logs through the `log` facade; binaries install `env_logger`
//! here once at startup.

mod init;

pub use init::{LoggingConfig, init_logging};
