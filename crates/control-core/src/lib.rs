//! `control-core` — configuration and on-disk layout shared by the ledger,
//! the scheduler and the `control` binary.

pub mod config;
pub mod error;
pub mod layout;

pub use config::ControlConfig;
pub use error::{ControlError, Result};
pub use layout::Layout;
