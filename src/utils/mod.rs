//! The `utils` module holds the pieces shared by every other module of the
//! bridge: the crate-wide error type and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{BridgeError, Result};
