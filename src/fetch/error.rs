use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::driver::DriverError;

/// Failures a fetch attempt can end with. Kept cloneable so results can
/// carry the error alongside the classified status.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    #[error("fetch canceled")]
    Canceled,
    #[error("browser session lost: {0}")]
    SessionLost(String),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("script timed out: {0}")]
    ScriptTimeout(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("gave up after {0} retries")]
    MaxRetriesExceeded(u32),
    #[error("driver error: {0}")]
    Driver(String),
}

impl From<DriverError> for FetchError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::SessionLost(msg) => FetchError::SessionLost(msg),
            DriverError::ConnectionRefused(msg) => FetchError::ConnectionFailure(msg),
            DriverError::Timeout(msg) => FetchError::ScriptTimeout(msg),
            DriverError::Other(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("no such element") || lower.contains("element not found") {
                    FetchError::ElementNotFound(msg)
                } else {
                    FetchError::Driver(msg)
                }
            }
        }
    }
}
