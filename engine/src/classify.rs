//! Classification of failed remote calls.
//!
//! | status          | retryable | token expired |
//! |-----------------|-----------|---------------|
//! | 401             | no        | yes           |
//! | none            | yes       | no            |
//! | 5xx             | yes       | no            |
//! | other 4xx       | no        | no            |
//! | anything else   | yes       | no            |

use crate::TransportError;
use serde::{Deserialize, Serialize};

/// Message used when the remote could not be reached at all.
pub const NETWORK_UNAVAILABLE: &str = "Network unavailable, changes will sync when back online";

/// Message used when the remote rejected the credential.
pub const SESSION_EXPIRED: &str = "Session expired, please sign in again";

/// How the caller should react to a failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub retryable: bool,
    pub token_expired: bool,
    pub message: String,
}

/// Map a transport failure to retry/re-authentication guidance.
pub fn classify(error: &TransportError) -> Classification {
    match error.status {
        Some(401) => Classification {
            retryable: false,
            token_expired: true,
            message: SESSION_EXPIRED.to_string(),
        },
        None => Classification {
            retryable: true,
            token_expired: false,
            message: NETWORK_UNAVAILABLE.to_string(),
        },
        Some(status) if (500..600).contains(&status) => Classification {
            retryable: true,
            token_expired: false,
            message: format!("Server error ({status}): {}", error.message),
        },
        Some(status) if (400..500).contains(&status) => Classification {
            retryable: false,
            token_expired: false,
            message: error.message.clone(),
        },
        Some(_) => Classification {
            retryable: true,
            token_expired: false,
            message: error.message.clone(),
        },
    }
}
