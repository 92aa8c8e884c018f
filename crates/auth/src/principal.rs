use serde::{Deserialize, Serialize};

use studyhub_core::UserId;

/// An authenticated caller.
///
/// Construction is left to the transport layer (token decoding); this crate
/// only consumes it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
}

impl Principal {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}
