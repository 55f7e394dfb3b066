//! Execution identifiers.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Length of the random token used as an execution suffix.
const EXECUTION_ID_LEN: usize = 8;

/// Short random identifier for an execution, unique per job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generate a new 8-character lowercase token.
    ///
    /// The token is cut from the random tail of a ULID, so the timestamp
    /// prefix never makes two ids in the same millisecond collide.
    pub fn generate() -> Self {
        let ulid = Ulid::new().to_string().to_lowercase();
        Self(ulid[ulid.len() - EXECUTION_ID_LEN..].to_string())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
