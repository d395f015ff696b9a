//! Step transitions.

use serde::{Deserialize, Serialize};

/// Which outcome of a step an edge follows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Branch {
    /// `on_success` pointer.
    Success,
    /// `on_failure` pointer.
    Failure,
}

impl Branch {
    pub fn from_outcome(success: bool) -> Self {
        if success { Branch::Success } else { Branch::Failure }
    }
}
