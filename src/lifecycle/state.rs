use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Orchestrator state machine
///
/// ```text
/// NotStarted → Starting → Running ──┐
///                   │               ├→ ShuttingDown → Stopped
///                   └──→ Failed ────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// Whether `start` may be called from this state
    pub fn can_start(self) -> bool {
        matches!(self, Self::NotStarted)
    }
}
