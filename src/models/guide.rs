use serde::{Deserialize, Serialize};

/// One `<channel>` of a program-guide catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideChannel {
    pub id: String,
    /// All `display-name` variants, document order
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Load state published by background guide loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideState {
    Loading,
    /// Loaded with this many channels
    Ready(usize),
    Unavailable,
}

impl GuideState {
    pub fn is_ready(&self) -> bool {
        matches!(self, GuideState::Ready(_))
    }
}
