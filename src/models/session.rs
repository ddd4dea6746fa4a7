use serde::{Deserialize, Serialize};

use super::enums::IntakeChannel;

/// Caller identity passed explicitly to every pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Acting user, or the channel-specific sender id for webhook intake.
    pub user_id: String,
    pub session_token: Option<String>,
    pub channel: IntakeChannel,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, channel: IntakeChannel) -> Self {
        Self {
            user_id: user_id.into(),
            session_token: None,
            channel,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Identifier recorded as the actor on history and audit rows.
    pub fn actor(&self) -> &str {
        &self.user_id
    }
}
