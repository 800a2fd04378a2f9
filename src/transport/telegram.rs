use anyhow::{Context, Result};
use std::time::Duration;

use crate::alert::{Alert, AlertSink};

const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Posts alert text to a bot `sendMessage` endpoint.
pub struct TelegramSink {
    url: String,
    chat_id: String,
    agent: ureq::Agent,
}

impl TelegramSink {
    pub fn new(url: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            chat_id: chat_id.into(),
            agent: ureq::AgentBuilder::new().timeout(SEND_TIMEOUT).build(),
        }
    }
}

impl AlertSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        self.agent
            .post(&self.url)
            .send_form(&[("chat_id", self.chat_id.as_str()), ("text", alert.message.as_str())])
            .context("post telegram message")?;
        Ok(())
    }
}
