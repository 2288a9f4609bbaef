use anyhow::{anyhow, Result};
use std::time::Duration;

use super::EventSink;
use crate::event::FallEvent;

/// POSTs the full JSON record to a notification endpoint.
///
/// One attempt per event. Non-2xx responses are reported with their body.
pub struct HttpNotifySink {
    url: String,
    agent: ureq::Agent,
}

impl HttpNotifySink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl EventSink for HttpNotifySink {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn deliver(&self, event: &FallEvent) -> Result<()> {
        let body = event.to_json()?;
        match self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) => {
                log::debug!("notify endpoint responded {}", response.status());
                Ok(())
            }
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                Err(anyhow!("notify endpoint responded {}: {}", code, text.trim()))
            }
            Err(e) => Err(anyhow!("notify request to {} failed: {}", self.url, e)),
        }
    }
}
