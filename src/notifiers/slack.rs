use async_trait::async_trait;
use color_eyre::eyre::bail;
use color_eyre::Result;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Notifier, UsageChange};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts usage changes to a Slack channel through the Web API.
#[derive(Debug)]
pub struct SlackNotifier {
    token: String,
    channel: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(token: String, channel: String) -> Self {
        Self {
            token,
            channel,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, change: &UsageChange<'_>) -> Result<()> {
        let text = change.message();
        debug!(channel = %self.channel, "sending slack notification:\n{text}");

        let body = serde_json::json!({
            "channel": self.channel,
            "text": text,
        });
        let response: PostMessageResponse = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            bail!(
                "slack rejected the message: {}",
                response.error.as_deref().unwrap_or("unknown error")
            );
        }

        info!(channel = %self.channel, user = change.user, "slack notification sent");
        Ok(())
    }
}
