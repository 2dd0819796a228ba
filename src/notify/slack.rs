use eyre::{eyre, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::arb::events::EngineEvent;

/// Channel used when `SLACK_CHANNEL` is not set
pub const DEFAULT_CHANNEL: &str = "#flashfly";

/// Slack notifier
#[derive(Debug)]
pub struct SlackNotifier {
    /// The Slack OAuth token
    token: String,
    /// Channel messages are posted to
    channel: String,
    /// The HTTP client
    client: Client,
}

impl SlackNotifier {
    /// Creates a notifier from `SLACK_OAUTH_TOKEN` and the optional `SLACK_CHANNEL`.
    ///
    /// # Errors
    /// * If `SLACK_OAUTH_TOKEN` is not set
    /// * If the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        let token =
            std::env::var("SLACK_OAUTH_TOKEN").map_err(|_| eyre!("SLACK_OAUTH_TOKEN not set"))?;
        let channel = std::env::var("SLACK_CHANNEL").unwrap_or_else(|_| DEFAULT_CHANNEL.to_string());

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            token,
            channel,
            client,
        })
    }

    /// Posts `msg` to the configured channel
    pub async fn send(&self, msg: &str) -> Result<()> {
        let payload = json!({
            "channel": self.channel,
            "text": msg,
            "username": "Flashfly",
            "icon_emoji": ":zap:"
        });

        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        if !response["ok"].as_bool().unwrap_or(false) {
            return Err(eyre!(
                "Slack API error: {}",
                response["error"].as_str().unwrap_or("unknown error")
            ));
        }

        Ok(())
    }

    /// Posts the message for `event`, if it is worth one
    pub async fn notify(&self, event: &EngineEvent) -> Result<()> {
        match describe(event) {
            Some(msg) => self.send(&msg).await,
            None => Ok(()),
        }
    }
}

/// Slack text for the events an operator cares about. Registry changes are skipped.
#[must_use]
pub fn describe(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::ArbitrageExecuted { key, asset, profit } => Some(format!(
            ":moneybag: Cycle `{key}` executed, profit {profit} of `{asset}`"
        )),
        EngineEvent::FundsWithdrawn { asset, amount } => {
            Some(format!(":bank: Withdrew {amount} of `{asset}` to owner"))
        }
        EngineEvent::OperatorUpdated { operator, allowed } => Some(format!(
            ":key: Operator `{operator}` {}",
            if *allowed { "granted" } else { "revoked" }
        )),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use alloy::primitives::{Address, B256, U256};

    use super::*;

    #[test]
    fn test_describe() {
        let executed = EngineEvent::ArbitrageExecuted {
            key: B256::ZERO,
            asset: Address::ZERO,
            profit: U256::from(49),
        };
        let msg = describe(&executed).unwrap();
        assert!(msg.contains("profit 49"));

        let revoked = EngineEvent::OperatorUpdated {
            operator: Address::ZERO,
            allowed: false,
        };
        assert!(describe(&revoked).unwrap().ends_with("revoked"));

        let updated = EngineEvent::ArbitragePathUpdated {
            key: B256::ZERO,
            active: true,
        };
        assert_eq!(describe(&updated), None);
    }
}
