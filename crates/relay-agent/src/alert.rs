//! Outbound alert notification.
//!
//! Forwards Grafana-style webhook payloads to a chat bot as a plain text
//! message. The webhook base URL comes from configuration; the bot id is
//! supplied per request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert payload invalid: {0}")]
    Invalid(String),

    #[error("alert delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Grafana webhook payload, reduced to the fields the notifier uses.
#[derive(Debug, Clone, Deserialize)]
pub struct GrafanaAlertData {
    #[serde(default)]
    pub receiver: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub alerts: Vec<GrafanaAlert>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrafanaAlert {
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
}

#[derive(Serialize)]
struct BotMessage<'a> {
    msg_type: &'static str,
    content: BotContent<'a>,
}

#[derive(Serialize)]
struct BotContent<'a> {
    text: &'a str,
}

/// Chat-bot notifier.
pub struct AlertClient {
    http: reqwest::Client,
    webhook_base: String,
}

impl AlertClient {
    pub fn new(webhook_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_base,
        }
    }

    /// Sends a text notification for `data` to the bot identified by
    /// `chat_bot_id`.
    pub async fn notify(&self, chat_bot_id: &str, data: &GrafanaAlertData) -> Result<(), AlertError> {
        let first = data
            .alerts
            .first()
            .ok_or_else(|| AlertError::Invalid("alerts list is empty".to_owned()))?;

        let text = format!(
            "Alert firing ({})\nGenerator: {}",
            data.status, first.generator_url
        );
        let url = format!(
            "{}/{}",
            self.webhook_base.trim_end_matches('/'),
            chat_bot_id
        );

        let response = self
            .http
            .post(&url)
            .json(&BotMessage {
                msg_type: "text",
                content: BotContent { text: &text },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_grafana_payload() {
        let raw = r#"{
            "receiver": "relay",
            "status": "firing",
            "alerts": [{"generatorURL": "https://grafana.example.com/alerting/1"}]
        }"#;
        let data: GrafanaAlertData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.status, "firing");
        assert_eq!(
            data.alerts[0].generator_url,
            "https://grafana.example.com/alerting/1"
        );
    }

    #[tokio::test]
    async fn empty_alert_list_is_invalid() {
        let client = AlertClient::new("https://bots.example.com/hook".to_owned());
        let data = GrafanaAlertData {
            receiver: String::new(),
            status: "firing".to_owned(),
            alerts: Vec::new(),
        };
        assert!(matches!(
            client.notify("bot-1", &data).await,
            Err(AlertError::Invalid(_))
        ));
    }
}
