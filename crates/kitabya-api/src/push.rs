use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// Topic every client subscribes to; broadcasts go here.
pub const BROADCAST_TOPIC: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    Device(String),
    Topic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The device token is no longer registered; callers should prune it.
    #[error("registration token is not registered")]
    Unregistered,

    #[error("push delivery failed: {0}")]
    Delivery(String),
}

/// Delivers push notifications and returns the provider's message id.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<String, PushError>;
}

/// Sends FCM v1 shaped messages to an HTTP endpoint with a bearer key.
pub struct HttpPushSender {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl HttpPushSender {
    pub fn new(endpoint: String, server_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            server_key,
        })
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<String, PushError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.server_key)
            .json(&payload(target, message))
            .send()
            .await
            .map_err(|e| PushError::Delivery(e.to_string()))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        debug!("Push endpoint answered {} for {:?}", status, target);

        if status.is_success() {
            return body
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| PushError::Delivery("response carried no message name".into()));
        }

        Err(classify_failure(status, &body))
    }
}

/// Used when no push endpoint is configured.
pub struct DisabledPushSender;

#[async_trait]
impl PushSender for DisabledPushSender {
    async fn send(&self, _target: &PushTarget, _message: &PushMessage) -> Result<String, PushError> {
        Err(PushError::Delivery("push delivery is not configured".into()))
    }
}

fn payload(target: &PushTarget, message: &PushMessage) -> Value {
    let mut msg = json!({
        "notification": { "title": message.title, "body": message.body },
        "data": message.data,
        "android": {
            "priority": "high",
            "notification": {
                "channel_id": "default",
                "click_action": "FLUTTER_NOTIFICATION_CLICK"
            }
        },
        "apns": {
            "payload": {
                "aps": { "content-available": 1, "badge": 1, "sound": "default" }
            }
        }
    });
    match target {
        PushTarget::Device(token) => msg["token"] = json!(token),
        PushTarget::Topic(topic) => msg["topic"] = json!(topic),
    }
    json!({ "message": msg })
}

fn classify_failure(status: StatusCode, body: &Value) -> PushError {
    let unregistered = body["error"]["details"]
        .as_array()
        .map(|details| {
            details
                .iter()
                .any(|d| d["errorCode"].as_str() == Some("UNREGISTERED"))
        })
        .unwrap_or(false);

    if unregistered || status == StatusCode::NOT_FOUND {
        return PushError::Unregistered;
    }

    let reason = body["error"]["message"].as_str().unwrap_or("no error message");
    PushError::Delivery(format!("{}: {}", status, reason))
}

/// Push data maps carry strings only. Numbers and booleans are stringified;
/// anything else is rejected with the offending key.
pub fn stringify_data(
    data: Option<&serde_json::Map<String, Value>>,
) -> Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    for (key, value) in data.into_iter().flatten() {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(key.clone()),
        };
        out.insert(key.clone(), text);
    }
    Ok(out)
}
