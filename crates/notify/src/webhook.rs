//! HTTP webhook delivery.
//!
//! Each delivery sends one [`AlarmPayload`] describing the buffered groups
//! an action released: which action, which tests produced them, how many,
//! and the rendered subject and body.

use std::collections::HashMap;

use serde::Serialize;

use crate::traits::{Delivery, DeliveryError, Notification};

/// Header carrying the action id, so receivers can route without parsing the body.
const ACTION_HEADER: &str = "X-Tsalarm-Action";

/// JSON body posted to the endpoint.
#[derive(Debug, Serialize, PartialEq)]
pub struct AlarmPayload<'a> {
    pub action_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<&'a str>,
    pub test_ids: Vec<&'a str>,
    pub groups: usize,
    pub subject: &'a str,
    pub body: &'a str,
}

impl<'a> AlarmPayload<'a> {
    pub fn from_notification(notification: &'a Notification) -> Self {
        let meta = |key: &str| notification.metadata.get(key).map(String::as_str);
        Self {
            action_id: meta("action_id").unwrap_or_default(),
            severity: meta("severity"),
            test_ids: meta("test_ids")
                .map(|ids| ids.split(',').filter(|id| !id.is_empty()).collect())
                .unwrap_or_default(),
            groups: meta("groups").and_then(|g| g.parse().ok()).unwrap_or(0),
            subject: &notification.subject,
            body: &notification.body,
        }
    }
}

/// Delivers alarm payloads over HTTP.
///
/// `${VAR}` references in the URL and header values are expanded from the
/// environment once, when the delivery is built.
#[derive(Debug)]
pub struct WebhookDelivery {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new(
        url: &str,
        method: reqwest::Method,
        headers: &HashMap<String, String>,
    ) -> Result<Self, DeliveryError> {
        let headers = headers
            .iter()
            .map(|(k, v)| Ok((k.clone(), expand_env(v)?)))
            .collect::<Result<HashMap<_, _>, DeliveryError>>()?;
        Ok(Self {
            url: expand_env(url)?,
            method,
            headers,
            client: reqwest::Client::new(),
        })
    }

    /// Build from an action document's `delivery` block. The method is
    /// case-insensitive and defaults to `POST`.
    pub fn from_config(
        url: String,
        method: Option<String>,
        headers: Option<HashMap<String, String>>,
    ) -> Result<Self, DeliveryError> {
        let method = match method {
            Some(m) => m
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|_| DeliveryError::Config(format!("invalid HTTP method: {m}")))?,
            None => reqwest::Method::POST,
        };
        Self::new(&url, method, &headers.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Delivery for WebhookDelivery {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let payload = AlarmPayload::from_notification(notification);

        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(ACTION_HEADER, payload.action_id)
            .json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let reply = response.text().await.unwrap_or_default();
            tracing::warn!(
                action_id = payload.action_id,
                url = %self.url,
                %status,
                "alarm webhook rejected the payload"
            );
            return Err(DeliveryError::Config(format!("webhook returned {status}: {reply}")));
        }

        tracing::debug!(
            action_id = payload.action_id,
            groups = payload.groups,
            %status,
            "alarm webhook delivered"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Expand `${VAR}` references from the process environment.
fn expand_env(input: &str) -> Result<String, DeliveryError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            DeliveryError::Config(format!("unclosed env var reference in: {input}"))
        })?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| DeliveryError::Config(format!("env var not found: {name}")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
