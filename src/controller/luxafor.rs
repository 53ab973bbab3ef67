use std::time::Duration;

use log::{debug, warn};
use serde_derive::Serialize;
use tokio::runtime::Handle;

use super::DeviceController;
use crate::config::LuxaforConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.luxafor.com/webhook/v1/actions/solid_color";
const DEFAULT_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Serialize, PartialEq)]
struct ActionFields {
    color: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_color: Option<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
struct SolidColorRequest {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "actionFields")]
    action_fields: ActionFields,
}

impl SolidColorRequest {
    fn red(user_id: &str) -> Self {
        SolidColorRequest {
            user_id: user_id.to_string(),
            action_fields: ActionFields {
                color: "red",
                custom_color: None,
            },
        }
    }

    fn off(user_id: &str) -> Self {
        SolidColorRequest {
            user_id: user_id.to_string(),
            action_fields: ActionFields {
                color: "custom",
                custom_color: Some("000000"),
            },
        }
    }
}

/// Luxafor webhook client. Requests are spawned on the runtime and never
/// awaited; failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct LuxaforClient {
    http: reqwest::Client,
    endpoint: String,
    runtime: Handle,
}

impl LuxaforClient {
    pub fn new(config: Option<&LuxaforConfig>, runtime: Handle) -> anyhow::Result<Self> {
        let timeout = config
            .and_then(|c| c.timeout_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let endpoint = config
            .and_then(|c| c.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(LuxaforClient {
            http,
            endpoint,
            runtime,
        })
    }

    fn request(&self, body: &SolidColorRequest) -> reqwest::RequestBuilder {
        self.http.post(&self.endpoint).json(body)
    }

    fn post(&self, body: SolidColorRequest) {
        let request = self.request(&body);
        let color = body.action_fields.color;
        self.runtime.spawn(deliver(request, color));
    }
}

/// Sends one color change, logging any failure. Returns whether the webhook
/// accepted it.
async fn deliver(request: reqwest::RequestBuilder, color: &'static str) -> bool {
    match request.send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!("Luxafor accepted color {}", color);
            true
        }
        Ok(resp) => {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!("Luxafor rejected color {} ({}): {}", color, status, text);
            false
        }
        Err(err) => {
            warn!("Error sending color {} to Luxafor: {:?}", color, err);
            false
        }
    }
}

impl DeviceController for LuxaforClient {
    fn set_active(&self, identity: &str) {
        self.post(SolidColorRequest::red(identity));
    }

    fn set_inactive(&self, identity: &str) {
        self.post(SolidColorRequest::off(identity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies() {
        let red = serde_json::to_value(SolidColorRequest::red("42")).unwrap();
        assert_eq!(
            red,
            serde_json::json!({"userId": "42", "actionFields": {"color": "red"}})
        );

        let off = serde_json::to_value(SolidColorRequest::off("42")).unwrap();
        assert_eq!(
            off,
            serde_json::json!({
                "userId": "42",
                "actionFields": {"color": "custom", "custom_color": "000000"}
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_failure() {
        let config = LuxaforConfig {
            endpoint: Some("http://127.0.0.1:9/webhook".to_string()),
            timeout_seconds: Some(1),
        };
        let client = LuxaforClient::new(Some(&config), Handle::current()).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:9/webhook");

        let request = client.request(&SolidColorRequest::red("42"));
        assert!(!deliver(request, "red").await);

        // The fire-and-forget path swallows the same failure.
        client.set_active("42");
        client.set_inactive("42");
    }
}
