use std::time::Duration;

use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use sidekick_core::tool::{Error as ToolError, Tool, ToolResult};

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_CHARS: usize = 1024;
const MAX_BODY_CHARS: usize = 200;

/// Input of [`PushTool`].
#[derive(Deserialize, JsonSchema)]
pub struct PushToolParameters {
    #[schemars(description = "The exact message text to send.")]
    message: String,
}

/// A tool for sending push notifications through Pushover.
///
/// Without both credentials every call answers with an error text instead
/// of contacting the service.
pub struct PushTool {
    client: Client,
    endpoint: String,
    token: Option<String>,
    user: Option<String>,
    parameter_schema: Value,
}

impl PushTool {
    /// Creates a push tool with the Pushover application token and user key.
    #[inline]
    pub fn new(token: Option<String>, user: Option<String>) -> Self {
        PushTool {
            client: Client::new(),
            endpoint: PUSHOVER_URL.to_owned(),
            token: token.filter(|t| !t.is_empty()),
            user: user.filter(|u| !u.is_empty()),
            parameter_schema: schema_for!(PushToolParameters).to_value(),
        }
    }

    /// Posts to another endpoint instead of Pushover.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Returns `true` if both credentials are present.
    #[inline]
    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }
}

impl Tool for PushTool {
    type Input = PushToolParameters;

    fn name(&self) -> &str {
        "send_push_notification"
    }

    fn description(&self) -> &str {
        "Send a push notification to the user. Input should be the exact message text."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: PushToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let credentials = self.token.clone().zip(self.user.clone());
        async move {
            let Some((token, user)) = credentials else {
                warn!("push requested without Pushover credentials");
                return Err(ToolError::execution_error()
                    .with_reason("missing credentials."));
            };
            let message = truncate_chars(&input.message, MAX_MESSAGE_CHARS);
            let form = [
                ("token", token.as_str()),
                ("user", user.as_str()),
                ("message", message),
            ];
            let resp = match client
                .post(&endpoint)
                .form(&form)
                .timeout(TIMEOUT)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => return Ok(format!("Push failed: {err}")),
            };

            let status = resp.status();
            if status.is_success() {
                info!("push sent");
                return Ok("Push sent.".to_owned());
            }
            let body = resp.text().await.unwrap_or_default();
            Ok(format!(
                "Push failed: {} {}",
                status.as_u16(),
                truncate_chars(&body, MAX_BODY_CHARS)
            ))
        }
    }
}

#[inline]
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
