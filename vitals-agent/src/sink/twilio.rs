//! Twilio REST sink
//!
//! SMS goes to `Messages.json`; calls go to `Calls.json` with either a
//! configured TwiML URL or an inline `<Say>` of the message.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use vitals_common::config::DispatchConfig;

use super::{Channel, DispatchError, DispatchSink};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Clone)]
pub struct TwilioSink {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
    voice_url: Option<String>,
}

fn required(value: Option<&String>, field: &str) -> Result<String, DispatchError> {
    value
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| DispatchError::NotConfigured(format!("[dispatch] {} is missing", field)))
}

/// Minimal XML escaping for text spoken through `<Say>`
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn say_twiml(message: &str) -> String {
    format!("<Response><Say>{}</Say></Response>", escape_xml(message))
}

impl TwilioSink {
    /// `auth_token` is resolved by the caller (environment first, then TOML)
    pub fn from_config(config: &DispatchConfig, auth_token: Option<String>) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_base: TWILIO_API_BASE.to_string(),
            account_sid: required(config.account_sid.as_ref(), "account_sid")?,
            auth_token: required(auth_token.as_ref(), "auth_token")?,
            from_number: required(config.from_number.as_ref(), "from_number")?,
            to_number: required(config.to_number.as_ref(), "to_number")?,
            voice_url: config.voice_url.clone().filter(|v| !v.trim().is_empty()),
        })
    }

    /// Point at a different API root (local test servers)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn resource_url(&self, channel: Channel) -> String {
        let resource = match channel {
            Channel::Sms => "Messages.json",
            Channel::Call => "Calls.json",
        };
        format!("{}/Accounts/{}/{}", self.api_base, self.account_sid, resource)
    }

    fn form(&self, channel: Channel, message: &str) -> Vec<(&'static str, String)> {
        let mut form = vec![("To", self.to_number.clone()), ("From", self.from_number.clone())];
        match channel {
            Channel::Sms => form.push(("Body", message.to_string())),
            Channel::Call => match &self.voice_url {
                Some(url) => form.push(("Url", url.clone())),
                None => form.push(("Twiml", say_twiml(message))),
            },
        }
        form
    }
}

#[async_trait]
impl DispatchSink for TwilioSink {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, channel: Channel, message: &str) -> Result<(), DispatchError> {
        let url = self.resource_url(channel);
        debug!(channel = %channel, url = %url, "Posting to Twilio");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&self.form(channel, message))
            .send()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(channel = %channel, "Twilio accepted {}", channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DispatchConfig {
        DispatchConfig {
            account_sid: Some("AC123".to_string()),
            from_number: Some("+15550001".to_string()),
            to_number: Some("+15550002".to_string()),
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_missing_credentials_not_configured() {
        let result = TwilioSink::from_config(&config(), None);
        assert!(matches!(result, Err(DispatchError::NotConfigured(_))));
    }

    #[test]
    fn test_sms_form_and_url() {
        let sink = TwilioSink::from_config(&config(), Some("secret".to_string())).unwrap();
        assert_eq!(
            sink.resource_url(Channel::Sms),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        let form = sink.form(Channel::Sms, "Rest a little");
        assert!(form.contains(&("Body", "Rest a little".to_string())));
        assert!(form.contains(&("To", "+15550002".to_string())));
    }

    #[test]
    fn test_call_uses_escaped_inline_twiml_without_voice_url() {
        let sink = TwilioSink::from_config(&config(), Some("secret".to_string())).unwrap();
        let form = sink.form(Channel::Call, "HR <130> & falling");
        assert!(form.contains(&(
            "Twiml",
            "<Response><Say>HR &lt;130&gt; &amp; falling</Say></Response>".to_string()
        )));
    }

    #[test]
    fn test_call_prefers_voice_url() {
        let mut config = config();
        config.voice_url = Some("https://example.test/voice.xml".to_string());
        let sink = TwilioSink::from_config(&config, Some("secret".to_string())).unwrap();
        let form = sink.form(Channel::Call, "ignored");
        assert!(form.contains(&("Url", "https://example.test/voice.xml".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "Twiml"));
    }
}
