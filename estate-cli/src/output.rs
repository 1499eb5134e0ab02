use crate::{cli::OutputFormat, error::Result};
#[cfg(feature = "colored-output")]
use colored::*;
use estate_auth::{Identity, TransportResponse};
use serde_json::{Value, json};

pub struct OutputManager {
    #[cfg_attr(not(feature = "colored-output"), allow(dead_code))]
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_response(
        &self,
        response: &TransportResponse,
        format: OutputFormat,
    ) -> Result<String> {
        let body = body_value(response);
        match format {
            OutputFormat::Pretty => {
                let status = response.status.to_string();
                let status = if response.is_success() {
                    self.success(&status)
                } else {
                    self.failure(&status)
                };
                let body = match &body {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => serde_json::to_string_pretty(other)?,
                };
                Ok(format!("HTTP {status}\n{body}"))
            }
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "status": response.status.as_u16(),
                "body": body,
            }))?),
        }
    }

    pub fn format_status(
        &self,
        authenticated: bool,
        identity: Option<&Identity>,
        base_url: &str,
        format: OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Pretty => {
                let state = if authenticated {
                    self.success("signed in")
                } else {
                    self.failure("signed out")
                };
                let mut out = format!("Session: {state}\nBackend: {base_url}");
                if let Some(identity) = identity {
                    out.push_str(&format!("\nRole:    {}", identity.role));
                }
                Ok(out)
            }
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "authenticated": authenticated,
                "identity": identity,
                "api_url": base_url,
            }))?),
        }
    }

    fn success(&self, text: &str) -> String {
        #[cfg(feature = "colored-output")]
        if self.colored {
            return text.green().bold().to_string();
        }
        text.to_string()
    }

    fn failure(&self, text: &str) -> String {
        #[cfg(feature = "colored-output")]
        if self.colored {
            return text.red().bold().to_string();
        }
        text.to_string()
    }
}

/// JSON bodies are kept structured; anything else is shown as text.
fn body_value(response: &TransportResponse) -> Value {
    if response.body.is_empty() {
        return Value::Null;
    }
    response
        .json::<Value>()
        .unwrap_or_else(|_| Value::String(response.text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_json_output_keeps_structure() {
        let manager = OutputManager::new(false);
        let response = TransportResponse::new(StatusCode::OK, r#"{"items":[1,2]}"#);

        let out = manager.format_response(&response, OutputFormat::Json).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(value["status"], 200);
        assert_eq!(value["body"]["items"][1], 2);
    }

    #[test]
    fn test_pretty_output_for_text_body() {
        let manager = OutputManager::new(false);
        let response = TransportResponse::new(StatusCode::NOT_FOUND, "no such property");

        let out = manager.format_response(&response, OutputFormat::Pretty).unwrap();

        assert_eq!(out, "HTTP 404 Not Found\nno such property");
    }
}
