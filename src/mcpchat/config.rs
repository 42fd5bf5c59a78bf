//! Configuration for the chat service.
//!
//! [`ChatConfig`] is a plain struct: construct it by hand, start from
//! [`ChatConfig::default`], or read it from the process environment with
//! [`ChatConfig::from_env`]. Every field has a default, so the service starts with no
//! environment variables set. No config-file parsing dependencies are involved.
//!
//! | variable | default |
//! |---|---|
//! | `MCP_SERVER_URL` | `http://localhost:3000/mcp` |
//! | `MCP_CLIENT_NAME` | `mcp-client` |
//! | `MCP_CLIENT_VERSION` | `1.0.0` |
//! | `OPENAI_API_KEY` | empty |
//! | `OPENAI_BASE_URL` | `https://dashscope.aliyuncs.com/compatible-mode/v1` |
//! | `OPENAI_MODEL` | `qwen-plus` |
//! | `OPENAI_SUMMARY_MODEL` | value of `OPENAI_MODEL` |
//! | `GATEWAY_TIMEOUT_MS` | `30000` |
//! | `MODEL_TIMEOUT_MS` | `60000` |
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `10000` |
//!
//! # Example
//!
//! ```rust
//! use mcpchat::config::ChatConfig;
//!
//! let config = ChatConfig::from_lookup(|key| match key {
//!     "OPENAI_MODEL" => Some("qwen-max".to_string()),
//!     "PORT" => Some("8080".to_string()),
//!     _ => None,
//! });
//! assert_eq!(config.planning_model, "qwen-max");
//! assert_eq!(config.summary_model, "qwen-max");
//! assert_eq!(config.port, 8080);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MCP_SERVER_URL: &str = "http://localhost:3000/mcp";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";

/// Settings consumed by the daemon and the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub mcp_server_url: String,
    pub mcp_client_name: String,
    pub mcp_client_version: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    /// Model for planning and for model steps.
    pub planning_model: String,
    pub summary_model: String,
    pub gateway_timeout: Duration,
    pub model_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mcp_server_url: DEFAULT_MCP_SERVER_URL.to_string(),
            mcp_client_name: "mcp-client".to_string(),
            mcp_client_version: "1.0.0".to_string(),
            openai_api_key: String::new(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            planning_model: DEFAULT_MODEL.to_string(),
            summary_model: DEFAULT_MODEL.to_string(),
            gateway_timeout: Duration::from_millis(30_000),
            model_timeout: Duration::from_millis(60_000),
            host: "0.0.0.0".to_string(),
            port: 10_000,
        }
    }
}

impl ChatConfig {
    /// Read the configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Blank values count as unset; unparseable
    /// numbers fall back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = ChatConfig::default();

        let planning_model = get("OPENAI_MODEL").unwrap_or(defaults.planning_model);
        let summary_model = get("OPENAI_SUMMARY_MODEL").unwrap_or_else(|| planning_model.clone());

        ChatConfig {
            mcp_server_url: get("MCP_SERVER_URL").unwrap_or(defaults.mcp_server_url),
            mcp_client_name: get("MCP_CLIENT_NAME").unwrap_or(defaults.mcp_client_name),
            mcp_client_version: get("MCP_CLIENT_VERSION").unwrap_or(defaults.mcp_client_version),
            openai_api_key: get("OPENAI_API_KEY").unwrap_or(defaults.openai_api_key),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            planning_model,
            summary_model,
            gateway_timeout: parse_or("GATEWAY_TIMEOUT_MS", get("GATEWAY_TIMEOUT_MS"), 30_000)
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
            model_timeout: parse_or("MODEL_TIMEOUT_MS", get("MODEL_TIMEOUT_MS"), 60_000)
                .map(Duration::from_millis)
                .unwrap_or(defaults.model_timeout),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port).unwrap_or(defaults.port),
        }
    }

    /// `HOST:PORT` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr + Copy + fmt::Display>(key: &str, raw: Option<String>, default: T) -> Option<T> {
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("{}={} is not a valid number, using {}", key, raw, default);
            Some(default)
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.openai_api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("ChatConfig")
            .field("mcp_server_url", &self.mcp_server_url)
            .field("mcp_client_name", &self.mcp_client_name)
            .field("mcp_client_version", &self.mcp_client_version)
            .field("openai_api_key", &key)
            .field("openai_base_url", &self.openai_base_url)
            .field("planning_model", &self.planning_model)
            .field("summary_model", &self.summary_model)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("model_timeout", &self.model_timeout)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(ChatConfig::from_lookup(|_| None), ChatConfig::default());
        assert_eq!(ChatConfig::default().bind_address(), "0.0.0.0:10000");
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let config = ChatConfig::from_lookup(lookup(&[
            ("MCP_SERVER_URL", " http://tools:3000/mcp "),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "qwen-max"),
            ("OPENAI_SUMMARY_MODEL", "qwen-turbo"),
            ("MODEL_TIMEOUT_MS", "1500"),
            ("HOST", "127.0.0.1"),
        ]));
        assert_eq!(config.mcp_server_url, "http://tools:3000/mcp");
        assert_eq!(config.openai_api_key, "sk-test");
        assert_eq!(config.planning_model, "qwen-max");
        assert_eq!(config.summary_model, "qwen-turbo");
        assert_eq!(config.model_timeout, Duration::from_millis(1500));
        assert_eq!(config.bind_address(), "127.0.0.1:10000");
    }

    #[test]
    fn bad_numbers_and_blank_values_fall_back() {
        let config = ChatConfig::from_lookup(lookup(&[
            ("PORT", "http"),
            ("GATEWAY_TIMEOUT_MS", "-5"),
            ("OPENAI_MODEL", "   "),
        ]));
        assert_eq!(config.port, 10_000);
        assert_eq!(config.gateway_timeout, Duration::from_millis(30_000));
        assert_eq!(config.planning_model, DEFAULT_MODEL);
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let config = ChatConfig {
            openai_api_key: "sk-very-secret".into(),
            ..ChatConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
