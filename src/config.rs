use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

fn default_secret() -> String {
    "change-me".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_receipt_max_len() -> usize {
    40
}

fn default_gateway_timeout_ms() -> u64 {
    3_000
}

/// Runtime configuration for the commerce core.
///
/// Loaded from an optional JSON file; every field has a default so the
/// CLI can run without one. The secret signs payment confirmations and
/// must be overridden outside of local development.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_secret")]
    pub server_secret: String,
    /// ISO currency code stored on every payment row.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Gateway-imposed cap on the receipt string.
    #[serde(default = "default_receipt_max_len")]
    pub receipt_max_len: usize,
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_secret: default_secret(),
            currency: default_currency(),
            receipt_max_len: default_receipt_max_len(),
            gateway_timeout_ms: default_gateway_timeout_ms(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.currency, "INR");
        assert_eq!(config.receipt_max_len, 40);
        assert_eq!(config.gateway_timeout_ms, 3_000);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"server_secret": "s3cret"}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server_secret, "s3cret");
        assert_eq!(config.currency, "INR");
    }
}
