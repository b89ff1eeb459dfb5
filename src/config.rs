use serde::Deserialize;
use std::time::Duration;

use crate::envelope::MniVersion;
use crate::hasher::DigestCase;
use crate::mni_client::MniSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub mni_endpoint_url: String,
    pub mni_version: MniVersion,
    pub mni_system: String,
    pub mni_environment: String,
    pub mni_digest_case: DigestCase,
    pub mni_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            mni_endpoint_url: std::env::var("MNI_ENDPOINT_URL")
                .map_err(|_| anyhow::anyhow!("MNI_ENDPOINT_URL environment variable required"))
                .and_then(|url| validate_endpoint_url(&url).map(|_| url))?,
            mni_version: std::env::var("MNI_VERSION")
                .unwrap_or_else(|_| "2.2".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!("MNI_VERSION: {}", e))?,
            mni_system: std::env::var("MNI_SYSTEM")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "eproc".to_string()),
            mni_environment: std::env::var("MNI_ENVIRONMENT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "homologacao".to_string()),
            mni_digest_case: std::env::var("MNI_DIGEST_CASE")
                .unwrap_or_else(|_| "lower".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!("MNI_DIGEST_CASE: {}", e))?,
            mni_timeout_secs: std::env::var("MNI_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MNI_TIMEOUT_SECS must be a whole number of seconds"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("MNI_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(secs)
                })?,
        };

        // Log successful configuration load (credentials never live here)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("MNI endpoint: {}", config.mni_endpoint_url);
        tracing::debug!(
            "MNI version {} on {}/{}",
            config.mni_version,
            config.mni_system,
            config.mni_environment
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Settings for the MNI client bound at startup.
    pub fn mni_settings(&self) -> MniSettings {
        MniSettings {
            endpoint_url: self.mni_endpoint_url.clone(),
            version: self.mni_version,
            system: self.mni_system.clone(),
            environment: self.mni_environment.clone(),
            digest_case: self.mni_digest_case,
            timeout: Duration::from_secs(self.mni_timeout_secs),
        }
    }
}

/// Endpoint URLs must be absolute http(s) URLs.
pub fn validate_endpoint_url(url: &str) -> anyhow::Result<()> {
    if url.trim().is_empty() {
        anyhow::bail!("MNI endpoint URL cannot be empty");
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("MNI endpoint URL must start with http:// or https://");
    }
    url::Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid MNI endpoint URL: {}", e))?;
    Ok(())
}
