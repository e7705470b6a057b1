//! Store configuration parsed from environment variables.

pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_CALLBACK_PATH: &str = "/api/auth/callback";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AUTH_SITE_URL must start with http:// or https://, got '{0}'")]
    InvalidSiteUrl(String),
    #[error("AUTH_CALLBACK_PATH must start with '/', got '{0}'")]
    InvalidCallbackPath(String),
}

/// Where identity flows send the user agent back to once they complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Public origin of the application, without trailing slash.
    pub site_url: String,
    /// Path on `site_url` that finishes federated and link sign-in.
    pub callback_path: String,
}

impl StoreConfig {
    /// Build typed store config from environment variables.
    ///
    /// Optional:
    /// - `AUTH_SITE_URL`: default `http://localhost:3000`
    /// - `AUTH_CALLBACK_PATH`: default `/api/auth/callback`
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if either value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(
            std::env::var("AUTH_SITE_URL").unwrap_or_else(|_| DEFAULT_SITE_URL.to_string()),
            std::env::var("AUTH_CALLBACK_PATH").unwrap_or_else(|_| DEFAULT_CALLBACK_PATH.to_string()),
        )
    }

    /// Build and validate a config from explicit values.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the site URL is not http(s) or the
    /// callback path is not absolute.
    pub fn new(site_url: impl Into<String>, callback_path: impl Into<String>) -> Result<Self, ConfigError> {
        let site_url = site_url.into().trim().trim_end_matches('/').to_string();
        if !(site_url.starts_with("http://") || site_url.starts_with("https://")) {
            return Err(ConfigError::InvalidSiteUrl(site_url));
        }

        let callback_path = callback_path.into().trim().to_string();
        if !callback_path.starts_with('/') {
            return Err(ConfigError::InvalidCallbackPath(callback_path));
        }

        Ok(Self { site_url, callback_path })
    }

    /// Full URL the backend should redirect to after sign-in.
    #[must_use]
    pub fn redirect_target(&self) -> String {
        format!("{}{}", self.site_url, self.callback_path)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { site_url: DEFAULT_SITE_URL.to_string(), callback_path: DEFAULT_CALLBACK_PATH.to_string() }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
