//! Trusted origin of the hosted payment surface.

use url::Url;

use crate::error::ConfigError;

/// The one origin allowed to post messages into a billing prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOrigin {
    origin: String,
}

impl TrustedOrigin {
    /// Build `scheme://<wildcard host with '*' replaced by service>`.
    ///
    /// `scheme` may carry the trailing colon browsers report in
    /// `location.protocol` (`"https:"`).
    pub fn for_service(
        scheme: &str,
        wildcard_host: &str,
        service: &str,
    ) -> Result<Self, ConfigError> {
        let scheme = scheme.trim().trim_end_matches(':');
        if scheme.is_empty() {
            return Err(ConfigError::EmptyScheme);
        }
        let host = wildcard_host_for(wildcard_host, service)?;
        Ok(Self {
            origin: format!("{scheme}://{host}"),
        })
    }

    /// Same as [`TrustedOrigin::for_service`], taking the scheme from the
    /// page the prompt is mounted on.
    pub fn from_page_url(
        page_url: &str,
        wildcard_host: &str,
        service: &str,
    ) -> Result<Self, ConfigError> {
        let parsed = Url::parse(page_url.trim())
            .map_err(|error| ConfigError::InvalidPageUrl(error.to_string()))?;
        Self::for_service(parsed.scheme(), wildcard_host, service)
    }

    /// Exact string comparison; never fails.
    #[must_use]
    pub fn is_trusted(&self, origin: &str) -> bool {
        self.origin == origin
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.origin
    }
}

/// Substitute `service` for the single `*` in `wildcard_host`.
pub fn wildcard_host_for(wildcard_host: &str, service: &str) -> Result<String, ConfigError> {
    let service = service.trim();
    if service.is_empty() {
        return Err(ConfigError::EmptyServiceName);
    }
    let pattern = wildcard_host.trim();
    if pattern.matches('*').count() != 1 {
        return Err(ConfigError::InvalidWildcardHost(pattern.to_string()));
    }
    Ok(pattern.replacen('*', service, 1))
}
