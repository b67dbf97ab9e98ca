use crate::core::domain::error::ValidationError;
use url::Url;

const MAX_URL_LENGTH: usize = 2083;
const API_PATH: &str = "/api2/json";

/// A validated Proxmox API base URL of the form `https://host:port/api2/json`.
///
/// A bare `https://host:port` is accepted and completed with `/api2/json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrl(Url);

impl ApiUrl {
    /// Parses and validates a base URL.
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        validate_url(value)?;
        let mut url = Url::parse(value.trim())
            .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
        let path = url.path().trim_end_matches('/').to_string();
        if path.is_empty() {
            url.set_path(API_PATH);
        } else {
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self(url))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Appends path segments, percent-encoding each one.
    ///
    /// Volume identifiers keep their `:` (allowed inside a segment) while any
    /// `/` inside a segment is encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ValidationError> {
        let mut url = self.0.clone();
        url.path_segments_mut()
            .map_err(|_| ValidationError::Format(format!("URL {} cannot be a base", self.0)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl std::fmt::Display for ApiUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates an API base URL string.
pub(crate) fn validate_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::Field {
            field: "base_url".to_string(),
            message: "URL cannot be empty".to_string(),
        });
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(ValidationError::Format(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }
    let parsed =
        Url::parse(url).map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
    if !matches!(parsed.scheme(), "https" | "http") {
        return Err(ValidationError::ConstraintViolation(format!(
            "Invalid scheme {:?}. Must be one of: https, http",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ValidationError::Field {
            field: "base_url".to_string(),
            message: "URL must include a host".to_string(),
        });
    }
    let path = parsed.path().trim_end_matches('/');
    if !path.is_empty() && path != API_PATH {
        return Err(ValidationError::ConstraintViolation(format!(
            "Invalid API path {:?}. Must be {}",
            path, API_PATH
        )));
    }
    Ok(())
}
