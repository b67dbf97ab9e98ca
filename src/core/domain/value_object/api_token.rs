use crate::core::domain::error::ValidationError;

/// A Proxmox API token in `USER@REALM!TOKENID=SECRET` form.
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Parses and validates a token.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into().trim().to_string();
        validate_api_token(&value)?;
        Ok(Self(value))
    }

    /// The `USER@REALM!TOKENID` part.
    #[must_use]
    pub fn token_id(&self) -> &str {
        self.0.split_once('=').map(|(id, _)| id).unwrap_or(&self.0)
    }

    /// Value of the `Authorization` header.
    #[must_use]
    pub fn as_header_value(&self) -> String {
        format!("PVEAPIToken={}", self.0)
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiToken({}=<redacted>)", self.token_id())
    }
}

/// Validates the `USER@REALM!TOKENID=SECRET` shape.
pub(crate) fn validate_api_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::Field {
            field: "token".to_string(),
            message: "API token cannot be empty".to_string(),
        });
    }
    if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::Format(
            "API token must not contain whitespace or control characters".to_string(),
        ));
    }
    let (id, secret) = token.split_once('=').ok_or_else(|| {
        ValidationError::Format("API token must be in format USER@REALM!TOKENID=SECRET".to_string())
    })?;
    let (user_realm, token_name) = id.split_once('!').ok_or_else(|| {
        ValidationError::Format("API token id must contain '!' before the token name".to_string())
    })?;
    let (user, realm) = user_realm.split_once('@').ok_or_else(|| {
        ValidationError::Format("API token user must be in format USER@REALM".to_string())
    })?;
    if user.is_empty() || realm.is_empty() || token_name.is_empty() || secret.is_empty() {
        return Err(ValidationError::Format(
            "API token user, realm, token name and secret must all be non-empty".to_string(),
        ));
    }
    Ok(())
}
