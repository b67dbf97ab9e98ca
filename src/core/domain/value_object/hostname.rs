use crate::core::domain::error::ValidationError;

/// Limits applied to guest hostnames.
#[derive(Debug, Clone)]
pub struct HostnameConfig {
    max_hostname_length: usize,
    max_label_length: usize,
}

impl HostnameConfig {
    fn validate_label(&self, label: &str) -> Result<(), ValidationError> {
        if label.is_empty() || label.len() > self.max_label_length {
            return Err(ValidationError::Format(format!(
                "Label must be between 1 and {} characters",
                self.max_label_length
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ValidationError::Format(
                "Label can only contain alphanumeric characters and hyphens".to_string(),
            ));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::Format(
                "Label cannot start or end with hyphen".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for HostnameConfig {
    fn default() -> Self {
        Self {
            max_hostname_length: 253,
            max_label_length: 63,
        }
    }
}

/// A guest hostname that satisfies RFC 1035 label rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostname(String);

impl Hostname {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        validate_hostname(value, &HostnameConfig::default())?;
        Ok(Self(value.to_string()))
    }

    /// The hostname given to a sandbox when the caller supplies none.
    pub fn default_for_vm(vmid: u32) -> Self {
        Self(format!("sandbox-{}", vmid))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn validate_hostname(value: &str, config: &HostnameConfig) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Field {
            field: "hostname".to_string(),
            message: "Hostname cannot be empty".to_string(),
        });
    }

    if value.len() > config.max_hostname_length {
        return Err(ValidationError::ConstraintViolation(format!(
            "Hostname length exceeds maximum of {} characters",
            config.max_hostname_length
        )));
    }

    for label in value.split('.') {
        config.validate_label(label)?;
    }

    Ok(())
}
