use crate::core::domain::error::ValidationError;

const MAX_STORAGE_NAME_LENGTH: usize = 64;

/// Validates a Proxmox storage identifier: 1..=64 chars of alnum and `-_.`.
pub(crate) fn validate_storage_name(storage: &str) -> Result<(), ValidationError> {
    if storage.is_empty() {
        return Err(ValidationError::Field {
            field: "storage".to_string(),
            message: "Storage name cannot be empty".to_string(),
        });
    }
    if storage.len() > MAX_STORAGE_NAME_LENGTH {
        return Err(ValidationError::Format(format!(
            "Storage name must be at most {} characters (got {})",
            MAX_STORAGE_NAME_LENGTH,
            storage.len()
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.';
    if !storage.chars().all(allowed) {
        return Err(ValidationError::Format(format!(
            "Storage name {:?} contains invalid characters. Allowed: alphanumeric, -, _, .",
            storage
        )));
    }
    Ok(())
}
