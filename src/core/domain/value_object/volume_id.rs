use crate::core::domain::error::ValidationError;
use crate::core::domain::value_object::storage_name::validate_storage_name;

/// A validated `storage:name` volume identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeId {
    storage: String,
    name: String,
}

impl VolumeId {
    /// Parses a volume identifier, rejecting anything not `storage:name`.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        validate_volume_id(value)?;
        let (storage, name) = value.trim().split_once(':').ok_or_else(|| {
            ValidationError::Format(format!("volume id {:?} must be storage:name", value))
        })?;
        Ok(Self {
            storage: storage.to_string(),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn storage(&self) -> &str {
        &self.storage
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.storage, self.name)
    }
}

/// Validates the `storage:name` shape.
pub(crate) fn validate_volume_id(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Field {
            field: "volume_id".to_string(),
            message: "Volume id cannot be empty".to_string(),
        });
    }
    let (storage, name) = value.split_once(':').ok_or_else(|| {
        ValidationError::Format(format!("volume id {:?} must be storage:name", value))
    })?;
    validate_storage_name(storage)?;
    if name.is_empty() {
        return Err(ValidationError::Format(format!(
            "volume id {:?} has an empty volume name",
            value
        )));
    }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::Format(format!(
            "volume id {:?} contains whitespace or control characters",
            value
        )));
    }
    Ok(())
}
