use crate::core::domain::error::ValidationError;

/// A trimmed, non-empty snapshot name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotName(String);

impl SnapshotName {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        validate_snapshot_name(value)?;
        Ok(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn validate_snapshot_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::Field {
            field: "snapshot".to_string(),
            message: "Snapshot name cannot be empty".to_string(),
        });
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::Format(
            "Snapshot name must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_trimmed() {
        assert_eq!(SnapshotName::new("  clean ").unwrap().as_str(), "clean");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(SnapshotName::new("").is_err());
        assert!(SnapshotName::new("   ").is_err());
        assert!(SnapshotName::new("a\nb").is_err());
    }
}
