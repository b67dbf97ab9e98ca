//! Disk specification parsing and resize arithmetic.

use crate::core::domain::error::ValidationError;
use crate::core::parser::config::detect_root_disk;
use std::collections::BTreeMap;

/// Returns the `size=` token of a disk spec such as
/// `local-zfs:vm-100-disk-0,discard=on,size=2.8G`.
pub fn disk_size_token(spec: &str) -> Option<&str> {
    spec.split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("size="))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Converts a size token (`512M`, `2.8G`, `1T`, `40GB`, `2147483648`) to GiB.
pub fn parse_size_gb(token: &str) -> Result<f64, ValidationError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ValidationError::Field {
            field: "size".to_string(),
            message: "Disk size cannot be empty".to_string(),
        });
    }

    let upper = token.to_ascii_uppercase();
    let without_b = match upper.strip_suffix('B') {
        Some(rest) if rest.ends_with(|c: char| "KMGT".contains(c)) => rest,
        Some(rest) if rest.ends_with(|c: char| c.is_ascii_digit() || c == '.') => rest,
        _ => upper.as_str(),
    };

    let (number, exponent) = match without_b.chars().last() {
        Some('K') => (&without_b[..without_b.len() - 1], 1),
        Some('M') => (&without_b[..without_b.len() - 1], 2),
        Some('G') => (&without_b[..without_b.len() - 1], 3),
        Some('T') => (&without_b[..without_b.len() - 1], 4),
        Some(c) if c.is_ascii_digit() || c == '.' => (without_b, 0),
        _ => {
            return Err(ValidationError::Format(format!(
                "Disk size {:?} has an unknown unit suffix",
                token
            )));
        }
    };

    let value: f64 = number.trim().parse().map_err(|_| {
        ValidationError::Format(format!("Disk size {:?} is not a number", token))
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::Format(format!(
            "Disk size {:?} must be a non-negative number",
            token
        )));
    }

    // Convert from the given unit to GiB: K=1, M=2, G=3, T=4 powers of 1024.
    Ok(value * 1024f64.powi(exponent - 3))
}

/// GiB to add so the disk reaches `target_gb`; zero when it is already large
/// enough.
///
/// The hypervisor accepts only whole-GiB increments, so a fractional current
/// size is floored first and the disk is never shrunk.
pub fn resize_delta(current_gb: f64, target_gb: u32) -> u32 {
    let current = current_gb.floor();
    let target = f64::from(target_gb);
    if current >= target {
        0
    } else {
        (target - current.max(0.0)) as u32
    }
}

/// The `size` argument for a grow request.
pub fn resize_argument(delta_gb: u32) -> String {
    format!("+{}G", delta_gb)
}

/// A single grow operation to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePlan {
    pub disk: String,
    pub delta_gb: u32,
}

impl ResizePlan {
    pub fn size_argument(&self) -> String {
        resize_argument(self.delta_gb)
    }
}

/// Works out whether the root disk must grow to reach `target_gb`.
///
/// Returns `Ok(None)` when the disk is already at least that large.
pub fn plan_root_disk_resize(
    config: &BTreeMap<String, String>,
    root_disk: Option<&str>,
    target_gb: u32,
) -> Result<Option<ResizePlan>, ValidationError> {
    let disk = match root_disk {
        Some(disk) => disk.to_string(),
        None => detect_root_disk(config).ok_or_else(|| {
            ValidationError::ConstraintViolation(
                "unable to detect the root disk; set root_disk explicitly".to_string(),
            )
        })?,
    };

    let spec = config.get(&disk).ok_or_else(|| {
        ValidationError::ConstraintViolation(format!("root disk {} not present in vm config", disk))
    })?;
    let token = disk_size_token(spec).ok_or_else(|| {
        ValidationError::Format(format!("disk spec {:?} has no size= entry", spec))
    })?;
    let current = parse_size_gb(token)?;

    let delta_gb = resize_delta(current, target_gb);
    if delta_gb == 0 {
        return Ok(None);
    }
    Ok(Some(ResizePlan { disk, delta_gb }))
}
