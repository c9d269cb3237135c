#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractViolation {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{field} out of range [{min}, {max}]: got {got}")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn require_finite(field: &'static str, v: f64) -> Result<(), ContractViolation> {
    if !v.is_finite() {
        return Err(ContractViolation::NotFinite { field });
    }
    Ok(())
}

pub(crate) fn require_range(
    field: &'static str,
    v: f64,
    min: f64,
    max: f64,
) -> Result<(), ContractViolation> {
    require_finite(field, v)?;
    if v < min || v > max {
        return Err(ContractViolation::InvalidRange {
            field,
            min,
            max,
            got: v,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_display_names_the_field() {
        let v = ContractViolation::InvalidValue {
            field: "parsed_command.operations",
            reason: "must be <= 32 entries",
        };
        assert_eq!(
            v.to_string(),
            "invalid value for parsed_command.operations: must be <= 32 entries"
        );
    }

    #[test]
    fn range_rejects_nan_before_bounds() {
        assert_eq!(
            require_range("confidence", f64::NAN, 0.0, 1.0),
            Err(ContractViolation::NotFinite {
                field: "confidence"
            })
        );
        assert!(require_range("confidence", 1.2, 0.0, 1.0).is_err());
        assert!(require_range("confidence", 0.4, 0.0, 1.0).is_ok());
    }
}
