#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

impl std::fmt::Display for ReasonCodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("'{field}' exceeds {max} entries (got {got})")]
    TooMany {
        field: &'static str,
        max: usize,
        got: usize,
    },
}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_reason_code_renders_as_hex() {
        assert_eq!(ReasonCodeId(0x5342_0001).to_string(), "0x53420001");
    }

    #[test]
    fn at_common_02_violation_message_names_field() {
        let v = ContractViolation::InvalidValue {
            field: "intent_name",
            reason: "must not be empty",
        };
        assert_eq!(v.to_string(), "invalid value for 'intent_name': must not be empty");
    }
}
