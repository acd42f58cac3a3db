//! `abi.require` (spec §4.5). Mirrors `vm_py.runtime.abi`: raise a
//! structured error when a condition fails, decoding a byte-string message
//! as UTF-8 with lossy replacement, falling back to a debug rendering for
//! non-bytes messages.

use animica_vm_core::{codes, Value, VmError};

const DEFAULT_MESSAGE: &str = "abi.require failed";

fn to_message(message: Option<&Value>) -> String {
    match message {
        None => DEFAULT_MESSAGE.to_string(),
        Some(Value::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
        Some(other) => format!("{other:?}"),
    }
}

/// Raises a `VmError` tagged `codes::ABI_REQUIRE_FAILED` if `condition` is
/// falsy (per [`Value::truthy`]).
pub fn require(condition: &Value, message: Option<&Value>, code: Option<&str>) -> Result<(), VmError> {
    if condition.truthy() {
        return Ok(());
    }
    let code = code.unwrap_or(codes::ABI_REQUIRE_FAILED);
    Err(VmError::new(code, to_message(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn passes_on_truthy_condition() {
        require(&Value::Bool(true), None, None).unwrap();
    }

    #[test]
    fn fails_with_default_message_on_falsy_condition() {
        let err = require(&Value::int(BigUint::from(0u8)), None, None).unwrap_err();
        assert_eq!(err.message, DEFAULT_MESSAGE);
        assert_eq!(err.code, codes::ABI_REQUIRE_FAILED);
    }

    #[test]
    fn decodes_bytes_message_as_utf8() {
        let err = require(&Value::Bool(false), Some(&Value::Bytes(b"nope".to_vec())), None).unwrap_err();
        assert_eq!(err.message, "nope");
    }

    #[test]
    fn accepts_custom_code() {
        let err = require(&Value::Bool(false), None, Some("custom_code")).unwrap_err();
        assert_eq!(err.code, "custom_code");
    }
}
