//! Portable text encoding for attribute values.
//!
//! Values are serialized as tagged JSON and wrapped in standard base64, so the stored text
//! carries the runtime type of the value. Encoding is deterministic: equal values always
//! produce equal text, which lets encoded values be compared inside SQL `IN` lists.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{IdentityError, IdentityResult, Value};

pub fn encode(value: &Value) -> IdentityResult<String> {
    // serde_json silently turns NaN and infinities into null.
    if !is_finite(value) {
        return Err(IdentityError::encoding("non-finite float cannot be encoded"));
    }
    let payload = serde_json::to_vec(value)
        .map_err(|err| IdentityError::encoding(format!("encode {}: {err}", value.kind_name())))?;
    Ok(BASE64.encode(payload))
}

pub fn decode(text: &str) -> IdentityResult<Value> {
    let payload = BASE64
        .decode(text.trim())
        .map_err(|err| IdentityError::encoding(format!("invalid base64 payload: {err}")))?;
    serde_json::from_slice(&payload)
        .map_err(|err| IdentityError::encoding(format!("invalid value payload: {err}")))
}

fn is_finite(value: &Value) -> bool {
    match value {
        Value::F64(value) => value.is_finite(),
        Value::List(values) => values.iter().all(is_finite),
        _ => true,
    }
}

/// Splits a value into the scalars stored as individual attribute rows.
pub fn storage_values(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(values) => values.iter().collect(),
        other => vec![other],
    }
}

/// Folds one more stored row into a multi-valued attribute.
pub fn merge_values(existing: Value, next: Value) -> Value {
    match existing {
        Value::List(mut values) => {
            values.push(next);
            Value::List(values)
        }
        single => Value::List(vec![single, next]),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode, encode, merge_values, storage_values};
    use crate::{IdentityError, Timestamp, Value};

    #[test]
    fn decode_restores_runtime_type() {
        for value in [
            Value::Str("admin".to_string()),
            Value::I64(42),
            Value::F64(1.5),
            Value::Bool(true),
            Value::Time(Timestamp(1_700_000_000_000)),
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::Json(json!({"nested": [1, 2]})),
            Value::Null,
        ] {
            let encoded = encode(&value).expect("encode");
            assert_eq!(decode(&encoded).expect("decode"), value);
        }
    }

    #[test]
    fn numbers_and_strings_do_not_collide() {
        let number = encode(&Value::I64(1)).expect("encode");
        let text = encode(&Value::Str("1".to_string())).expect("encode");
        assert_ne!(number, text);
    }

    #[test]
    fn encoding_is_deterministic() {
        let value = Value::Json(json!({"b": 1, "a": 2}));
        assert_eq!(encode(&value).expect("a"), encode(&value).expect("b"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode("%%%not base64%%%").expect_err("garbage");
        assert!(matches!(err, IdentityError::Encoding { .. }));
        let err = decode("bm90IGpzb24=").expect_err("not json");
        assert!(matches!(err, IdentityError::Encoding { .. }));
    }

    #[test]
    fn non_finite_floats_fail_to_encode() {
        let err = encode(&Value::F64(f64::NAN)).expect_err("nan");
        assert!(matches!(err, IdentityError::Encoding { .. }));
    }

    #[test]
    fn lists_are_stored_per_element_and_bytes_stay_whole() {
        let list = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(storage_values(&list).len(), 2);
        let bytes = Value::Bytes(vec![1, 2, 3]);
        assert_eq!(storage_values(&bytes), vec![&bytes]);
    }

    #[test]
    fn merge_builds_list_in_arrival_order() {
        let merged = merge_values(Value::from("admin"), Value::from("user"));
        let merged = merge_values(merged, Value::from("auditor"));
        assert_eq!(
            merged,
            Value::List(vec![
                Value::from("admin"),
                Value::from("user"),
                Value::from("auditor")
            ])
        );
    }
}
