//! Deterministic canonicalization of structured values.
//!
//! This is the bit-exact interop boundary: the `args-hash`, the envelope
//! hash, the challenge payload, and the per-request signature payload are
//! all computed over the output of [`canonicalize`]. Any two
//! implementations that disagree here will reject each other's requests.
//!
//! # Rules
//!
//! - Object keys are sorted lexicographically, recursively.
//! - Arrays preserve order.
//! - Strings are emitted as RFC 8259 JSON strings.
//! - Numbers are emitted in their shortest round-trippable form.
//! - A field that is absent in Rust (`Option::None`) is omitted entirely,
//!   standing in for the source model's `undefined`; a field that is
//!   present and explicitly `null` is emitted as `null`.
//!
//! Lexicographic key sorting at every nesting depth falls out of
//! `serde_json::to_string` for free as long as the `preserve_order`
//! feature is never enabled anywhere in this workspace: `serde_json::Map`
//! is then backed by a `BTreeMap`, not insertion order.

use crate::errors::AuthError;
use serde::Serialize;
use serde_json::Value;

/// Canonicalize any serializable value into its deterministic byte
/// representation.
///
/// Note: this returns `String`, not `Vec<u8>` — the payload is always
/// UTF-8 JSON text and every caller in this crate treats it as such
/// (e.g. interpolating it into the per-request signature payload).
pub fn canonicalize<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize_value(&value))
}

/// Canonicalize an already-parsed [`Value`]. Exposed separately because
/// the challenge and per-request protocols both need to canonicalize an
/// argument map with one key (`sig` or `auth`) removed, which is easiest
/// to do on the `Value` directly rather than round-tripping through a
/// typed struct.
pub fn canonicalize_value(value: &Value) -> String {
    // serde_json's Map is a BTreeMap (no `preserve_order` feature in this
    // workspace), so `to_string` already sorts object keys recursively,
    // preserves array order, and prints numbers in shortest form.
    serde_json::to_string(value).expect("Value serialization is infallible")
}

/// Remove a top-level key from a JSON object before canonicalizing it.
/// Used to strip `sig`/`auth` from a mutation's argument map.
pub fn without_key(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove(key);
            Value::Object(map)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": 1, "y": 2}});
        assert_eq!(canonicalize_value(&v), r#"{"a":{"y":2,"z":1},"b":1}"#);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!({"xs": [3, 1, 2]});
        assert_eq!(canonicalize_value(&v), r#"{"xs":[3,1,2]}"#);
    }

    #[test]
    fn arrays_of_arrays_sort_inner_objects_only() {
        let v = json!([[{"b": 1, "a": 2}], [3]]);
        assert_eq!(canonicalize_value(&v), r#"[[{"a":2,"b":1}],[3]]"#);
    }

    #[test]
    fn unicode_keys_round_trip() {
        let v = json!({"Ж": 1, "a": 2, "中": 3});
        let c = canonicalize_value(&v);
        let parsed: Value = serde_json::from_str(&c).unwrap();
        assert_eq!(canonicalize_value(&parsed), c);
    }

    #[derive(Serialize)]
    struct WithOptional {
        a: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        b: Option<u32>,
        c: Option<u32>,
    }

    #[test]
    fn omitted_option_is_dropped_not_null() {
        let v = WithOptional {
            a: 1,
            b: None,
            c: None,
        };
        let c = canonicalize(&v).unwrap();
        // `b` is skip_serializing_if-omitted (the "undefined" case);
        // `c` has no such attribute so it serializes as explicit null.
        assert_eq!(c, r#"{"a":1,"c":null}"#);
    }

    #[test]
    fn round_trip_is_stable() {
        let v = json!({"z": [1, 2, {"k": "v", "j": null}], "a": "hello \"world\""});
        let c1 = canonicalize_value(&v);
        let parsed: Value = serde_json::from_str(&c1).unwrap();
        let c2 = canonicalize_value(&parsed);
        assert_eq!(c1, c2);
    }

    #[test]
    fn without_key_removes_only_named_key() {
        let v = json!({"sig": {"x": 1}, "recipientAid": "Dabc", "ct": "YWJj"});
        let stripped = without_key(&v, "sig");
        assert_eq!(
            canonicalize_value(&stripped),
            r#"{"ct":"YWJj","recipientAid":"Dabc"}"#
        );
    }

    proptest::proptest! {
        #[test]
        fn canonicalize_is_idempotent_on_canonical_form(n in 0i64..1_000_000, s in "[a-zA-Z0-9]{0,16}") {
            let v = json!({"n": n, "s": s, "nested": {"inner": [n, n]}});
            let c1 = canonicalize_value(&v);
            let parsed: Value = serde_json::from_str(&c1).unwrap();
            let c2 = canonicalize_value(&parsed);
            proptest::prop_assert_eq!(c1, c2);
        }
    }
}
