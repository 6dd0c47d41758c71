//! Casing-tolerant JSON field access.
//!
//! The projector writes camelCase, but legacy rows written by earlier
//! serialisers carry PascalCase names for the same logical fields. Readers
//! accept both for one migration window; writers standardise on camelCase.

use serde_json::Value;

/// Looks up `name` on `value`, falling back to its PascalCase variant.
#[must_use]
pub fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let obj = value.as_object()?;
    if let Some(v) = obj.get(name) {
        return Some(v);
    }
    obj.get(&pascal(name))
}

/// Casing-tolerant string field lookup.
#[must_use]
pub fn field_str<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    field(value, name).and_then(Value::as_str)
}

/// Casing-tolerant integer field lookup.
#[must_use]
pub fn field_i64(value: &Value, name: &str) -> Option<i64> {
    field(value, name).and_then(Value::as_i64)
}

/// Casing-tolerant unsigned integer field lookup.
#[must_use]
pub fn field_u64(value: &Value, name: &str) -> Option<u64> {
    field(value, name).and_then(Value::as_u64)
}

/// Casing-tolerant float field lookup.
#[must_use]
pub fn field_f64(value: &Value, name: &str) -> Option<f64> {
    field(value, name).and_then(Value::as_f64)
}

/// Upper-cases the first character: `scoreHome` → `ScoreHome`.
fn pascal(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_wins_when_present() {
        let v = json!({ "watts": 300, "Watts": 999 });
        assert_eq!(field_i64(&v, "watts"), Some(300));
    }

    #[test]
    fn falls_back_to_pascal_case() {
        let v = json!({ "HeartRate": 141 });
        assert_eq!(field_i64(&v, "heartRate"), Some(141));
    }

    #[test]
    fn missing_field_is_none() {
        let v = json!({ "cadence": 92 });
        assert_eq!(field_f64(&v, "watts"), None);
    }

    #[test]
    fn non_object_is_none() {
        assert_eq!(field(&json!(42), "watts"), None);
    }
}
