//! Response envelope normalization
//!
//! Upstream endpoints answer with a bare array, `{"data": [...]}`,
//! `{"items": [...]}` or a domain-named wrapper. Callers pass the ordered
//! wrapper keys configured for the endpoint and always get a plain list back.

use serde_json::Value;

/// Extract the record list from a payload
///
/// - bare array: returned verbatim
/// - object: the first candidate key (in order) holding an array
/// - anything else, including an absent payload: empty
pub fn extract_records<K: AsRef<str>>(payload: Option<Value>, candidate_keys: &[K]) -> Vec<Value> {
    match payload {
        Some(Value::Array(records)) => records,
        Some(Value::Object(mut map)) => candidate_keys
            .iter()
            .find_map(|key| match map.remove(key.as_ref()) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEYS: &[&str] = &["data", "notes", "items"];

    #[test]
    fn test_bare_array_returned_verbatim() {
        let payload = json!([{"id": 1}, {"id": 2}, 3]);
        assert_eq!(
            extract_records(Some(payload.clone()), KEYS),
            payload.as_array().unwrap().clone()
        );
    }

    #[test]
    fn test_first_candidate_key_wins() {
        let payload = json!({"items": [{"id": 3}], "data": [{"id": 1}]});
        assert_eq!(extract_records(Some(payload), KEYS), vec![json!({"id": 1})]);
    }

    #[test]
    fn test_non_array_candidates_skipped() {
        let payload = json!({"data": {"page": 1}, "notes": [{"id": 9}]});
        assert_eq!(extract_records(Some(payload), KEYS), vec![json!({"id": 9})]);
    }

    #[test]
    fn test_empty_candidate_array_is_still_a_match() {
        let payload = json!({"data": [], "items": [{"id": 1}]});
        assert!(extract_records(Some(payload), KEYS).is_empty());
    }

    #[test]
    fn test_unknown_shapes_are_empty() {
        assert!(extract_records(None, KEYS).is_empty());
        assert!(extract_records(Some(json!("ok")), KEYS).is_empty());
        assert!(extract_records(Some(json!(42)), KEYS).is_empty());
        assert!(extract_records(Some(json!({"students": [1]})), KEYS).is_empty());
        assert!(extract_records(Some(json!({"data": [1]})), &[] as &[&str]).is_empty());
    }
}
