//! Field-name translation between caller payloads (`copySource`) and the
//! remote API's convention (`CopySource`).
//!
//! Only top-level keys are rewritten; values, including nested objects, are
//! moved across untouched. Anything that is not a JSON object passes through.

use serde_json::{Map, Value};

/// `{"key": ..}` -> `{"Key": ..}`, for requests going out.
pub fn capitalize_keys(value: Value) -> Value {
    map_keys(value, capitalize)
}

/// `{"IsTruncated": ..}` -> `{"isTruncated": ..}`, for responses coming back.
pub fn decapitalize_keys(value: Value) -> Value {
    map_keys(value, decapitalize)
}

fn map_keys(value: Value, rename: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (rename(&key), value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn decapitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_capitalize_keys() {
        let cases = vec![
            (json!({ "key": "a" }), json!({ "Key": "a" })),
            (
                json!({ "copySource": "b/k", "metadataDirective": "COPY" }),
                json!({ "CopySource": "b/k", "MetadataDirective": "COPY" }),
            ),
            (json!({ "Key": "already" }), json!({ "Key": "already" })),
            (json!({ "": 1 }), json!({ "": 1 })),
            (json!({ "étag": 1 }), json!({ "Étag": 1 })),
            (json!({}), json!({})),
        ];

        for (input, expected) in cases {
            let label = input.to_string();
            assert_eq!(capitalize_keys(input), expected, "failed for case: {}", label);
        }
    }

    #[test]
    fn test_nested_values_untouched() {
        let input = json!({
            "delete": { "objects": [{ "key": "a" }], "quiet": true },
            "metadata": { "owner": "me" }
        });

        let result = capitalize_keys(input);

        assert_eq!(
            result,
            json!({
                "Delete": { "objects": [{ "key": "a" }], "quiet": true },
                "Metadata": { "owner": "me" }
            })
        );
    }

    #[test]
    fn test_non_objects_pass_through() {
        let cases = vec![
            Value::Null,
            json!("prefix"),
            json!(42),
            json!(["key", "value"]),
            json!(true),
        ];

        for input in cases {
            let label = input.to_string();
            assert_eq!(capitalize_keys(input.clone()), input, "failed for case: {}", label);
            assert_eq!(decapitalize_keys(input.clone()), input, "failed for case: {}", label);
        }
    }

    #[test]
    fn test_round_trip() {
        let input = json!({
            "bucket": "my-bucket",
            "prefix": "photos/",
            "continuationToken": "abc",
            "maxKeys": 10
        });

        let wire = capitalize_keys(input.clone());
        assert!(wire.as_object().unwrap().keys().all(|key| key.starts_with(char::is_uppercase)));
        assert_eq!(decapitalize_keys(wire), input);
    }

    #[test]
    fn test_decapitalize_response() {
        let response = json!({
            "IsTruncated": false,
            "ETag": "\"abc\"",
            "Contents": [{ "Key": "a", "Size": 1 }]
        });

        assert_eq!(
            decapitalize_keys(response),
            json!({
                "isTruncated": false,
                "eTag": "\"abc\"",
                "contents": [{ "Key": "a", "Size": 1 }]
            })
        );
    }
}
