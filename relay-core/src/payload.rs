use serde_json::{Map, Value};

use crate::{error::MalformedResponse, model::Payload};

/// Where the two values live in a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Leading characters that precede the JSON document.
    pub preamble_len: usize,
    /// Numeric field of the first array element.
    pub value_field: String,
    /// String field of the first array element.
    pub label_field: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preamble_len: 3,
            value_field: "t".to_string(),
            label_field: "l".to_string(),
        }
    }
}

/// Strip the preamble, parse the remainder and pull both fields out of the
/// first array element. Further elements are ignored.
pub fn extract_payload(body: &str, opts: &ExtractOptions) -> Result<Payload, MalformedResponse> {
    let json = strip_preamble(body, opts.preamble_len)?;

    let parsed: Value =
        serde_json::from_str(json).map_err(|e| MalformedResponse::InvalidJson(e.to_string()))?;

    let first = parsed
        .as_array()
        .ok_or(MalformedResponse::NotAnArray)?
        .first()
        .ok_or(MalformedResponse::EmptyArray)?
        .as_object()
        .ok_or(MalformedResponse::NotAnObject)?;

    let temperature = field(first, &opts.value_field)?
        .as_f64()
        .ok_or_else(|| MalformedResponse::WrongType {
            field: opts.value_field.clone(),
            expected: "number",
        })?;

    let conditions = field(first, &opts.label_field)?
        .as_str()
        .ok_or_else(|| MalformedResponse::WrongType {
            field: opts.label_field.clone(),
            expected: "string",
        })?
        .to_string();

    Ok(Payload {
        temperature,
        conditions,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a Value, MalformedResponse> {
    obj.get(name).ok_or_else(|| MalformedResponse::MissingField(name.to_string()))
}

fn strip_preamble(body: &str, len: usize) -> Result<&str, MalformedResponse> {
    if len == 0 {
        return Ok(body);
    }
    match body.char_indices().nth(len) {
        Some((idx, _)) => Ok(&body[idx..]),
        None => {
            let actual = body.chars().count();
            if actual == len {
                // Preamble only, nothing to parse.
                Ok("")
            } else {
                Err(MalformedResponse::MissingPreamble {
                    expected: len,
                    actual,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(body: &str) -> Result<Payload, MalformedResponse> {
        extract_payload(body, &ExtractOptions::default())
    }

    #[test]
    fn extracts_first_element() {
        let payload = extract(r#"xxx[{"t":21.5,"l":"Clear"},{"t":3,"l":"Rain"}]"#).unwrap();

        assert_eq!(
            payload,
            Payload {
                temperature: 21.5,
                conditions: "Clear".into(),
            }
        );
    }

    #[test]
    fn preamble_content_is_irrelevant() {
        let payload = extract("// [{\"t\":-4,\"l\":\"Snow\"}]").unwrap();

        assert_eq!(payload.temperature, -4.0);
        assert_eq!(payload.conditions, "Snow");
    }

    #[test]
    fn extra_fields_are_ignored() {
        let payload = extract(r#"xxx[{"id":"7","t":1.25,"l":"Fog","c":"+0.1"}]"#).unwrap();

        assert_eq!(payload.temperature, 1.25);
    }

    #[test]
    fn short_body_is_missing_preamble() {
        assert_eq!(
            extract("[]").unwrap_err(),
            MalformedResponse::MissingPreamble {
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn body_without_preamble_fails_to_parse() {
        // The first three characters of the JSON get eaten.
        let err = extract(r#"[{"t":21.5,"l":"Clear"}]"#).unwrap_err();
        assert!(matches!(err, MalformedResponse::InvalidJson(_)));
    }

    #[test]
    fn preamble_only_is_invalid_json() {
        assert!(matches!(extract("xxx").unwrap_err(), MalformedResponse::InvalidJson(_)));
    }

    #[test]
    fn invalid_json_after_preamble() {
        assert!(matches!(extract("xxx[{not json").unwrap_err(), MalformedResponse::InvalidJson(_)));
    }

    #[test]
    fn empty_array_is_rejected() {
        assert_eq!(extract("xxx[]").unwrap_err(), MalformedResponse::EmptyArray);
    }

    #[test]
    fn object_root_is_rejected() {
        assert_eq!(extract(r#"xxx{"t":1,"l":"x"}"#).unwrap_err(), MalformedResponse::NotAnArray);
    }

    #[test]
    fn scalar_element_is_rejected() {
        assert_eq!(extract("xxx[42]").unwrap_err(), MalformedResponse::NotAnObject);
    }

    #[test]
    fn missing_fields_are_named() {
        assert_eq!(
            extract(r#"xxx[{"l":"Clear"}]"#).unwrap_err(),
            MalformedResponse::MissingField("t".into())
        );
        assert_eq!(
            extract(r#"xxx[{"t":2}]"#).unwrap_err(),
            MalformedResponse::MissingField("l".into())
        );
    }

    #[test]
    fn wrong_field_types_are_rejected() {
        assert_eq!(
            extract(r#"xxx[{"t":"21.5","l":"Clear"}]"#).unwrap_err(),
            MalformedResponse::WrongType {
                field: "t".into(),
                expected: "number",
            }
        );
        assert_eq!(
            extract(r#"xxx[{"t":21.5,"l":null}]"#).unwrap_err(),
            MalformedResponse::WrongType {
                field: "l".into(),
                expected: "string",
            }
        );
    }

    #[test]
    fn custom_field_names_and_preamble() {
        let opts = ExtractOptions {
            preamble_len: 0,
            value_field: "temp".into(),
            label_field: "desc".into(),
        };
        let payload = extract_payload(r#"[{"temp":9,"desc":"Windy"}]"#, &opts).unwrap();

        assert_eq!(
            payload,
            Payload {
                temperature: 9.0,
                conditions: "Windy".into(),
            }
        );
    }

    #[test]
    fn preamble_counts_characters_not_bytes() {
        let payload = extract(r#"ééé[{"t":1,"l":"ok"}]"#).unwrap();
        assert_eq!(payload.conditions, "ok");
    }

    #[test]
    fn generated_pairs_are_extracted() {
        let values = [0.0, -12.5, 1e-3, 98_765.25, -0.0, 3.0];
        let labels = ["Clear", "", "Ciel dégagé", "雷雨", "a \"quoted\" word", "🌧 rain"];

        for (i, (&t, &l)) in values.iter().zip(labels.iter()).enumerate() {
            let first = serde_json::json!({ "t": t, "l": l, "extra": i });
            let mut elements = vec![first];
            // Trailing elements never contribute.
            for n in 0..i {
                elements.push(serde_json::json!({ "t": n, "l": format!("other-{n}") }));
            }
            let body = format!("// {}", Value::Array(elements));

            let payload = extract(&body).unwrap_or_else(|e| panic!("case {i} ({body}): {e}"));
            assert_eq!(payload.temperature, t, "case {i}");
            assert_eq!(payload.conditions, l, "case {i}");
        }
    }

    #[test]
    fn integer_values_widen_to_float() {
        for t in [-40_i64, -1, 0, 7, i64::from(i32::MAX)] {
            let body = format!(r#"xxx[{{"t":{t},"l":"x"}}]"#);
            assert_eq!(extract(&body).unwrap().temperature, t as f64);
        }
    }
}
