use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types that can be requested as schema-constrained structured output.
///
/// Implemented for every `JsonSchema + DeserializeOwned` type. The generated
/// schema is normalized to the strict dialect both OpenAI's `json_schema`
/// response format and Anthropic's forced tool input accept:
/// 1. `additionalProperties: false` on every object
/// 2. every property listed in `required`, nullable ones included
/// 3. no `$ref` indirection
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        close_objects(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                let required: Option<Vec<Value>> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(keys) = required {
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }
            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = value.get("definitions").cloned();
    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|path| path.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(def) = target {
                *value = def;
                inline_refs_with(value, definitions);
                return;
            }

            // schemars wraps documented refs as `allOf: [{"$ref": ...}]`
            let single_all_of = match map.get("allOf") {
                Some(Value::Array(all_of)) if all_of.len() == 1 => all_of.first().cloned(),
                _ => None,
            };
            if let Some(inner) = single_all_of {
                *value = inner;
                inline_refs_with(value, definitions);
                return;
            }

            for (_, v) in map.iter_mut() {
                inline_refs_with(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Verdict {
        id: String,
        score: i64,
        explanation: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Batch {
        /// Per-review verdicts
        reviews: Vec<Verdict>,
        patterns: Vec<String>,
    }

    #[test]
    fn closes_every_object() {
        let schema = Batch::strict_schema();
        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.contains("\"additionalProperties\":false"));
    }

    #[test]
    fn optional_fields_are_still_required() {
        let schema = Verdict::strict_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert!(required.contains(&"id"));
        assert!(required.contains(&"score"));
        assert!(required.contains(&"explanation"));
    }

    #[test]
    fn nested_definitions_are_inlined() {
        let schema = Batch::strict_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));

        let items = &schema["properties"]["reviews"]["items"];
        assert!(items.get("$ref").is_none());
        assert_eq!(items["type"], Value::String("object".to_string()));
        assert_eq!(items["additionalProperties"], Value::Bool(false));
    }
}
