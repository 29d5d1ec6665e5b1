//! JSON schema of the formal-requirements record.
//!
//! The same schema constrains the provider in JSON mode and re-validates the
//! response on ingestion.

use jsonschema::JSONSchema;
use serde_json::{json, Value};

/// JSON schema for the formal-requirements record.
pub fn formal_requirements_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "FormalRequirements",
        "type": "object",
        "required": [
            "objetivo_funcional",
            "lenguaje_version",
            "nombre_funcion",
            "entradas_esperadas",
            "salidas_esperadas"
        ],
        "properties": {
            "objetivo_funcional": { "type": "string", "minLength": 1 },
            "lenguaje_version": {
                "type": "string",
                "pattern": "(?i)(python|typescript|\\bts\\b)"
            },
            "nombre_funcion": { "type": "string", "minLength": 1 },
            "entradas_esperadas": { "type": "string" },
            "salidas_esperadas": { "type": "string" },
            "casos_de_prueba": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["input", "expected"],
                    "properties": {
                        "input": {},
                        "expected": {}
                    }
                }
            },
            "version": { "type": "string" },
            "estado": { "type": "string" },
            "fuente": { "type": "string" },
            "fecha_creacion": { "type": "string" }
        }
    })
}

/// Validate `instance` against `schema`, collecting every violation.
pub fn validate(schema: &Value, instance: &Value) -> Result<(), Vec<String>> {
    let compiled = JSONSchema::compile(schema).map_err(|e| vec![format!("invalid schema: {}", e)])?;
    let result = compiled.validate(instance);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|e| format!("{} at '{}'", e, e.instance_path))
            .collect()),
    }
}

/// Rewrite a JSON schema into the subset the provider accepts for `responseSchema`.
///
/// Drops annotation keys and keywords the provider rejects, and upper-cases
/// `type` values. Untyped schemas (`{}`) become strings.
pub fn to_provider_schema(schema: &Value) -> Value {
    const DROPPED: [&str; 5] = ["$schema", "title", "pattern", "minLength", "additionalProperties"];

    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                if DROPPED.contains(&key.as_str()) {
                    continue;
                }
                let converted = match (key.as_str(), value) {
                    ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                    ("properties", Value::Object(props)) => Value::Object(
                        props
                            .iter()
                            .map(|(k, v)| (k.clone(), to_provider_schema(v)))
                            .collect(),
                    ),
                    ("items", v) => to_provider_schema(v),
                    (_, v) => v.clone(),
                };
                out.insert(key.clone(), converted);
            }
            if !out.contains_key("type") {
                out.insert("type".to_string(), Value::String("STRING".to_string()));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
