//! The formal-requirements record.
//!
//! The record is the single source of truth for the target language and the
//! base name of every generated file. Unknown keys are kept so that a record
//! survives a read/write cycle with the same field set.

use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};

use crate::artifacts::snake_case;
use crate::error::{CoreError, CoreResult};
use crate::language::Language;

/// Prefix written into `requisitos_formales` when the model output could not be parsed.
pub const PARSE_ERROR_MARKER: &str = "ERROR_PARSING:";

/// One example case: an input and the expected output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: serde_json::Value,
    pub expected: serde_json::Value,
}

/// Tracker metadata attached once a PBI exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerRef {
    pub id: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub story_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalRequirements {
    #[serde(deserialize_with = "lenient_text")]
    pub objetivo_funcional: String,
    #[serde(deserialize_with = "lenient_text")]
    pub lenguaje_version: String,
    #[serde(deserialize_with = "lenient_text")]
    pub nombre_funcion: String,
    #[serde(deserialize_with = "lenient_text")]
    pub entradas_esperadas: String,
    #[serde(deserialize_with = "lenient_text")]
    pub salidas_esperadas: String,
    #[serde(default)]
    pub casos_de_prueba: Vec<TestCase>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub fuente: Option<String>,
    #[serde(default)]
    pub fecha_creacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_devops: Option<TrackerRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FormalRequirements {
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let record: Self = serde_json::from_str(text)?;
        record.check_required()?;
        Ok(record)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn check_required(&self) -> CoreResult<()> {
        let required = [
            ("objetivo_funcional", &self.objetivo_funcional),
            ("lenguaje_version", &self.lenguaje_version),
            ("nombre_funcion", &self.nombre_funcion),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidState(format!(
                    "Formal requirements field '{}' is empty",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Fill the traceability fields the model left out.
    pub fn with_traceability_defaults(mut self) -> Self {
        fn fill(slot: &mut Option<String>, value: String) {
            if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
                *slot = Some(value);
            }
        }
        fill(&mut self.version, "1.0".to_string());
        fill(&mut self.estado, "Propuesto".to_string());
        fill(&mut self.fuente, "prompt_inicial".to_string());
        fill(
            &mut self.fecha_creacion,
            Local::now().format("%Y-%m-%d").to_string(),
        );
        self
    }

    pub fn language(&self) -> Language {
        Language::from_label(&self.lenguaje_version)
    }

    /// Snake-case base name used for every generated file.
    pub fn base_name(&self) -> String {
        snake_case(&self.nombre_funcion)
    }
}

/// Whether a `requisitos_formales` value is the parse-failure marker.
pub fn is_parse_error(text: &str) -> bool {
    text.trim_start().starts_with(PARSE_ERROR_MARKER)
}

/// Base name for a state's requirements text, with a fallback when it does not parse.
pub fn base_name_or_default(requirements_json: &str) -> String {
    FormalRequirements::from_json(requirements_json)
        .map(|r| r.base_name())
        .unwrap_or_else(|_| snake_case(""))
}

/// Accept strings as-is and render any other JSON value as compact text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const SAMPLE: &str = r#"{
        "objetivo_funcional": "Sumar dos numeros",
        "lenguaje_version": "Python 3.12",
        "nombre_funcion": "sumar",
        "entradas_esperadas": "a: float, b: float",
        "salidas_esperadas": "float",
        "casos_de_prueba": [{"input": [1, 2], "expected": 3}],
        "prioridad": "alta"
    }"#;

    #[test]
    fn test_parse_and_defaults() {
        let record = FormalRequirements::from_json(SAMPLE)
            .unwrap()
            .with_traceability_defaults();
        assert_eq!(record.language(), Language::Python);
        assert_eq!(record.base_name(), "sumar");
        assert_eq!(record.version.as_deref(), Some("1.0"));
        assert_eq!(record.estado.as_deref(), Some("Propuesto"));
        assert_eq!(record.casos_de_prueba.len(), 1);
        assert_eq!(record.extra["prioridad"], "alta");
    }

    #[test]
    fn test_field_set_survives_round_trip() {
        let original: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        let record = FormalRequirements::from_json(SAMPLE).unwrap();
        let again: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        let keys = |v: &serde_json::Value| -> BTreeSet<String> {
            v.as_object()
                .unwrap()
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k.clone())
                .collect()
        };
        assert_eq!(keys(&original), keys(&again));
        assert_eq!(original["casos_de_prueba"], again["casos_de_prueba"]);
    }

    #[test]
    fn test_non_string_fields_are_rendered() {
        let json = r#"{
            "objetivo_funcional": "x",
            "lenguaje_version": "TypeScript",
            "nombre_funcion": "calcularMedia",
            "entradas_esperadas": ["nums: number[]"],
            "salidas_esperadas": "number"
        }"#;
        let record = FormalRequirements::from_json(json).unwrap();
        assert_eq!(record.entradas_esperadas, r#"["nums: number[]"]"#);
        assert_eq!(record.base_name(), "calcular_media");
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"objetivo_funcional": "x", "lenguaje_version": "", "nombre_funcion": "f",
                      "entradas_esperadas": "", "salidas_esperadas": ""}"#;
        assert!(FormalRequirements::from_json(json).is_err());
        assert!(is_parse_error("ERROR_PARSING: bad json"));
        assert_eq!(base_name_or_default("ERROR_PARSING: bad json"), "codigo");
    }
}
