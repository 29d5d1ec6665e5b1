//! Deterministic gateways for mock mode and tests.
//!
//! [`MockLlm`] answers with canned responses chosen by a keyword in the first
//! line of the role prompt. [`ScriptedLlm`] lets a test queue answers per role,
//! records every call, and falls back to the canned answers.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::gateway::{LlmGateway, LlmRequest};
use crate::prompts::Role;

/// Canned-response gateway used when `LLM_MOCK_MODE` is on.
#[derive(Debug, Default, Clone)]
pub struct MockLlm;

impl MockLlm {
    pub fn new() -> Self {
        Self
    }

    /// Pick the canned answer for a role prompt and context.
    pub fn canned(role_prompt: &str, context: &str) -> String {
        let head = role_prompt
            .trim_start()
            .lines()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let typescript = context.to_lowercase().contains("typescript");

        if head.contains("desarrollador") {
            developer_code(typescript)
        } else if head.contains("requirements manager") || head.contains("product owner") {
            requirements_json(typescript)
        } else if head.contains("testing") {
            unit_tests(typescript, &module_name(context))
        } else if head.contains("revisor") {
            REVIEW_APPROVED.to_string()
        } else if head.contains("analista de calidad") {
            QUALITY_INSTRUCTIONS.to_string()
        } else if head.contains("release note") {
            RELEASE_NOTE.to_string()
        } else if head.contains("stakeholder") {
            "VALIDACIÓN FINAL: VALIDADO".to_string()
        } else {
            "Respuesta simulada por defecto (LLM_MOCK_MODE activo).".to_string()
        }
    }
}

#[async_trait]
impl LlmGateway for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn call(&self, request: &LlmRequest) -> LlmResult<String> {
        debug!("Mock LLM call for {}", request.role);
        Ok(Self::canned(&request.role_prompt, &request.context))
    }
}

/// A call observed by [`ScriptedLlm`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: Role,
    pub role_prompt: String,
    pub context: String,
    pub json_mode: bool,
}

enum Scripted {
    Text(String),
    Fatal(String),
}

/// Gateway with per-role queued answers.
#[derive(Default)]
pub struct ScriptedLlm {
    queues: Mutex<HashMap<Role, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next call with `role`.
    pub fn push(&self, role: Role, response: impl Into<String>) -> &Self {
        self.queues
            .lock()
            .entry(role)
            .or_default()
            .push_back(Scripted::Text(response.into()));
        self
    }

    /// Queue a fatal error for the next call with `role`.
    pub fn push_fatal(&self, role: Role, message: impl Into<String>) -> &Self {
        self.queues
            .lock()
            .entry(role)
            .or_default()
            .push_back(Scripted::Fatal(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, role: Role) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.role == role)
            .cloned()
            .collect()
    }

    pub fn call_count(&self, role: Role) -> usize {
        self.calls.lock().iter().filter(|c| c.role == role).count()
    }

    /// Answers still queued for `role`.
    pub fn pending(&self, role: Role) -> usize {
        self.queues.lock().get(&role).map_or(0, |q| q.len())
    }
}

#[async_trait]
impl LlmGateway for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, request: &LlmRequest) -> LlmResult<String> {
        self.calls.lock().push(RecordedCall {
            role: request.role,
            role_prompt: request.role_prompt.clone(),
            context: request.context.clone(),
            json_mode: request.schema.is_some(),
        });

        let next = self
            .queues
            .lock()
            .get_mut(&request.role)
            .and_then(|q| q.pop_front());

        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Fatal(message)) => Err(LlmError::ModelNotFound(message)),
            None => Ok(MockLlm::canned(&request.role_prompt, &request.context)),
        }
    }
}

/// Module name of the code file named in a test-generation context.
fn module_name(context: &str) -> String {
    let found = Regex::new(r"(?m)^Archivo de código: (\S+?)(?:\.ts|\.py)?\s*$")
        .ok()
        .and_then(|re| re.captures(context))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    found.unwrap_or_else(|| "sumar".to_string())
}

fn requirements_json(typescript: bool) -> String {
    let language = if typescript { "TypeScript 5.x" } else { "Python 3.12" };
    format!(
        r#"{{
  "objetivo_funcional": "Implementar una función sumar que devuelva la suma de dos números",
  "lenguaje_version": "{}",
  "nombre_funcion": "sumar",
  "entradas_esperadas": "Dos números a y b",
  "salidas_esperadas": "Un número con la suma de a y b",
  "casos_de_prueba": [
    {{"input": [2, 3], "expected": 5}},
    {{"input": [-2, -3], "expected": -5}},
    {{"input": [0.1, 0.2], "expected": 0.3}}
  ],
  "version": "1.0",
  "estado": "Propuesto",
  "fuente": "prompt_inicial",
  "fecha_creacion": "2025-01-01"
}}"#,
        language
    )
}

fn developer_code(typescript: bool) -> String {
    if typescript {
        TS_CODE.to_string()
    } else {
        PY_CODE.to_string()
    }
}

fn unit_tests(typescript: bool, module: &str) -> String {
    let template = if typescript { TS_TESTS } else { PY_TESTS };
    template.replace("{module}", module)
}

const TS_CODE: &str = r#"```typescript
export function sumar(a: number, b: number): number {
    if (typeof a !== 'number' || typeof b !== 'number') {
        throw new Error('Ambos argumentos deben ser números');
    }
    return Math.round((a + b) * 1e10) / 1e10;
}
```"#;

const PY_CODE: &str = r#"```python
def sumar(a: float, b: float) -> float:
    """Suma dos números."""
    if not isinstance(a, (int, float)) or not isinstance(b, (int, float)):
        raise TypeError('Ambos argumentos deben ser números')
    return round(a + b, 10)
```"#;

const TS_TESTS: &str = r#"```typescript
import { describe, it, expect } from 'vitest';
import { sumar } from './{module}';

describe('sumar', () => {
    it('suma dos positivos', () => {
        expect(sumar(2, 3)).toBe(5);
    });

    it('suma negativos', () => {
        expect(sumar(-2, -3)).toBe(-5);
    });

    it('suma decimales', () => {
        expect(sumar(0.1, 0.2)).toBeCloseTo(0.3);
    });

    it('rechaza entradas no numéricas', () => {
        expect(() => sumar('a' as unknown as number, 5)).toThrow();
    });
});
```"#;

const PY_TESTS: &str = r#"```python
import pytest
from {module} import sumar


def test_sumar_positivos():
    assert sumar(2, 3) == 5


def test_sumar_negativos():
    assert sumar(-2, -3) == -5


def test_sumar_decimales():
    assert sumar(0.1, 0.2) == pytest.approx(0.3)


def test_tipo_invalido():
    with pytest.raises(TypeError):
        sumar('a', 5)
```"#;

const REVIEW_APPROVED: &str = r#"{
  "aprobado": true,
  "puntuacion": 9,
  "aspectos_positivos": ["Código claro y tipado", "Validación de entradas"],
  "aspectos_mejorar": [],
  "comentario_revision": "El código cumple los requisitos y los tests cubren los casos principales."
}"#;

const QUALITY_INSTRUCTIONS: &str = r#"Resumen: issues pendientes detectados por el análisis estático.
1. [CRITICAL] Corrige cada issue BLOCKER o CRITICAL listado en el informe.
   Solución: elimina credenciales, bloques vacíos y ejecución dinámica de código."#;

const RELEASE_NOTE: &str = r#"## Nueva función: sumar

Se añade una función que devuelve la suma de dos números.

- Validación de tipos de entrada
- Tests unitarios superados y revisión aprobada"#;
