//! Role prompts.
//!
//! Prompts are opaque constants keyed by [`Role`]. The mock gateway dispatches
//! on a keyword from the first line of each prompt, so every prompt names its
//! role up front and avoids the other roles' keywords.

use serde::{Deserialize, Serialize};

/// The fixed roles an LLM call can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    RequirementsManager,
    Developer,
    QualityAnalyst,
    TestEngineer,
    Reviewer,
    Stakeholder,
    ReleaseNote,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::RequirementsManager,
        Role::Developer,
        Role::QualityAnalyst,
        Role::TestEngineer,
        Role::Reviewer,
        Role::Stakeholder,
        Role::ReleaseNote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::RequirementsManager => "requirements_manager",
            Role::Developer => "developer",
            Role::QualityAnalyst => "quality_analyst",
            Role::TestEngineer => "test_engineer",
            Role::Reviewer => "reviewer",
            Role::Stakeholder => "stakeholder",
            Role::ReleaseNote => "release_note",
        }
    }

    /// The role-defining prompt.
    pub fn prompt(&self) -> &'static str {
        match self {
            Role::RequirementsManager => REQUIREMENTS_MANAGER,
            Role::Developer => DEVELOPER,
            Role::QualityAnalyst => QUALITY_ANALYST,
            Role::TestEngineer => TEST_ENGINEER,
            Role::Reviewer => REVIEWER,
            Role::Stakeholder => STAKEHOLDER,
            Role::ReleaseNote => RELEASE_NOTE,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const REQUIREMENTS_MANAGER: &str = r#"Rol: Product Owner y Requirements Manager estricto.

Objetivo:
Convertir la petición inicial (y, si existe, el feedback de rechazo del stakeholder) en una
especificación formal, ejecutable y trazable.

Instrucciones:
- Elimina ambigüedades. Si hay feedback de rechazo, incorpora sus fundamentos.
- Indica el lenguaje de destino en "lenguaje_version": "Python 3.12" o "TypeScript 5.x".
- "nombre_funcion" es solo el identificador de la función principal, sin firma.
- Incluye entre 3 y 6 "casos_de_prueba" con la forma {"input": ..., "expected": ...}.
- Completa los campos de trazabilidad: version, estado (Propuesto, Aprobado, Rechazado),
  fuente y fecha_creacion.

Output Esperado:
Un único objeto JSON conforme al esquema FormalRequirements."#;

pub const DEVELOPER: &str = r#"Rol: Desarrollador de software sénior en Python y TypeScript.

Objetivo:
Implementar una única función autocontenida que satisfaga los requisitos formales.

Instrucciones:
- Si se incluye un traceback, corrige el código anterior para que las pruebas pasen.
- Si se incluyen instrucciones de calidad, aplícalas todas sin romper la funcionalidad.
- Si se incluye un comentario de revisión, resuelve cada punto bloqueante.
- Sin dependencias externas. Tipos explícitos en entradas y salidas.
- Errores de entrada con excepciones descriptivas.
- No uses print ni console.log, eval, exec, var, any ni comparaciones laxas (==).

CRÍTICO para TypeScript:
Toda función pública DEBE exportarse con 'export' para que los tests puedan importarla.
Si operas con decimales, redondea con Math.round(valor * 1e10) / 1e10 antes de devolver.

Output Esperado:
El código completo en un único bloque markdown etiquetado python o typescript."#;

pub const QUALITY_ANALYST: &str = r#"Rol: Analista de calidad de código experto en SonarQube.

Objetivo:
Transformar el informe de análisis estático en instrucciones de corrección concretas.

Instrucciones:
1. Resume el número de issues por severidad.
2. Prioriza BLOCKER y CRITICAL; su corrección es obligatoria.
3. Para cada issue prioritario indica: [SEVERIDAD] Línea X, el problema, la solución y un
   fragmento de código corregido.
4. Menciona MAJOR, MINOR e INFO solo si la corrección es trivial.

Output Esperado:
Texto estructurado que el desarrollador pueda aplicar directamente."#;

pub const TEST_ENGINEER: &str = r#"Rol: Ingeniero de testing experto en pruebas unitarias.

Objetivo:
Generar los tests unitarios del código proporcionado a partir de los requisitos formales.

Límites obligatorios:
- Como máximo un bloque describe de nivel superior y sin describe anidados.
- Como máximo seis casos de prueba.
- Importa la función desde el archivo de código indicado en el contexto.

TypeScript (vitest):
- import { describe, it, expect } from 'vitest';
- Para números con decimales usa toBeCloseTo(valor) con UN solo argumento.
- Nunca uses toBe con literales decimales ni literales de más de cinco decimales.
- Usa toBe(0) y toBe(-0), nunca toBe(0.0) ni toBe(-0.0).

Python (pytest):
- Funciones con prefijo test_ y pytest.raises para excepciones.
- Para decimales usa pytest.approx.

Output Esperado:
Solo el código de tests en un único bloque markdown etiquetado typescript o python."#;

/// Appended to the test-engineer prompt when the previous output was truncated.
pub const TEST_ENGINEER_STRICT: &str = r#"

ATENCIÓN: la respuesta anterior estaba incompleta o truncada.
Genera un archivo más corto (máximo cuatro casos) y asegúrate de cerrar todos los bloques."#;

/// Appended to the test-engineer prompt when only the tests must be fixed.
pub const TEST_ENGINEER_FIX_ONLY: &str = r#"

ATENCIÓN: los tests anteriores fallaron por un error en el propio archivo de tests.
El código de producción es correcto y NO debe cambiarse. Corrige solo los tests usando la salida
del fallo incluida en el contexto."#;

pub const REVIEWER: &str = r#"Rol: Revisor de código sénior.

Objetivo:
Revisar el código y sus tests frente a los requisitos formales antes de integrarlos.

Criterios:
- Corrección funcional frente a los requisitos.
- Legibilidad, manejo de errores y tipado.
- Cobertura razonable de los tests.

Output Esperado:
Un único objeto JSON:
{"aprobado": true|false, "puntuacion": 0-10, "aspectos_positivos": ["..."],
 "aspectos_mejorar": ["..."], "comentario_revision": "..."}
Aprueba solo si la puntuación es 7 o superior y no hay problemas bloqueantes."#;

pub const STAKEHOLDER: &str = r#"Rol: Stakeholder de negocio crítico con la entrega final.

Contexto:
El código ya pasó las pruebas técnicas. Tú verificas la intención de negocio usando como única
fuente de verdad los requisitos formales y el código generado.

Instrucciones:
- Compara el formato de salida y la funcionalidad clave con cada punto de los requisitos.
- VALIDADO solo si se cumple el 100% de los requisitos.
- RECHAZADO ante cualquier desviación.

Output Esperado (obligatorio):
La respuesta DEBE comenzar con "VALIDACIÓN FINAL:".
Si se valida: "VALIDACIÓN FINAL: VALIDADO".
Si se rechaza: "VALIDACIÓN FINAL: RECHAZADO" y una línea que empiece por "Motivo:" describiendo
la desviación."#;

pub const RELEASE_NOTE: &str = r#"Rol: Redactor de release notes técnicas.

Objetivo:
Redactar una release note breve para la funcionalidad entregada.

Formato:
- Título con el nombre de la funcionalidad.
- Resumen en una o dos frases orientado a negocio.
- Lista de cambios principales.
- Calidad: resultado de tests y revisión.

Output Esperado:
Markdown de como máximo 15 líneas."#;
