//! # forja_policy
//!
//! Static-quality analysis for generated code.
//!
//! This crate provides:
//! - **Findings**: The severity- and type-tagged issue record shared by the
//!   local analyzer and the cloud quality service
//! - **Local analyzer**: A lexical rule set per language (credentials,
//!   dynamic code, empty handlers, loose equality, long lines, ...)
//! - **Acceptance rule**: `BLOCKER = 0`, `CRITICAL <= 2`, `BUG = 0`, unless the
//!   service returned an explicit quality-gate verdict
//! - **Report**: The textual report persisted by the quality gate
//!
//! ## Example
//!
//! ```rust,ignore
//! use forja_core::Language;
//! use forja_policy::{AcceptanceRule, LocalAnalyzer};
//!
//! let analyzer = LocalAnalyzer::new()?;
//! let report = analyzer.analyze(&code, Language::Python, Some("sumar.py"));
//! let gate = AcceptanceRule::default().evaluate(&report);
//!
//! if !gate.passed {
//!     println!("{}", forja_policy::format_report(&report, &gate));
//! }
//! ```

pub mod analyzer;
pub mod error;
pub mod findings;
pub mod gate;
pub mod report;
pub mod rules;

pub use analyzer::LocalAnalyzer;
pub use error::{PolicyError, PolicyResult};
pub use findings::{AnalysisSource, Finding, FindingsReport, IssueType, QualityGateStatus, Severity, Summary};
pub use gate::{AcceptanceRule, DecidedBy, GateDetail, GateResult};
pub use report::{format_report, issue_bullets};
pub use rules::{Rule, RuleSet};
