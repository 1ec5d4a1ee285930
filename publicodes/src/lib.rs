//! # Publicodes Engine
//!
//! **Public-interest computations, written as rules**
//!
//! Publicodes is a declarative language for computations such as taxes,
//! social contributions or carbon footprints. A model is a set of named
//! rules; each rule has a formula or a mechanism, and may ask a question to
//! the user.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use publicodes::{Engine, PublicodesResult, SituationOptions};
//! use serde_json::json;
//!
//! fn main() -> PublicodesResult<()> {
//!     let mut engine = Engine::new(json!({
//!         "prix": {"avec": {"carottes": "2 €/kg", "champignons": "5 €/kg"}},
//!         "dépenses": "prix . carottes * 1.5 kg",
//!         "salaire": {"question": "Quel est votre salaire ?", "unité": "€/mois"},
//!     }))?;
//!
//!     let result = engine.evaluate("dépenses")?;
//!     println!("{}", result.node_value); // 3
//!
//!     engine.set_situation([("salaire", "2000 €/mois")], SituationOptions::default())?;
//!     let yearly = engine.evaluate("salaire * 12 mois")?;
//!     println!("{:?}", yearly.unit);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Rules
//! Rules are named with dotted paths (`prix . carottes`). A reference is
//! resolved from the namespace of the rule it appears in, walking up to the
//! root.
//!
//! ### Values
//! An evaluation is a number (with a unit), a text, a boolean, a date, *not
//! applicable*, or *missing*. A missing value lists the inputs that should be
//! answered to compute it.
//!
//! ### Situation
//! The answers given to questions. Changing the situation invalidates cached
//! values; the compiled model is never touched.
//!
//! ### Folding
//! [`Engine::fold`] precomputes everything that does not depend on the
//! situation and returns a smaller equivalent model.

pub mod analysis;
pub mod ast;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod folding;
pub mod parser;
pub mod resolver;
pub mod resource_limits;
pub mod response;
pub mod semantic;
pub mod serializers;
pub mod situation;

pub use analysis::ReferenceMaps;
pub use ast::Span;
pub use engine::{Engine, EngineOptions, EvaluationOptions, SituationOptions};
pub use error::PublicodesError;
pub use evaluator::units::{are_convertible, convert_unit, infer_unit};
pub use folding::{FoldedRules, FoldingOptions};
pub use parser::{format_unit, parse_formula, parse_rules, parse_unit};
pub use resource_limits::ResourceLimits;
pub use response::EvaluatedNode;
pub use semantic::*;
pub use serializers::{rule_to_raw, rules_to_raw};
pub use situation::SituationValue;

/// Result type for Publicodes operations
pub type PublicodesResult<T> = Result<T, PublicodesError>;

#[cfg(test)]
mod tests;
