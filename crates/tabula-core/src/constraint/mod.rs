//! Value constraints.
//!
//! Coercion of raw input to declared types, the per-property validation
//! pipeline, compiled validators and unique-group checks.

mod coerce;
mod unique;
mod validator;

pub use coerce::{coerce, coerce_for, from_json, prepare_value, to_json, trim, Mismatch};
pub use unique::UniqueChecker;
pub use validator::{CompiledValidator, CustomCheck, Validator};
