pub mod ingest;
pub mod process;
pub mod rules;

pub use process::{
    process, FieldValue, NormalizedRecord, RawRow, ValidationError, ValidationErrorKind,
};
pub use rules::{FieldRule, RuleKind, RuleSet};
