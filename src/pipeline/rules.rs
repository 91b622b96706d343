use crate::config::RuleConfig;
use crate::error::{DataForgeError, Result};
use chrono::format::{Item, StrftimeItems};

/// Date format applied when a date rule does not configure one.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// The kind-specific check a rule applies to its column.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Value must look like a conventional `local@domain` address.
    Email,
    /// Value must parse exactly against the strftime-style format.
    Date { format: String },
    /// Value must parse as a finite decimal number.
    Amount,
}

impl RuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Email => "email",
            RuleKind::Date { .. } => "date",
            RuleKind::Amount => "amount",
        }
    }
}

/// A compiled validation/transformation rule bound to one column.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub column: String,
    pub kind: RuleKind,
}

/// The ordered, immutable rule set shared by every row of an ingestion run.
///
/// Compilation is the single place configuration problems surface: an
/// unrecognized rule kind or a malformed date format aborts startup before
/// any row is processed.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<FieldRule>,
}

impl RuleSet {
    pub fn compile(configs: &[RuleConfig]) -> Result<Self> {
        let mut rules = Vec::with_capacity(configs.len());

        for config in configs {
            let kind = match config.kind.as_str() {
                "email" => RuleKind::Email,
                "date" => {
                    let format = config
                        .format
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
                    if !date_format_is_valid(&format) {
                        return Err(DataForgeError::Config(format!(
                            "Malformed date format '{}' in rule for column '{}'",
                            format, config.column
                        )));
                    }
                    RuleKind::Date { format }
                }
                "amount" => RuleKind::Amount,
                other => {
                    return Err(DataForgeError::Config(format!(
                        "Unknown rule kind '{}' in rule for column '{}'",
                        other, config.column
                    )));
                }
            };

            rules.push(FieldRule {
                column: config.column.clone(),
                kind,
            });
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A format string is malformed when chrono cannot tokenize it.
fn date_format_is_valid(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| item == Item::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(column: &str, kind: &str, format: Option<&str>) -> RuleConfig {
        RuleConfig {
            column: column.to_string(),
            kind: kind.to_string(),
            format: format.map(|f| f.to_string()),
        }
    }

    #[test]
    fn test_compile_known_kinds() {
        let configs = vec![
            rule("email", "email", None),
            rule("date", "date", Some("%d/%m/%Y")),
            rule("amount", "amount", None),
        ];

        let rules = RuleSet::compile(&configs).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules()[0].kind, RuleKind::Email);
        assert_eq!(
            rules.rules()[1].kind,
            RuleKind::Date {
                format: "%d/%m/%Y".to_string()
            }
        );
    }

    #[test]
    fn test_date_rule_defaults_format() {
        let rules = RuleSet::compile(&[rule("date", "date", None)]).unwrap();
        assert_eq!(
            rules.rules()[0].kind,
            RuleKind::Date {
                format: DEFAULT_DATE_FORMAT.to_string()
            }
        );
    }

    #[test]
    fn test_unknown_kind_fails_naming_the_rule() {
        let err = RuleSet::compile(&[rule("zip", "zipcode", None)]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("zipcode"));
        assert!(message.contains("zip"));
    }

    #[test]
    fn test_malformed_date_format_fails() {
        let err = RuleSet::compile(&[rule("date", "date", Some("%Y-%m-%Q"))]).unwrap_err();
        assert!(err.to_string().contains("date"));
    }
}
