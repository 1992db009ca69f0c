//! Rule Definition Format
//!
//! The declarative input to the compiler. A rule is a conjunction of
//! conditions over event attributes:
//!
//! ```json
//! {
//!   "ruleCode": "HIGH_VALUE_US",
//!   "priority": 10,
//!   "description": "High-value US orders",
//!   "conditions": [
//!     { "field": "country", "operator": "EQUAL_TO", "value": "US" },
//!     { "field": "amount", "operator": "GREATER_THAN", "value": 1000 }
//!   ]
//! }
//! ```
//!
//! Value shape depends on the operator: `BETWEEN` requires `[min, max]`,
//! `IS_ANY_OF` a non-empty array, `REGEX` a string (compiled to a full-match
//! pattern), everything else a scalar. Field paths are case-insensitive;
//! hyphens become underscores and nested keys join with `.`.

use crate::error::{HeliosError, HeliosResult};
use crate::predicate::Operator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// A scalar condition or attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// The operand of a condition: a scalar or a list, depending on the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
}

/// One conjunct of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    /// Dotted field path, case-insensitive
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// A user-authored rule: a conjunction of conditions plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub rule_code: String,
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    /// Validate the rule's shape: non-empty code and conditions, and a
    /// value shape matching each condition's operator. Regex compilation is
    /// deferred to the encode stage.
    pub fn validate(&self) -> HeliosResult<()> {
        if self.rule_code.trim().is_empty() {
            return Err(HeliosError::invalid_rule(
                "<unnamed>",
                "ruleCode must be non-empty",
            ));
        }
        if self.conditions.is_empty() {
            return Err(HeliosError::invalid_rule(
                &self.rule_code,
                "conditions must not be empty",
            ));
        }
        for (i, cond) in self.conditions.iter().enumerate() {
            self.validate_condition(i, cond)?;
        }
        Ok(())
    }

    fn validate_condition(&self, index: usize, cond: &ConditionDefinition) -> HeliosResult<()> {
        let fail = |detail: String| {
            Err(HeliosError::invalid_rule(
                &self.rule_code,
                format!("condition {} ({}): {}", index, cond.field, detail),
            ))
        };
        if cond.field.trim().is_empty() {
            return fail("field must be non-empty".to_string());
        }
        match cond.operator {
            Operator::EqualTo | Operator::NotEqualTo => match &cond.value {
                ConditionValue::Scalar(_) => Ok(()),
                ConditionValue::List(_) => {
                    fail(format!("{} requires a scalar value", cond.operator.as_str()))
                }
            },
            Operator::GreaterThan | Operator::LessThan => match &cond.value {
                ConditionValue::Scalar(ScalarValue::Number(_)) => Ok(()),
                _ => fail(format!(
                    "{} requires a numeric value",
                    cond.operator.as_str()
                )),
            },
            Operator::Between => match &cond.value {
                ConditionValue::List(bounds) if bounds.len() == 2 => match (&bounds[0], &bounds[1])
                {
                    (ScalarValue::Number(lo), ScalarValue::Number(hi)) => {
                        if lo > hi {
                            fail(format!("BETWEEN bounds are inverted: [{}, {}]", lo, hi))
                        } else {
                            Ok(())
                        }
                    }
                    (ScalarValue::String(_), ScalarValue::String(_)) => Ok(()),
                    _ => fail("BETWEEN bounds must both be numbers or both strings".to_string()),
                },
                _ => fail("BETWEEN requires a [min, max] pair".to_string()),
            },
            Operator::IsAnyOf => match &cond.value {
                ConditionValue::List(values) if !values.is_empty() => Ok(()),
                ConditionValue::List(_) => fail("IS_ANY_OF requires a non-empty array".to_string()),
                ConditionValue::Scalar(_) => fail("IS_ANY_OF requires an array".to_string()),
            },
            Operator::Contains => match &cond.value {
                ConditionValue::Scalar(ScalarValue::String(s)) if !s.is_empty() => Ok(()),
                ConditionValue::Scalar(ScalarValue::String(_)) => {
                    fail("CONTAINS requires a non-empty string".to_string())
                }
                _ => fail("CONTAINS requires a string value".to_string()),
            },
            Operator::Regex => match &cond.value {
                ConditionValue::Scalar(ScalarValue::String(_)) => Ok(()),
                _ => fail("REGEX requires a string pattern".to_string()),
            },
        }
    }
}

/// An ordered collection of rule definitions, the unit handed to the
/// compiler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<RuleDefinition>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet { rules: Vec::new() }
    }

    pub fn push(&mut self, rule: RuleDefinition) {
        self.rules.push(rule);
    }

    /// Parse a JSON array of rule definitions.
    ///
    /// Rules deserialize one element at a time so a malformed rule (unknown
    /// operator, missing `ruleCode`, wrong value shape) is reported against
    /// that rule rather than failing the whole array anonymously.
    pub fn from_json_str(json: &str) -> HeliosResult<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut rules = Vec::with_capacity(raw.len());
        for (index, value) in raw.into_iter().enumerate() {
            // Pull the code out before deserializing so the error can name
            // the offending rule; fall back to its array position.
            let rule_code = value
                .get("ruleCode")
                .and_then(|code| code.as_str())
                .filter(|code| !code.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("<rule #{}>", index));
            let rule: RuleDefinition = serde_json::from_value(value)
                .map_err(|err| HeliosError::invalid_rule(&rule_code, err.to_string()))?;
            rules.push(rule);
        }
        Ok(RuleSet { rules })
    }

    /// Read and parse a JSON rule file.
    pub fn from_json_file(path: impl AsRef<Path>) -> HeliosResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check `ruleCode` uniqueness across the set.
    pub fn check_unique_codes(&self) -> HeliosResult<()> {
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !seen.insert(rule.rule_code.as_str()) {
                return Err(HeliosError::invalid_rule(
                    &rule.rule_code,
                    "duplicate ruleCode",
                ));
            }
        }
        Ok(())
    }
}

impl FromIterator<RuleDefinition> for RuleSet {
    fn from_iter<T: IntoIterator<Item = RuleDefinition>>(iter: T) -> Self {
        RuleSet {
            rules: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(json: &str) -> RuleDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_minimal_rule() {
        let r = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"}]}"#,
        );
        assert_eq!(r.rule_code, "R1");
        assert_eq!(r.priority, 0);
        assert!(r.enabled);
        assert!(r.tags.is_empty());
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_reject_empty_rule_code() {
        let r = rule(
            r#"{"ruleCode": "  ",
                "conditions": [{"field": "status", "operator": "EQUAL_TO", "value": "X"}]}"#,
        );
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_reject_empty_conditions() {
        let r = rule(r#"{"ruleCode": "R1", "conditions": []}"#);
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("conditions"));
    }

    #[test]
    fn test_unknown_operator_names_the_rule() {
        let err = RuleSet::from_json_str(
            r#"[
                {"ruleCode": "OK", "conditions": [{"field": "a", "operator": "EQUAL_TO", "value": 1}]},
                {"ruleCode": "BAD_OP",
                 "conditions": [{"field": "x", "operator": "LIKE", "value": "y"}]}
            ]"#,
        )
        .unwrap_err();
        match err {
            HeliosError::InvalidRule { rule_code, .. } => assert_eq!(rule_code, "BAD_OP"),
            other => panic!("expected InvalidRule, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_rule_code_names_the_position() {
        let err = RuleSet::from_json_str(
            r#"[{"conditions": [{"field": "a", "operator": "EQUAL_TO", "value": 1}]}]"#,
        )
        .unwrap_err();
        match err {
            HeliosError::InvalidRule { rule_code, .. } => assert_eq!(rule_code, "<rule #0>"),
            other => panic!("expected InvalidRule, got {:?}", other),
        }
    }

    #[test]
    fn test_between_requires_pair() {
        let r = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "amount", "operator": "BETWEEN", "value": [100]}]}"#,
        );
        assert!(r.validate().is_err());

        let ok = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "amount", "operator": "BETWEEN", "value": [100, 200]}]}"#,
        );
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_between_rejects_inverted_bounds() {
        let r = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "amount", "operator": "BETWEEN", "value": [200, 100]}]}"#,
        );
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_is_any_of_requires_non_empty_list() {
        let r = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "country", "operator": "IS_ANY_OF", "value": []}]}"#,
        );
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_contains_requires_string() {
        let r = rule(
            r#"{"ruleCode": "R1",
                "conditions": [{"field": "msg", "operator": "CONTAINS", "value": 7}]}"#,
        );
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_duplicate_rule_codes_rejected() {
        let set = RuleSet::from_json_str(
            r#"[
                {"ruleCode": "R1", "conditions": [{"field": "a", "operator": "EQUAL_TO", "value": 1}]},
                {"ruleCode": "R1", "conditions": [{"field": "b", "operator": "EQUAL_TO", "value": 2}]}
            ]"#,
        )
        .unwrap();
        assert!(set.check_unique_codes().is_err());
    }
}
