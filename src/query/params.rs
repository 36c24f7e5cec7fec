//! Ordered parameter table owned by one query.

use crate::error::OrmError;
use crate::value::{display_value, Bound};
use sea_query::Value;
use std::fmt;

/// Wildcards re-applied to a string parameter at bind time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeWrap {
    /// `%value%`
    Contains,
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
}

impl LikeWrap {
    fn prefix(self) -> &'static str {
        match self {
            LikeWrap::Contains | LikeWrap::EndsWith => "%",
            LikeWrap::StartsWith => "",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            LikeWrap::Contains | LikeWrap::StartsWith => "%",
            LikeWrap::EndsWith => "",
        }
    }

    /// Wrap a string value; anything else is returned unchanged
    pub fn apply(self, value: &Value) -> Value {
        match value {
            Value::String(Some(s)) => {
                Value::String(Some(format!("{}{}{}", self.prefix(), s, self.suffix())))
            }
            other => other.clone(),
        }
    }
}

/// One named parameter.
///
/// The raw value is kept apart from its LIKE wrap so a compiled query can
/// replace the value and still get the wildcards.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Bound,
    pub wrap: Option<LikeWrap>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Bound, wrap: Option<LikeWrap>) -> Self {
        Self {
            name: name.into(),
            value,
            wrap,
        }
    }

    /// The value sent to the database, wildcards applied.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ArgumentMismatch` for a list placeholder that was
    /// never expanded by a compiled-query invocation.
    pub fn bound_value(&self) -> Result<Value, OrmError> {
        match &self.value {
            Bound::One(value) => Ok(match self.wrap {
                Some(wrap) => wrap.apply(value),
                None => value.clone(),
            }),
            Bound::Many(_) => Err(OrmError::ArgumentMismatch(format!(
                "list parameter '{}' has not been expanded",
                self.name
            ))),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bound_value() {
            Ok(value) => write!(f, "{}={}", self.name, display_value(&value)),
            Err(_) => write!(f, "{}=<list>", self.name),
        }
    }
}

/// Parameters in the order they were bound
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable {
    entries: Vec<Parameter>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`. Re-binding the same name is allowed only with the same
    /// value and wrap, in which case the existing slot is shared.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParameterConflict` when the name is already bound
    /// to something else.
    pub fn bind(
        &mut self,
        name: &str,
        value: Bound,
        wrap: Option<LikeWrap>,
    ) -> Result<(), OrmError> {
        if let Some(existing) = self.get(name) {
            return if existing.value == value && existing.wrap == wrap {
                Ok(())
            } else {
                Err(OrmError::ParameterConflict(name.to_string()))
            };
        }
        self.entries.push(Parameter::new(name, value, wrap));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.entries.iter_mut().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|p| p.name == name)
    }

    /// Replace the entry at `index` with `replacement`, keeping order
    pub(crate) fn splice(&mut self, index: usize, replacement: Vec<Parameter>) {
        self.entries.splice(index..=index, replacement);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.iter()
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace whole-token occurrences of `token` in `text`.
///
/// `:pid` is not replaced inside `:pids0`.
pub(crate) fn replace_token(text: &str, token: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(token) {
        let end = at + token.len();
        out.push_str(&rest[..at]);
        let boundary = rest[end..].chars().next().map_or(true, |c| !is_identifier_char(c));
        if boundary {
            out.push_str(replacement);
        } else {
            out.push_str(token);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::String(Some(s.to_string()))
    }

    #[test]
    fn test_wrap_applies_only_to_strings() {
        assert_eq!(LikeWrap::Contains.apply(&text("att")), text("%att%"));
        assert_eq!(LikeWrap::StartsWith.apply(&text("Ma")), text("Ma%"));
        assert_eq!(LikeWrap::EndsWith.apply(&text("en")), text("%en"));
        assert_eq!(LikeWrap::Contains.apply(&Value::Int(Some(3))), Value::Int(Some(3)));
        assert_eq!(LikeWrap::Contains.apply(&Value::String(None)), Value::String(None));
    }

    #[test]
    fn test_bind_reuses_identical_slot() {
        let mut table = ParameterTable::new();
        table.bind("pid", Bound::One(Value::BigInt(Some(7))), None).unwrap();
        table.bind("pid", Bound::One(Value::BigInt(Some(7))), None).unwrap();
        assert_eq!(table.len(), 1);

        let err = table
            .bind("pid", Bound::One(Value::BigInt(Some(8))), None)
            .unwrap_err();
        assert!(matches!(err, OrmError::ParameterConflict(ref n) if n == "pid"));
    }

    #[test]
    fn test_bound_value_applies_wrap() {
        let p = Parameter::new("pname", Bound::One(text("Ros")), Some(LikeWrap::Contains));
        assert_eq!(p.bound_value().unwrap(), text("%Ros%"));
        assert_eq!(p.to_string(), "pname=%Ros%");

        let list = Parameter::new("pids", Bound::Many(vec![]), None);
        assert!(list.bound_value().is_err());
    }

    #[test]
    fn test_splice_keeps_order() {
        let mut table = ParameterTable::new();
        table.bind("c0", Bound::One(Value::Int(Some(1))), None).unwrap();
        table.bind("pids", Bound::Many(vec![]), None).unwrap();
        table.bind("c1", Bound::One(Value::Int(Some(2))), None).unwrap();
        let index = table.position("pids").unwrap();
        table.splice(
            index,
            vec![
                Parameter::new("pids0", Bound::One(Value::Int(Some(5))), None),
                Parameter::new("pids1", Bound::One(Value::Int(Some(6))), None),
            ],
        );
        let names: Vec<&str> = table.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["c0", "pids0", "pids1", "c1"]);
    }

    #[test]
    fn test_replace_token_matches_whole_tokens() {
        let sql = "(\"id\" IN (:pids)) AND (\"x\" = :pids0) AND (\"y\" = :pid)";
        assert_eq!(
            replace_token(sql, ":pids", ":pids0, :pids1"),
            "(\"id\" IN (:pids0, :pids1)) AND (\"x\" = :pids0) AND (\"y\" = :pid)"
        );
        assert_eq!(replace_token(":pid", ":pid", "@x"), "@x");
    }
}
