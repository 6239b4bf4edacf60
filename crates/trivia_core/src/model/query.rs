//! Document query conditions.

use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Comparison operator of one query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other => Err(format!("unsupported comparator `{other}`")),
        }
    }
}

/// One `(field, comparator, value)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    /// Dotted path into the stored document, e.g. `created_uid`.
    pub field: String,
    pub comparator: Comparator,
    pub value: Value,
}

impl QueryParam {
    pub fn new(field: impl Into<String>, comparator: Comparator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            comparator,
            value: value.into(),
        }
    }
}

/// Ordered AND-list of conditions. An empty list matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    conditions: Vec<QueryParam>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an equality condition.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryParam::new(field, Comparator::Eq, value));
        self
    }

    /// Appends a condition with any comparator.
    pub fn push(&mut self, param: QueryParam) {
        self.conditions.push(param);
    }

    pub fn conditions(&self) -> &[QueryParam] {
        &self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::{Comparator, QueryParams};
    use serde_json::json;

    #[test]
    fn comparator_parses_symbols() {
        assert_eq!(">=".parse::<Comparator>(), Ok(Comparator::Ge));
        assert_eq!(" != ".parse::<Comparator>(), Ok(Comparator::NotEq));
        assert!("array-contains".parse::<Comparator>().is_err());
    }

    #[test]
    fn where_eq_keeps_condition_order() {
        let params = QueryParams::new()
            .where_eq("created_uid", "u1")
            .where_eq("bulkUploadId", "b1");

        let fields: Vec<&str> = params
            .conditions()
            .iter()
            .map(|param| param.field.as_str())
            .collect();
        assert_eq!(fields, ["created_uid", "bulkUploadId"]);
        assert_eq!(params.conditions()[1].value, json!("b1"));
    }
}
