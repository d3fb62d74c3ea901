//! SQL statements with bound parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// A SQL statement plus its named parameters.
///
/// Two statements are equal only if the SQL text and every parameter (name, value and
/// position) are equal. Replay relies on this to re-send exactly what was sent before.
///
/// # Example
///
/// ```
/// use spindle_core::Statement;
///
/// let stmt = Statement::new("SELECT name FROM singers WHERE id = @id").bind("id", 1i64);
/// assert_eq!(stmt.sql(), "SELECT name FROM singers WHERE id = @id");
/// assert_eq!(stmt.params().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    sql: String,
    #[serde(default)]
    params: Vec<(String, Value)>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    /// Binds a named parameter, replacing any earlier binding with the same name.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the bound parameters in binding order.
    #[must_use]
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Returns the value bound to `name`, if any.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            f.write_str(" {")?;
            for (i, (name, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "@{name}={value}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
