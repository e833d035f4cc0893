//! Query Key Module
//!
//! Logical identity of a cached query: a namespace (usually the table the
//! query reads) followed by ordered parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Query Key ==
/// Composite cache key, e.g. `tasks` or `tasks:assignee=12:status=open`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    namespace: String,
    #[serde(default)]
    params: Vec<String>,
}

impl QueryKey {
    /// Creates a key with no parameters.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            params: Vec::new(),
        }
    }

    /// Appends one positional parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Appends a `name=value` parameter.
    pub fn with(self, name: &str, value: impl fmt::Display) -> Self {
        self.with_param(format!("{}={}", name, value))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for param in &self.params {
            write!(f, ":{}", param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(QueryKey::new("tasks").to_string(), "tasks");
        assert_eq!(
            QueryKey::new("tasks")
                .with("assignee", 12)
                .with_param("open")
                .to_string(),
            "tasks:assignee=12:open"
        );
    }

    #[test]
    fn test_params_are_ordered() {
        let a = QueryKey::new("cash").with("branch", "north").with("day", 1);
        let b = QueryKey::new("cash").with("day", 1).with("branch", "north");
        assert_ne!(a, b);
        assert!(a.in_namespace("cash"));
        assert!(!a.in_namespace("cash_transactions"));
    }

    #[test]
    fn test_deserialize_without_params() {
        let key: QueryKey = serde_json::from_str(r#"{"namespace":"teams"}"#).unwrap();
        assert_eq!(key, QueryKey::new("teams"));
    }
}
