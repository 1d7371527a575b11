//! Environment type: named variable sets, independent of the collection tree.

use serde::{Deserialize, Serialize};

/// Whether a variable's value should be masked when displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    Plain,
    Secret,
}

/// One `{key, value, type, enabled}` entry of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Variable {
    pub fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: VariableKind::Plain,
            enabled: true,
        }
    }

    pub fn secret(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: VariableKind::Secret,
            ..Self::plain(key, value)
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A flat, named list of variables. Names are unique among environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Environment {
    pub fn new(name: impl Into<String>, variables: Vec<Variable>) -> Self {
        Self {
            name: name.into(),
            variables,
        }
    }

    /// Value of the last enabled variable named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables
            .iter()
            .rev()
            .find(|v| v.enabled && v.key == key)
            .map(|v| v.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_kind_serializes_as_type() {
        let json = serde_json::to_value(Variable::secret("token", "abc")).expect("serialize");
        assert_eq!(json["type"], "secret");
        assert_eq!(json["enabled"], true);
    }

    #[test]
    fn get_skips_disabled_and_prefers_last() {
        let mut env = Environment::new(
            "staging",
            vec![
                Variable::plain("host", "a.example"),
                Variable::plain("host", "b.example"),
            ],
        );
        assert_eq!(env.get("host"), Some("b.example"));
        env.variables[1].enabled = false;
        assert_eq!(env.get("host"), Some("a.example"));
        assert_eq!(env.get("missing"), None);
    }
}
