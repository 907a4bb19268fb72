//! Components that consult the model backend.
//!
//! Each agent renders its prompt, asks the backend through
//! [`generate_structured`](crate::io::backend::generate_structured), and turns
//! the schema-validated answer into core types.

use serde::Deserialize;

pub mod gate;
pub mod interpreter;
pub mod resolver;

/// `{name, value}` pair as the backend returns it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ParamSpec {
    pub name: String,
    pub value: ScalarValue,
}

/// Param values arrive as JSON scalars and are carried as strings internally.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum ScalarValue {
    Text(String),
    Flag(bool),
    Number(serde_json::Number),
}

impl ScalarValue {
    pub fn into_string(self) -> String {
        match self {
            ScalarValue::Text(text) => text,
            ScalarValue::Flag(flag) => flag.to_string(),
            ScalarValue::Number(number) => match number.as_f64() {
                // 50.0 and 50 both mean "50" to the planner.
                Some(float)
                    if number.is_f64() && float.fract() == 0.0 && float.abs() < 1e15 =>
                {
                    format!("{}", float as i64)
                }
                _ => number.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(value: serde_json::Value) -> String {
        serde_json::from_value::<ScalarValue>(value)
            .expect("scalar")
            .into_string()
    }

    #[test]
    fn scalars_normalize_to_strings() {
        assert_eq!(normalize(json!("Desktop")), "Desktop");
        assert_eq!(normalize(json!(true)), "true");
        assert_eq!(normalize(json!(50)), "50");
        assert_eq!(normalize(json!(50.0)), "50");
        assert_eq!(normalize(json!(0.5)), "0.5");
        assert_eq!(normalize(json!(-3)), "-3");
    }
}
