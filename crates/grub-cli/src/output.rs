use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

/// Serialize a command's result as a single JSON document.
pub fn to_json<T: Serialize>(data: &T, pretty: bool) -> Result<String, CliError> {
    let value = serde_json::to_value(data)?;
    let payload = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(payload)
}

pub fn render(data: &Value, pretty: bool) -> Result<(), CliError> {
    println!("{}", to_json(data, pretty)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_output_is_one_line() {
        let payload = to_json(&json!({"ticker": "ALICE", "price": 10.25}), false).expect("json");
        assert!(!payload.contains('\n'));
        assert!(payload.contains("\"ticker\":\"ALICE\""));
    }

    #[test]
    fn pretty_output_is_indented() {
        let payload = to_json(&json!({"ticker": "ALICE"}), true).expect("json");
        assert!(payload.contains("\n  \"ticker\""));
    }
}
