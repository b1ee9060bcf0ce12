//! Decoding of the portfolio stage's decision payload
//!
//! The payload is JSON, usually produced by a language model. Two top-level
//! shapes are accepted:
//!
//! ```json
//! {"AAPL": {"action": "buy", "quantity": 10, "confidence": 80.0, "reasoning": "..."}}
//! {"decisions": {"AAPL": {"action": "buy", "quantity": 10, "confidence": 80.0}}}
//! ```
//!
//! A surrounding markdown code fence is stripped before decoding.

use hedge_core::{Action, Decision, Decisions, ParseError};
use serde_json::{Map, Value};

/// Parse a raw decision payload
pub fn parse(raw: &str) -> Result<Decisions, ParseError> {
    let body = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;

    match value {
        Value::Object(map) => decode_object(map),
        other => Err(ParseError::TypeMismatch {
            expected: "object",
            found: type_name(&other).to_string(),
        }),
    }
}

/// Parse a payload carried inside a JSON value
///
/// Only string values are payloads. Anything else is a type mismatch.
pub fn parse_value(value: &Value) -> Result<Decisions, ParseError> {
    match value {
        Value::String(raw) => parse(raw),
        other => Err(ParseError::TypeMismatch {
            expected: "string",
            found: type_name(other).to_string(),
        }),
    }
}

/// Parse a payload and reject decisions for tickers outside `tickers`
pub fn parse_for(raw: &str, tickers: &[String]) -> Result<Decisions, ParseError> {
    let decisions = parse(raw)?;
    if let Some(unknown) = decisions.keys().find(|t| !tickers.contains(t)) {
        return Err(ParseError::Schema {
            ticker: unknown.clone(),
            reason: "ticker was not requested".to_string(),
        });
    }
    Ok(decisions)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // drop the info string (e.g. `json`), whether or not a newline follows it
    rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .trim()
}

fn decode_object(mut map: Map<String, Value>) -> Result<Decisions, ParseError> {
    if map.len() == 1 && matches!(map.get("decisions"), Some(Value::Object(_))) {
        if let Some(Value::Object(inner)) = map.remove("decisions") {
            map = inner;
        }
    }

    let mut decisions = Decisions::new();
    for (raw_ticker, entry) in map {
        let ticker = raw_ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(schema(&raw_ticker, "ticker is empty"));
        }
        let decision = decode_decision(&ticker, &entry)?;
        if decisions.insert(ticker.clone(), decision).is_some() {
            return Err(schema(&ticker, "duplicate ticker"));
        }
    }
    Ok(decisions)
}

fn decode_decision(ticker: &str, entry: &Value) -> Result<Decision, ParseError> {
    let Value::Object(fields) = entry else {
        return Err(schema(ticker, format!("expected an object, got {}", type_name(entry))));
    };

    let action = match fields.get("action") {
        Some(Value::String(s)) => s.parse::<Action>().map_err(|e| schema(ticker, e))?,
        Some(other) => {
            let found = type_name(other);
            return Err(schema(ticker, format!("action must be a string, got {found}")));
        }
        None => return Err(schema(ticker, "missing action")),
    };

    let quantity = match fields.get("quantity") {
        Some(Value::Number(n)) => quantity_from(n).ok_or_else(|| {
            schema(ticker, format!("quantity must be a non-negative integer, got {n}"))
        })?,
        Some(other) => {
            let found = type_name(other);
            return Err(schema(ticker, format!("quantity must be a number, got {found}")));
        }
        None => return Err(schema(ticker, "missing quantity")),
    };

    let confidence = match fields.get("confidence") {
        Some(Value::Number(n)) => match n.as_f64() {
            Some(c) if c.is_finite() && (0.0..=100.0).contains(&c) => c,
            _ => {
                let reason = format!("confidence must be within [0, 100], got {n}");
                return Err(schema(ticker, reason));
            }
        },
        Some(other) => {
            let found = type_name(other);
            return Err(schema(ticker, format!("confidence must be a number, got {found}")));
        }
        None => return Err(schema(ticker, "missing confidence")),
    };

    let reasoning = match fields.get("reasoning") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok(Decision {
        action,
        quantity,
        confidence,
        reasoning,
    })
}

fn quantity_from(n: &serde_json::Number) -> Option<u64> {
    if let Some(q) = n.as_u64() {
        return Some(q);
    }
    let f = n.as_f64()?;
    // integral floats such as `10.0` are accepted; 2^64 and above would saturate
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64).then(|| f as u64)
}

fn schema(ticker: &str, reason: impl Into<String>) -> ParseError {
    ParseError::Schema {
        ticker: ticker.to_string(),
        reason: reason.into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const PAYLOAD: &str = r#"{
        "AAPL": {"action": "buy", "quantity": 10, "confidence": 82.5, "reasoning": "strong moat"},
        "MSFT": {"action": "HOLD", "quantity": 0, "confidence": 40, "reasoning": "fairly valued"}
    }"#;

    #[test]
    fn test_parse_well_formed() {
        let decisions = parse(PAYLOAD).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions["AAPL"].action, Action::Buy);
        assert_eq!(decisions["AAPL"].quantity, 10);
        assert_eq!(decisions["MSFT"].action, Action::Hold);
        assert!((decisions["MSFT"].confidence - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_wrapped_and_fenced() {
        let wrapped = format!("```json\n{{\"decisions\": {PAYLOAD}}}\n```");
        let decisions = parse(&wrapped).unwrap();
        assert_eq!(decisions.keys().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_parse_single_line_fence() {
        let raw = r#"```{"AAPL": {"action": "buy", "quantity": 3, "confidence": 60}}```"#;
        let decisions = assert_ok!(parse(raw));
        assert_eq!(decisions["AAPL"].quantity, 3);

        let tagged = r#"```json{"AAPL": {"action": "sell", "quantity": 1, "confidence": 5}}```"#;
        assert_eq!(assert_ok!(parse(tagged))["AAPL"].action, Action::Sell);

        let brace_on_fence_line = concat!(
            "```{\"AAPL\": {\"action\": \"hold\",\n",
            "\"quantity\": 0, \"confidence\": 1}}\n```"
        );
        assert_ok!(parse(brace_on_fence_line));
    }

    #[test]
    fn test_quantity_at_u64_boundary() {
        // 18446744073709551616.0 is exactly 2^64
        let overflow = concat!(
            r#"{"AAPL": {"action": "buy", "#,
            r#""quantity": 18446744073709551616.0, "confidence": 50}}"#
        );
        let err = assert_err!(parse(overflow));
        assert!(matches!(err, ParseError::Schema { ticker, .. } if ticker == "AAPL"));

        let largest = format!(
            r#"{{"AAPL": {{"action": "buy", "quantity": {}, "confidence": 50}}}}"#,
            u64::MAX
        );
        assert_eq!(assert_ok!(parse(&largest))["AAPL"].quantity, u64::MAX);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(parse(""), Err(ParseError::Malformed(_))));
        assert!(matches!(parse("I recommend buying AAPL"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(&PAYLOAD[..40]), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            parse("[1, 2, 3]"),
            Err(ParseError::TypeMismatch { expected: "object", .. })
        ));
        assert!(matches!(
            parse_value(&json!({"AAPL": {}})),
            Err(ParseError::TypeMismatch { expected: "string", .. })
        ));
        assert!(parse_value(&json!(PAYLOAD)).is_ok());
    }

    #[test]
    fn test_schema_violations() {
        let cases = [
            json!({"AAPL": {"action": "yolo", "quantity": 1, "confidence": 50}}),
            json!({"AAPL": {"action": "buy", "quantity": -1, "confidence": 50}}),
            json!({"AAPL": {"action": "buy", "quantity": 1.5, "confidence": 50}}),
            json!({"AAPL": {"action": "buy", "quantity": 1, "confidence": 101}}),
            json!({"AAPL": {"action": "buy", "confidence": 50}}),
            json!({"AAPL": "buy"}),
        ];
        for case in cases {
            let err = parse(&case.to_string()).unwrap_err();
            assert!(
                matches!(&err, ParseError::Schema { ticker, .. } if ticker == "AAPL"),
                "{case} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_lenient_fields() {
        let raw = json!({
            "aapl": {"action": "Sell", "quantity": 5.0, "confidence": 10, "reasoning": {"score": 3}}
        });
        let decisions = parse(&raw.to_string()).unwrap();
        let d = &decisions["AAPL"];
        assert_eq!(d.action, Action::Sell);
        assert_eq!(d.quantity, 5);
        assert_eq!(d.reasoning, r#"{"score":3}"#);
    }

    #[test]
    fn test_parse_for_rejects_unrequested_tickers() {
        let tickers = vec!["AAPL".to_string()];
        let err = parse_for(PAYLOAD, &tickers).unwrap_err();
        assert!(matches!(err, ParseError::Schema { ticker, .. } if ticker == "MSFT"));

        let tickers = vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()];
        assert_eq!(parse_for(PAYLOAD, &tickers).unwrap().len(), 2);
    }
}
