//! Text extraction from heterogeneous response and stream-event shapes.

use serde_json::Value;

/// Event type carrying an incremental text delta.
pub const OUTPUT_TEXT_DELTA: &str = "response.output_text.delta";

/// Extract text from a completed response.
///
/// Precedence: non-empty `output_text`, then `output[0].content[0].text`,
/// then the stringified response.
pub fn extract_response_text(response: &Value) -> String {
    if let Some(text) = non_empty_str(response.get("output_text")) {
        return text.to_string();
    }

    if let Some(text) = response
        .get("output")
        .and_then(|output| output.get(0))
        .and_then(|item| item.get("content"))
        .and_then(|content| content.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
    {
        return text.to_string();
    }

    stringify(response)
}

/// Extract a concatenable fragment from one stream event.
///
/// Precedence: the delta of an output-text delta event (or any string `delta`
/// field), then a cumulative `output_text` field as-is, then the stringified
/// event. Empty fragments yield `None`.
pub fn extract_event_fragment(event: &Value) -> Option<String> {
    let fragment = if event.get("type").and_then(Value::as_str) == Some(OUTPUT_TEXT_DELTA) {
        match event.get("delta") {
            None | Some(Value::Null) => String::new(),
            Some(delta) => stringify(delta),
        }
    } else if let Some(delta) = event.get("delta").and_then(Value::as_str) {
        delta.to_string()
    } else if let Some(partial) = non_empty_str(event.get("output_text")) {
        partial.to_string()
    } else {
        stringify(event)
    };

    (!fragment.is_empty()).then_some(fragment)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Strings render bare; everything else as compact JSON; `null` as empty.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
