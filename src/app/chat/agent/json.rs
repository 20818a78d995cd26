use serde_json::Value;

/// First JSON object in a model reply.
///
/// A fenced ```json block wins when present; otherwise every `{` is tried in
/// order until one starts a well-formed object. Trailing prose is ignored.
pub fn extract_json_block(value: &str) -> Option<Value> {
    if let Some(fenced) = fenced_json(value) {
        if let Some(object) = first_object(fenced) {
            return Some(object);
        }
    }
    first_object(value)
}

fn fenced_json(value: &str) -> Option<&str> {
    let (_, after) = value.split_once("```json")?;
    let body = after.split_once("```").map_or(after, |(body, _)| body);
    Some(body.trim())
}

fn first_object(value: &str) -> Option<Value> {
    value
        .char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let candidate = value.get(start..)?;
            let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
            match stream.next() {
                Some(Ok(parsed)) if parsed.is_object() => Some(parsed),
                _ => None,
            }
        })
}
