//! Re-framing of a finished answer as server-sent event payloads.

use proto::QueryResult;
use serde_json::{Value, json};

/// Characters per `chunk` frame.
pub const CHUNK_CHARS: usize = 28;

/// Splits `text` into slices of at most `size` characters, in order.
/// Empty text still yields one empty slice.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Frames for one result: `chunk`s followed by `done`, or a single `error`.
pub fn stream_frames(result: &QueryResult) -> Vec<Value> {
    if !result.success {
        let error = result.error.as_deref().unwrap_or("Query failed");
        return vec![json!({"type": "error", "error": error})];
    }

    let text = result
        .response
        .as_ref()
        .map(|payload| payload.display_text())
        .unwrap_or_default();
    let mut frames: Vec<Value> = chunk_text(&text, CHUNK_CHARS)
        .into_iter()
        .map(|content| json!({"type": "chunk", "content": content}))
        .collect();
    frames.push(json!({
        "type": "done",
        "provider": result.provider,
        "model": result.model,
    }));
    frames
}
