//! Reply splitting at the transport message limit.
//!
//! A chunk breaks at the last newline before the limit when that leaves a
//! first chunk of at least half the limit; otherwise it hard-splits.

use maestro_core::config::MESSAGE_CHUNK_LIMIT;

pub fn split_reply(text: &str) -> Vec<String> {
    split_with_limit(text, MESSAGE_CHUNK_LIMIT)
}

fn split_with_limit(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > limit {
        let window: String = remaining.chars().take(limit).collect();
        let split_chars = match window.rfind('\n') {
            Some(byte_idx) => {
                let chars_before = window[..byte_idx].chars().count();
                if chars_before >= limit / 2 {
                    chars_before
                } else {
                    limit
                }
            }
            None => limit,
        };

        let head: String = remaining.chars().take(split_chars).collect();
        chunks.push(head.clone());
        let mut rest = &remaining[head.len()..];
        // Drop the newline the split landed on.
        if split_chars < limit {
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }
        remaining = rest;
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}
