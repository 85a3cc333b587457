//! Splitting an outbound payload into ordered, char-boundary-safe pieces,
//! and reassembling inbound pieces back into one payload.

use std::collections::BTreeMap;

/// Split `data` into pieces no larger than `threshold_bytes`, respecting
/// UTF-8 char boundaries. A payload at or under the threshold returns a
/// single-element vec (spec section 8: exactly-at-threshold is not split).
pub fn split_into_chunks(data: &str, threshold_bytes: usize) -> Vec<String> {
    if data.len() <= threshold_bytes || threshold_bytes == 0 {
        return vec![data.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for ch in data.chars() {
        let ch_len = ch.len_utf8();
        if current_len + ch_len > threshold_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(ch);
        current_len += ch_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Accumulates pieces of one chunked inbound message until all have
/// arrived, then reassembles them in order.
#[derive(Debug, Default)]
pub struct ChunkAssembly {
    total: u32,
    pieces: BTreeMap<u32, String>,
}

impl ChunkAssembly {
    /// Record one piece. Returns the reassembled payload once every piece
    /// `1..=total` has been seen.
    pub fn add(&mut self, index: u32, total: u32, data: String) -> Option<String> {
        self.total = total;
        self.pieces.insert(index, data);
        if self.pieces.len() as u32 == self.total {
            Some(self.pieces.values().cloned().collect::<Vec<_>>().concat())
        } else {
            None
        }
    }
}
