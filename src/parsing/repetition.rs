//! Repetition guard
//!
//! Detects a model stuck emitting the same short token sequence over and
//! over, which left unchecked would otherwise stream forever. The guard
//! looks at the most recent tokens in fixed-size, non-overlapping windows and
//! halts ingestion once `limit` consecutive windows of a given length hash
//! identically.

use std::collections::VecDeque;

/// DJB2 hash over a token-id window's little-endian bytes.
fn djb2(window: &[u32]) -> u32 {
    let mut hash: u32 = 5381;
    for &token in window {
        for byte in token.to_le_bytes() {
            hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
        }
    }
    hash
}

/// Sliding-window repetition detector over a stream of token ids.
///
/// Configured with `limit` (how many identical consecutive windows trip the
/// guard) and `max_sequence_length` (the longest window length considered).
/// A `limit` or `max_sequence_length` of `0` disables the guard entirely.
pub(crate) struct RepetitionGuard {
    limit: usize,
    max_sequence_length: usize,
    tokens: VecDeque<u32>,
}

impl RepetitionGuard {
    pub(crate) fn new(limit: usize, max_sequence_length: usize) -> Self {
        Self {
            limit,
            max_sequence_length,
            tokens: VecDeque::new(),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.limit > 0 && self.max_sequence_length > 0
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    /// Records `token` and reports whether the guard has now tripped.
    pub(crate) fn push(&mut self, token: u32) -> bool {
        if !self.is_enabled() {
            return false;
        }

        self.tokens.push_back(token);
        let cap = self.limit * self.max_sequence_length;
        while self.tokens.len() > cap {
            self.tokens.pop_front();
        }

        for window_len in 1..=self.max_sequence_length {
            let needed = self.limit * window_len;
            if self.tokens.len() < needed {
                continue;
            }

            let recent: Vec<u32> = self
                .tokens
                .iter()
                .skip(self.tokens.len() - needed)
                .copied()
                .collect();

            let first_hash = djb2(&recent[..window_len]);
            let all_equal = recent
                .chunks_exact(window_len)
                .all(|chunk| djb2(chunk) == first_hash);

            if all_equal {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_guard_never_trips() {
        let mut guard = RepetitionGuard::new(0, 0);
        for _ in 0..1000 {
            assert!(!guard.push(42));
        }
    }

    #[test]
    fn trips_on_repeated_single_token() {
        let mut guard = RepetitionGuard::new(3, 1);
        assert!(!guard.push(7));
        assert!(!guard.push(7));
        assert!(guard.push(7));
    }

    #[test]
    fn trips_on_repeated_multi_token_window() {
        let mut guard = RepetitionGuard::new(3, 2);
        for _ in 0..2 {
            assert!(!guard.push(1));
            assert!(!guard.push(2));
        }
        assert!(!guard.push(1));
        assert!(guard.push(2));
    }

    #[test]
    fn does_not_trip_on_varied_tokens() {
        let mut guard = RepetitionGuard::new(3, 2);
        let stream = [1u32, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        for token in stream {
            assert!(!guard.push(token));
        }
    }
}
