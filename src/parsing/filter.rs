//! Core filtering logic and state machine implementation
//!
//! This module contains the main filter implementation that processes streaming
//! decoded text and extracts structured information.

use crate::parsing::action_filter::FilterAction;
use crate::parsing::options::FilterOptions;
use crate::parsing::types::{FilterMode, FilterOutput, FilterSearchQueryDelta, TokenIdsWithLogProb};
use std::collections::HashMap;

/// Core trait for streaming token parsers.
///
/// Implementations maintain internal state to handle partial tokens, partial
/// special-token markers, and mode transitions.
///
/// # Examples
///
/// ```rust
/// use cohere_stream_filter::parsing::{Filter, FilterOptions, new_filter};
/// use cohere_stream_filter::TokenIdsWithLogProb;
///
/// let options = FilterOptions::new();
/// let mut filter = new_filter(options);
///
/// let outputs = filter.write_decoded("Hello", TokenIdsWithLogProb::new());
/// let outputs = filter.write_decoded(" world", TokenIdsWithLogProb::new());
///
/// let final_outputs = filter.flush_partials();
/// ```
pub trait Filter {
    /// Process a decoded chunk of text and return any completed outputs.
    ///
    /// May return zero or more `FilterOutput` instances depending on what
    /// structured content is found.
    fn write_decoded(&mut self, decoded_token: &str, prob: TokenIdsWithLogProb) -> Vec<FilterOutput>;

    /// Flush any buffered partial outputs.
    ///
    /// Call this at the end of generation to emit any content that was
    /// buffered while waiting for a special token, a citation marker, or a
    /// complete JSON value to close out.
    fn flush_partials(&mut self) -> Vec<FilterOutput>;
}

/// Main implementation of the streaming filter state machine.
///
/// Users should not construct this directly; use [`crate::parsing::new_filter`].
#[allow(clippy::struct_excessive_bools)]
pub struct FilterImpl {
    // Trimming configuration
    pub(crate) left_trimmed: bool,
    pub(crate) right_trimmed: bool,
    pub(crate) trim_prefix: String,
    pub(crate) prefix_trim_pending: bool,

    // Mode and special token configuration
    pub(crate) default_mode: FilterMode,
    pub(crate) special_token_map: HashMap<String, FilterMode>,
    pub(crate) stream_non_grounded_answer: bool,
    pub(crate) stream_tool_actions: bool,
    pub(crate) stream_processed_params: bool,

    // Raw parameter parsing state
    pub(crate) raw_param_indent_length_removed: usize,
    pub(crate) saw_non_whitespace_in_current_line: bool,

    // Citation tracking
    pub(crate) cur_text_index: usize,
    pub(crate) cur_text_byte_index: usize,
    pub(crate) cur_citation_byte_index: Option<usize>,
    pub(crate) action_metadata: FilterAction,

    // Search query tracking
    pub(crate) curr_search_query_idx: usize,
    pub(crate) sent_curr_index: bool,

    // Format flags
    pub(crate) has_tool_call_id: bool,
    pub(crate) cmd3_citations: bool,
    pub(crate) llama_tool_parsing: bool,

    // Chunking configuration
    pub(crate) chunk_size: usize,
    pub(crate) num_tokens_in_chunk: usize,
    pub(crate) chunk_log_probs: TokenIdsWithLogProb,

    // Repetition guard configuration (applied by the ingress layer)
    pub(crate) max_repetition_limit: usize,
    pub(crate) max_repetition_sequence_length: usize,

    // Buffering state
    pub(crate) buf: Vec<u8>,
    pub(crate) partial_special_token_log_prob: TokenIdsWithLogProb,
    pub(crate) mode: FilterMode,
    pub(crate) done: bool,
}

impl FilterImpl {
    pub(crate) fn new() -> Self {
        Self {
            left_trimmed: false,
            right_trimmed: false,
            trim_prefix: String::new(),
            prefix_trim_pending: false,
            default_mode: FilterMode::PlainText,
            special_token_map: HashMap::new(),
            stream_non_grounded_answer: false,
            stream_tool_actions: false,
            stream_processed_params: false,
            raw_param_indent_length_removed: 0,
            saw_non_whitespace_in_current_line: false,
            cur_text_index: 0,
            cur_text_byte_index: 0,
            cur_citation_byte_index: None,
            action_metadata: FilterAction::new(),
            curr_search_query_idx: 0,
            sent_curr_index: false,
            has_tool_call_id: false,
            cmd3_citations: false,
            llama_tool_parsing: false,
            chunk_size: 1,
            num_tokens_in_chunk: 0,
            chunk_log_probs: TokenIdsWithLogProb::new(),
            max_repetition_limit: 0,
            max_repetition_sequence_length: 0,
            buf: Vec::new(),
            partial_special_token_log_prob: TokenIdsWithLogProb::new(),
            mode: FilterMode::PlainText,
            done: false,
        }
    }

    pub(crate) fn apply_options(self, options: FilterOptions) -> Self {
        let mut filter = self;
        options.apply_to_filter(&mut filter);
        filter.prefix_trim_pending = !filter.trim_prefix.is_empty();
        filter
    }

    /// Strip the configured prefix, if any, from the very start of the
    /// stream. Returns `true` once the prefix question is settled (matched
    /// and removed, or determined not to match) and normal processing may
    /// proceed on `self.buf`; `false` means the caller should keep buffering.
    ///
    /// When `left_trimmed` is also set, leading whitespace is skipped before
    /// looking for the prefix, so `with_left_trimmed().with_prefix_trim("X")`
    /// matches a prefix that itself follows incidental leading whitespace
    /// (e.g. a leading newline before the marker). A successful match
    /// consumes that whitespace too and clears `left_trimmed`, since there is
    /// nothing left for the ordinary trim pass to do.
    fn consume_prefix_trim(&mut self) -> bool {
        if !self.prefix_trim_pending {
            return true;
        }

        let Some(ws_end) = (if self.left_trimmed {
            self.buf.iter().position(|b| !b.is_ascii_whitespace())
        } else {
            Some(0)
        }) else {
            // Entirely whitespace so far; wait for more bytes before
            // deciding where the prefix would even start.
            return false;
        };

        let prefix = self.trim_prefix.as_bytes();
        let remaining = &self.buf[ws_end..];

        if remaining.len() >= prefix.len() {
            if remaining.starts_with(prefix) {
                self.buf.drain(..ws_end + prefix.len());
                self.left_trimmed = false;
            }
            self.prefix_trim_pending = false;
            return true;
        }

        if prefix.starts_with(remaining) {
            // Still a candidate prefix match; wait for more bytes.
            return false;
        }

        self.prefix_trim_pending = false;
        true
    }

    pub(crate) fn write_text(&mut self, text: &[u8], logprobs: TokenIdsWithLogProb) -> Vec<FilterOutput> {
        if self.done {
            return Vec::new();
        }

        self.buf.extend_from_slice(text);

        if !self.consume_prefix_trim() {
            return Vec::new();
        }

        let str = String::from_utf8_lossy(&self.buf).to_string();

        // If it's a partial special token, we need to wait for the next chunk.
        let (special_token_idx, found_seq) = find_partial(&str, &mut self.special_token_map.keys());
        if special_token_idx != usize::MAX && found_seq.is_empty() {
            self.partial_special_token_log_prob = logprobs;
            return Vec::new();
        }

        let mut out = Vec::new();

        // If it's a whole special token, change the mode, remove the marker, and continue.
        if special_token_idx != usize::MAX && !found_seq.is_empty() {
            let (o, new_mode, stop, valid_special) =
                self.handle_special_token(&str, special_token_idx, &found_seq, self.mode);
            out.extend(o);

            if valid_special {
                if stop {
                    self.buf.clear();
                    self.done = true;
                    return out;
                }

                let pre_special_token = &str[..special_token_idx];
                if !pre_special_token.is_empty() {
                    let partial_log_prob = std::mem::take(&mut self.partial_special_token_log_prob);
                    let (o, _) = self.handle_token(
                        self.mode,
                        pre_special_token.as_bytes(),
                        false,
                        &partial_log_prob,
                    );
                    self.partial_special_token_log_prob = partial_log_prob;
                    out.extend(o);
                }

                let remove_len = pre_special_token.len() + found_seq.len();
                self.buf.drain(..remove_len);

                self.mode = new_mode;
            }
        }

        if !self.buf.is_empty() {
            self.num_tokens_in_chunk += 1;
            self.chunk_log_probs.append(logprobs);

            if self.chunk_size > 1 && self.num_tokens_in_chunk < self.chunk_size {
                return out;
            }

            let (o, remove) = self.handle_token(
                self.mode,
                &self.buf.clone(),
                false,
                &self.chunk_log_probs.clone(),
            );
            out.extend(o);
            self.buf.drain(..remove);
            self.num_tokens_in_chunk = 0;
            self.chunk_log_probs = TokenIdsWithLogProb::new();
        }

        out
    }

    fn handle_token(
        &mut self,
        mode: FilterMode,
        bstr: &[u8],
        after_last_token: bool,
        token_log_probs: &TokenIdsWithLogProb,
    ) -> (Vec<FilterOutput>, usize) {
        match mode {
            FilterMode::InclusiveStop | FilterMode::ExclusiveStop => {
                log::error!("in stop mode but we should have already stopped");
                (Vec::new(), 0)
            }
            FilterMode::Ignore | FilterMode::NextSearchQuery => (Vec::new(), 0),
            FilterMode::ToolAction => {
                let s = String::from_utf8_lossy(bstr);
                self.parse_actions(&s)
            }
            FilterMode::GroundedAnswer | FilterMode::ToolReason => {
                self.process_grounded_text(bstr, after_last_token, mode, Some(token_log_probs))
            }
            FilterMode::SearchQuery => self.process_search_query(bstr),
            FilterMode::Answer => {
                if self.stream_non_grounded_answer {
                    self.process_text(bstr, Some(token_log_probs))
                } else {
                    (Vec::new(), bstr.len())
                }
            }
            FilterMode::PlainText => self.process_text(bstr, Some(token_log_probs)),
        }
    }

    fn handle_special_token(
        &mut self,
        s: &str,
        idx: usize,
        token: &str,
        cur_mode: FilterMode,
    ) -> (Vec<FilterOutput>, FilterMode, bool, bool) {
        let new_mode = self
            .special_token_map
            .get(token)
            .copied()
            .unwrap_or(FilterMode::PlainText);

        // Disable mode change if already in an answer mode and we see "Answer:" again.
        let not_special =
            (cur_mode == FilterMode::GroundedAnswer || cur_mode == FilterMode::Answer)
                && new_mode == FilterMode::Answer;

        if not_special {
            return (Vec::new(), cur_mode, false, false);
        }

        match new_mode {
            FilterMode::InclusiveStop => {
                let out = self.handle_inclusive_stop(s, idx, token);
                (out, new_mode, true, true)
            }
            FilterMode::ExclusiveStop => {
                let out = self.handle_exclusive_stop(s, idx);
                (out, new_mode, true, true)
            }
            FilterMode::GroundedAnswer => {
                self.cur_text_index = 0;
                if self.stream_non_grounded_answer {
                    self.left_trimmed = true;
                }
                (Vec::new(), new_mode, false, true)
            }
            FilterMode::ToolReason => {
                self.left_trimmed = true;
                self.right_trimmed = true;
                (Vec::new(), new_mode, false, true)
            }
            FilterMode::Answer | FilterMode::SearchQuery => {
                self.left_trimmed = true;
                (Vec::new(), new_mode, false, true)
            }
            FilterMode::NextSearchQuery => {
                self.left_trimmed = true;
                if self.sent_curr_index {
                    self.curr_search_query_idx += 1;
                    self.sent_curr_index = false;
                }
                (Vec::new(), FilterMode::SearchQuery, false, true)
            }
            _ => (Vec::new(), new_mode, false, true),
        }
    }

    pub(crate) fn handle_inclusive_stop(&self, s: &str, idx: usize, token: &str) -> Vec<FilterOutput> {
        if idx != usize::MAX && !s[..idx + token.len()].is_empty() {
            let text = if let Some(start_idx) = self.cur_citation_byte_index {
                s[start_idx..idx + token.len()].to_string()
            } else {
                s[..idx + token.len()].to_string()
            };

            return vec![FilterOutput {
                text,
                ..Default::default()
            }];
        }
        Vec::new()
    }

    pub(crate) fn handle_exclusive_stop(&mut self, s: &str, idx: usize) -> Vec<FilterOutput> {
        if idx != usize::MAX && !s[..idx].is_empty() {
            let text = if let Some(start_idx) = self.cur_citation_byte_index {
                let (trimmed, _) = self.trim_space(&s[start_idx..idx]);
                trimmed
            } else {
                let (trimmed, _) = self.trim_space(&s[..idx]);
                trimmed
            };

            return vec![FilterOutput {
                text,
                ..Default::default()
            }];
        }
        Vec::new()
    }

    pub(crate) fn utf8_valid_or_limit(bstr: &[u8]) -> bool {
        let limit = 4; // a UTF-8 sequence is at most 4 bytes
        let valid = std::str::from_utf8(bstr).is_ok();
        if bstr.len() >= limit && !valid {
            log::warn!("emitting invalid utf8: {bstr:?}");
        }
        valid || bstr.len() >= limit
    }

    pub(crate) fn process_search_query(&mut self, bstr: &[u8]) -> (Vec<FilterOutput>, usize) {
        if !Self::utf8_valid_or_limit(bstr) {
            return (Vec::new(), 0);
        }

        let s = String::from_utf8_lossy(bstr);
        let (send, rem_right) = self.trim_space(&s);
        let mut out = Vec::new();

        if !send.is_empty() {
            out.push(FilterOutput {
                search_query: Some(FilterSearchQueryDelta {
                    index: self.curr_search_query_idx,
                    text: send,
                }),
                ..Default::default()
            });
            self.sent_curr_index = true;
        }

        (out, bstr.len() - rem_right)
    }

    pub(crate) fn process_text(
        &mut self,
        bstr: &[u8],
        token_log_probs: Option<&TokenIdsWithLogProb>,
    ) -> (Vec<FilterOutput>, usize) {
        if !Self::utf8_valid_or_limit(bstr) {
            return (Vec::new(), 0);
        }

        let s = String::from_utf8_lossy(bstr);
        let (send, rem_right) = self.trim_space(&s);
        let mut out = Vec::new();

        if !send.is_empty() {
            let mut output = FilterOutput {
                text: send,
                ..Default::default()
            };
            if let Some(probs) = token_log_probs {
                output.logprobs = probs.clone();
            }
            out.push(output);
        }

        (out, bstr.len() - rem_right)
    }

    /// The `(limit, max_sequence_length)` repetition-guard configuration
    /// applied via `FilterOptions::with_repetition_limit`, consumed by the
    /// ingress layer to construct its guard.
    pub(crate) fn repetition_limit_config(&self) -> (usize, usize) {
        (self.max_repetition_limit, self.max_repetition_sequence_length)
    }

    pub(crate) fn trim_space(&mut self, s: &str) -> (String, usize) {
        let mut result = s.to_string();
        let mut rem = 0;

        if self.right_trimmed {
            rem = result.len();
            result = result.trim_end().to_string();
            rem -= result.len();
        }

        if self.left_trimmed {
            result = result.trim_start().to_string();
            if !result.is_empty() {
                self.left_trimmed = false;
            }
        }

        (result, rem)
    }
}

impl Filter for FilterImpl {
    fn write_decoded(&mut self, decoded_token: &str, l: TokenIdsWithLogProb) -> Vec<FilterOutput> {
        self.write_text(decoded_token.as_bytes(), l)
    }

    fn flush_partials(&mut self) -> Vec<FilterOutput> {
        if self.done {
            return Vec::new();
        }
        self.done = true;
        if !self.buf.is_empty()
            && self.mode != FilterMode::InclusiveStop
            && self.mode != FilterMode::ExclusiveStop
        {
            let buf_copy = std::mem::take(&mut self.buf);
            let log_prob_copy = std::mem::take(&mut self.partial_special_token_log_prob);
            let (o, _remove) = self.handle_token(self.mode, &buf_copy, true, &log_prob_copy);
            return o;
        }
        Vec::new()
    }
}

/// Finds the earliest whole or partial occurrence of any `stops` entry at the
/// end of `s`.
///
/// Returns `(index, "")` when a suffix of `s` is a strict prefix of some stop
/// (a partial match still spanning the chunk boundary), `(index, stop)` when
/// a stop is found in full, or `(usize::MAX, "")` when no stop is present at
/// all.
pub(crate) fn find_partial<'a>(s: &str, stops: impl Iterator<Item = &'a String>) -> (usize, String) {
    let mut min_idx = usize::MAX;

    for stop in stops {
        if let Some(idx) = s.find(stop) {
            return (idx, stop.clone());
        }

        for i in 0..s.len() {
            let suffix = if stop.len() > s.len() - i {
                &stop[..s.len() - i]
            } else {
                stop
            };

            if s.ends_with(suffix) {
                let idx = s.len() - suffix.len();
                if min_idx == usize::MAX || min_idx > idx {
                    min_idx = idx;
                }
                break;
            }
        }
    }

    (min_idx, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_partial() {
        let stops = vec!["<co: ".to_string(), "</co: ".to_string()];

        let (idx, found) = find_partial("hello <co: ", stops.iter());
        assert_eq!(idx, 6);
        assert_eq!(found, "<co: ");

        let (idx, found) = find_partial("hello <c", stops.iter());
        assert_eq!(idx, 6);
        assert_eq!(found, "");

        let (idx, _) = find_partial("hello world", stops.iter());
        assert_eq!(idx, usize::MAX);
    }

    #[test]
    fn prefix_trim_strips_configured_prefix_once() {
        let mut filter = FilterImpl::new();
        filter.trim_prefix = "<|BOS|>".to_string();
        filter.prefix_trim_pending = true;

        let out = filter.write_decoded("<|BOS|>Hello", Default::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Hello");
    }

    #[test]
    fn prefix_trim_buffers_across_chunk_boundary() {
        let mut filter = FilterImpl::new();
        filter.trim_prefix = "<|BOS|>".to_string();
        filter.prefix_trim_pending = true;

        let out = filter.write_decoded("<|BOS", Default::default());
        assert!(out.is_empty());
        let out = filter.write_decoded("|>Hello", Default::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Hello");
    }

    #[test]
    fn prefix_trim_gives_up_when_stream_does_not_match() {
        let mut filter = FilterImpl::new();
        filter.trim_prefix = "<|BOS|>".to_string();
        filter.prefix_trim_pending = true;

        let out = filter.write_decoded("nope", Default::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "nope");
    }

    #[test]
    fn prefix_trim_skips_leading_whitespace_when_left_trimmed() {
        let mut filter = FilterImpl::new();
        filter.trim_prefix = "Concept: ".to_string();
        filter.prefix_trim_pending = true;
        filter.left_trimmed = true;

        let out = filter.write_decoded("\nConcept: foo bar baz boo\n", Default::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "foo bar baz boo\n");
    }
}
