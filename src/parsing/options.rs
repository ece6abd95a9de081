//! Configuration options for creating filters
//!
//! This module provides the `FilterOptions` builder for configuring filter behavior.

use crate::parsing::filter::FilterImpl;
use crate::parsing::types::FilterMode;
use std::collections::HashMap;

/// Configuration builder for creating filters.
///
/// Uses the builder pattern to configure filter behavior before creating a
/// [`FilterImpl`]. Supports preset configurations for the various Cohere
/// model output formats (RAG, multi-hop, Command 3, Command 4, Llama, search
/// query) as well as fine-grained control over trimming, stop sequences,
/// chunking, and repetition guarding.
///
/// # Examples
///
/// ```rust
/// use cohere_stream_filter::parsing::FilterOptions;
/// use cohere_stream_filter::parsing::new_filter;
///
/// let options = FilterOptions::new().cmd3();
/// let filter = new_filter(options);
/// ```
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct FilterOptions {
    pub(crate) left_trimmed: bool,
    pub(crate) right_trimmed: bool,
    pub(crate) trim_prefix: String,
    pub(crate) inclusive_stops: Vec<String>,
    pub(crate) exclusive_stops: Vec<String>,
    pub(crate) chunk_size: usize,
    pub(crate) repetition_limit: usize,
    pub(crate) max_sequence_length: usize,
    pub(crate) special_token_map: HashMap<String, FilterMode>,
    pub(crate) default_mode: FilterMode,
    pub(crate) stream_non_grounded_answer: bool,
    pub(crate) stream_tool_actions: bool,
    pub(crate) stream_processed_params: bool,
    pub(crate) has_tool_call_id: bool,
    pub(crate) cmd3_citations: bool,
    pub(crate) llama_tool_parsing: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            left_trimmed: false,
            right_trimmed: false,
            trim_prefix: String::new(),
            inclusive_stops: Vec::new(),
            exclusive_stops: Vec::new(),
            chunk_size: 1,
            repetition_limit: 0,
            max_sequence_length: 0,
            special_token_map: HashMap::new(),
            default_mode: FilterMode::PlainText,
            stream_non_grounded_answer: false,
            stream_tool_actions: false,
            stream_processed_params: false,
            has_tool_call_id: false,
            cmd3_citations: false,
            llama_tool_parsing: false,
        }
    }
}

impl FilterOptions {
    /// Creates a new `FilterOptions` with default settings.
    ///
    /// Default configuration: no trimming, no prefix trim, no stop sequences,
    /// chunk size of 1, plain text mode, no repetition guard, and no
    /// streaming of tool actions or parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // PRESETS

    /// Configure for Cohere Command 3 model format.
    ///
    /// Command 3 uses special tokens to delimit sections of the response:
    /// `<|START_RESPONSE|>`/`<|END_RESPONSE|>` for the grounded answer,
    /// `<|START_THINKING|>`/`<|END_THINKING|>` for a reasoning block, and
    /// `<|START_ACTION|>`/`<|END_ACTION|>` for tool calls.
    ///
    /// Enables right trimming, tool call ids, and Command-3-style citations
    /// (`<co>...</co: idx:[i,i],...>`). Does not itself enable streaming of
    /// tool actions or parameters; combine with [`Self::stream_tool_actions`]
    /// and [`Self::stream_processed_params`] as needed.
    #[must_use]
    pub fn cmd3(mut self) -> Self {
        self.default_mode = FilterMode::GroundedAnswer;
        self.right_trimmed = true;
        self.has_tool_call_id = true;
        self.cmd3_citations = true;
        self.special_token_map
            .insert("<|START_RESPONSE|>".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("<|END_RESPONSE|>".to_string(), FilterMode::Ignore);
        self.special_token_map
            .insert("<|START_THINKING|>".to_string(), FilterMode::ToolReason);
        self.special_token_map
            .insert("<|END_THINKING|>".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("<|START_ACTION|>".to_string(), FilterMode::ToolAction);
        self.special_token_map
            .insert("<|END_ACTION|>".to_string(), FilterMode::Ignore);
        self
    }

    /// Configure for Cohere Command 4 model format.
    ///
    /// Identical to [`Self::cmd3`] except the grounded answer is delimited by
    /// `<|START_TEXT|>`/`<|END_TEXT|>` rather than `START_RESPONSE`/`END_RESPONSE`.
    #[must_use]
    pub fn cmd4(mut self) -> Self {
        self.default_mode = FilterMode::GroundedAnswer;
        self.right_trimmed = true;
        self.has_tool_call_id = true;
        self.cmd3_citations = true;
        self.special_token_map
            .insert("<|START_TEXT|>".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("<|END_TEXT|>".to_string(), FilterMode::Ignore);
        self.special_token_map
            .insert("<|START_THINKING|>".to_string(), FilterMode::ToolReason);
        self.special_token_map
            .insert("<|END_THINKING|>".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("<|START_ACTION|>".to_string(), FilterMode::ToolAction);
        self.special_token_map
            .insert("<|END_ACTION|>".to_string(), FilterMode::Ignore);
        self
    }

    /// Configure for the Llama tool-calling format.
    ///
    /// Llama emits a JSON tool call immediately after `<|python_tag|>` with no
    /// tool call id and a `"name"` key (rather than `"tool_name"`); a blank
    /// line (`"\n\n"`) begins grounded-answer text, and `<eom_id>` is an
    /// exclusive stop.
    #[must_use]
    pub fn llama(mut self) -> Self {
        self.default_mode = FilterMode::GroundedAnswer;
        self.right_trimmed = true;
        self.llama_tool_parsing = true;
        self.special_token_map
            .insert("\n\n".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("<|python_tag|>".to_string(), FilterMode::ToolAction);
        self.special_token_map
            .insert("<eom_id>".to_string(), FilterMode::ExclusiveStop);
        self
    }

    /// Configure for RAG (Retrieval Augmented Generation) format.
    ///
    /// Older RAG-style outputs use text markers like `"Grounded answer:"` and
    /// `"Answer:"` to delimit sections. Enables right trimming and a default
    /// mode of `Ignore`, since content only appears after a marker.
    #[must_use]
    pub fn handle_rag(mut self) -> Self {
        self.default_mode = FilterMode::Ignore;
        self.right_trimmed = true;
        self.special_token_map
            .insert("Grounded answer:".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("Answer:".to_string(), FilterMode::Answer);
        self
    }

    /// Configure for search query parsing format.
    ///
    /// Search queries appear after a `"Search:"` marker and are separated by
    /// `"|||"` or a newline for multi-query scenarios. Default mode is
    /// `Ignore`, emitting only search query deltas.
    #[must_use]
    pub fn handle_search_query(mut self) -> Self {
        self.default_mode = FilterMode::Ignore;
        self.right_trimmed = true;
        self.special_token_map
            .insert("Search:".to_string(), FilterMode::SearchQuery);
        self.special_token_map
            .insert("|||".to_string(), FilterMode::NextSearchQuery);
        self.special_token_map
            .insert("\n".to_string(), FilterMode::NextSearchQuery);
        self
    }

    /// Configure for the legacy multi-hop reasoning format.
    ///
    /// Multi-hop uses text markers to delimit planning (`"Plan:"`,
    /// `"Reflection:"`), tool calls (`"Action:"`), document listings
    /// (filtered out), and the final answer (`"Grounded answer:"`,
    /// `"Answer:"`).
    #[must_use]
    pub fn handle_multi_hop(mut self) -> Self {
        self.default_mode = FilterMode::Ignore;
        self.right_trimmed = true;
        self.special_token_map
            .insert("Grounded answer:".to_string(), FilterMode::GroundedAnswer);
        self.special_token_map
            .insert("Answer:".to_string(), FilterMode::Answer);
        self.special_token_map
            .insert("Plan:".to_string(), FilterMode::ToolReason);
        self.special_token_map
            .insert("Reflection:".to_string(), FilterMode::ToolReason);
        self.special_token_map
            .insert("Action:".to_string(), FilterMode::ToolAction);
        self.special_token_map
            .insert("Relevant Documents:".to_string(), FilterMode::Ignore);
        self.special_token_map
            .insert("Cited Documents:".to_string(), FilterMode::Ignore);
        self
    }

    // FINE-GRAINED OPTIONS

    /// Add inclusive stop sequences: parsing halts on these, and the stop
    /// sequence itself is included in the final output.
    #[must_use]
    pub fn with_inclusive_stops(mut self, stops: Vec<String>) -> Self {
        self.inclusive_stops = stops;
        self
    }

    /// Add exclusive stop sequences: parsing halts on these, and the stop
    /// sequence is excluded from the final output.
    #[must_use]
    pub fn with_exclusive_stops(mut self, stops: Vec<String>) -> Self {
        self.exclusive_stops = stops;
        self
    }

    /// Enable left trimming of whitespace from the first non-empty output.
    #[must_use]
    pub fn with_left_trimmed(mut self) -> Self {
        self.left_trimmed = true;
        self
    }

    /// Enable right trimming of trailing whitespace from text outputs.
    #[must_use]
    pub fn with_right_trimmed(mut self) -> Self {
        self.right_trimmed = true;
        self
    }

    /// Strip a literal prefix from the very start of the stream before any
    /// other processing sees it.
    #[must_use]
    pub fn with_prefix_trim(mut self, prefix: impl Into<String>) -> Self {
        self.trim_prefix = prefix.into();
        self
    }

    /// Set the chunk size for output batching: the number of decoded tokens
    /// to accumulate before running them through the mode machine. A chunk
    /// size of 1 streams every token as it arrives.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Enable the repetition guard: if `limit` consecutive, non-overlapping
    /// windows of `max_sequence_length` tokens are all identical, ingestion
    /// is halted with [`crate::errors::MelodyError::RepetitionLimitExceeded`].
    /// Passing `0` for either parameter disables the guard.
    #[must_use]
    pub fn with_repetition_limit(mut self, limit: usize, max_sequence_length: usize) -> Self {
        self.repetition_limit = limit;
        self.max_sequence_length = max_sequence_length;
        self
    }

    /// Enable streaming of non-grounded answer content (text in `"Answer:"`
    /// sections with no citation support).
    #[must_use]
    pub fn stream_non_grounded_answer(mut self) -> Self {
        self.stream_non_grounded_answer = true;
        self
    }

    /// Enable streaming of tool action content: tool calls are parsed and
    /// streamed as `FilterOutput.tool_calls` incremental updates.
    #[must_use]
    pub fn stream_tool_actions(mut self) -> Self {
        self.stream_tool_actions = true;
        self
    }

    /// Enable streaming of processed (parsed) tool parameters as structured
    /// name/value deltas, instead of raw JSON parameter text.
    #[must_use]
    pub fn stream_processed_params(mut self) -> Self {
        self.stream_processed_params = true;
        self
    }

    /// Remove a special token from the token map, preventing it from
    /// triggering a mode transition.
    #[must_use]
    pub fn remove_token(mut self, token: &str) -> Self {
        self.special_token_map.remove(token);
        self
    }

    pub(crate) fn apply_to_filter(self, filter: &mut FilterImpl) {
        filter.left_trimmed = self.left_trimmed;
        filter.right_trimmed = self.right_trimmed;
        filter.trim_prefix = self.trim_prefix;
        filter.chunk_size = self.chunk_size;
        filter.max_repetition_limit = self.repetition_limit;
        filter.max_repetition_sequence_length = self.max_sequence_length;
        filter.stream_non_grounded_answer = self.stream_non_grounded_answer;
        filter.stream_tool_actions = self.stream_tool_actions;
        filter.stream_processed_params = self.stream_processed_params;
        filter.has_tool_call_id = self.has_tool_call_id;
        filter.cmd3_citations = self.cmd3_citations;
        filter.llama_tool_parsing = self.llama_tool_parsing;
        filter.default_mode = self.default_mode;
        filter.mode = self.default_mode;

        for (token, mode) in self.special_token_map {
            filter.special_token_map.insert(token, mode);
        }

        for stop in self.inclusive_stops {
            filter
                .special_token_map
                .insert(stop, FilterMode::InclusiveStop);
        }

        for stop in self.exclusive_stops {
            filter
                .special_token_map
                .insert(stop, FilterMode::ExclusiveStop);
        }
    }
}

/// Creates a new filter configured by `options`.
#[must_use]
pub fn new_filter(options: FilterOptions) -> FilterImpl {
    FilterImpl::new().apply_options(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::filter::Filter;

    #[test]
    fn cmd3_preset_does_not_auto_stream_tool_actions() {
        let filter = new_filter(FilterOptions::new().cmd3());
        assert!(!filter.stream_tool_actions);
    }

    #[test]
    fn llama_preset_configures_python_tag_and_eom() {
        let mut filter = new_filter(FilterOptions::new().llama());
        assert!(filter.llama_tool_parsing);
        let out = filter.write_decoded("<eom_id>", Default::default());
        assert!(out.is_empty() || out[0].text.is_empty());
    }

    #[test]
    fn remove_token_drops_a_preset_marker() {
        let filter = new_filter(FilterOptions::new().cmd3().remove_token("<|START_ACTION|>"));
        assert!(!filter.special_token_map.contains_key("<|START_ACTION|>"));
    }
}
