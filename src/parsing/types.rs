//! Type definitions for the parsing library
//!
//! This module contains all the core data structures used throughout the library,
//! including output types, configuration enums, and helper structures.

use serde::Deserialize;

/// Token ids paired with their log probabilities.
///
/// This structure tracks both the token identifiers and their associated log
/// probability scores from the language model.
///
/// # Examples
///
/// ```rust
/// use cohere_stream_filter::TokenIdsWithLogProb;
///
/// let mut logprobs = TokenIdsWithLogProb::new();
/// assert!(logprobs.token_ids.is_empty());
///
/// let other = TokenIdsWithLogProb {
///     token_ids: vec![1, 2, 3],
///     logprobs: vec![-0.1, -0.2, -0.3],
/// };
/// logprobs.append(other);
/// assert_eq!(logprobs.token_ids.len(), 3);
/// ```
#[derive(Default, Debug, Clone, PartialEq)]
pub struct TokenIdsWithLogProb {
    /// Token ids from the model's vocabulary.
    pub token_ids: Vec<u32>,
    /// Log probability scores for each token (same length as `token_ids`).
    pub logprobs: Vec<f32>,
}

impl TokenIdsWithLogProb {
    /// Creates a new empty `TokenIdsWithLogProb`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ids: Vec::new(),
            logprobs: Vec::new(),
        }
    }

    /// Appends another `TokenIdsWithLogProb`, extending both vectors.
    pub fn append(&mut self, other: TokenIdsWithLogProb) {
        self.token_ids.extend(other.token_ids);
        self.logprobs.extend(other.logprobs);
    }
}

/// A parsed output chunk from the streaming filter.
///
/// Each call to `write_decoded` (or `write`) may produce zero or more
/// `FilterOutput` instances, depending on what structured content is found
/// in the token stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOutput {
    /// Plain text content extracted from the token stream.
    pub text: String,
    /// Token ids and log probabilities for this output chunk.
    pub logprobs: TokenIdsWithLogProb,
    /// Incremental search query delta, if parsing search queries.
    pub search_query: Option<FilterSearchQueryDelta>,
    /// Citations parsed from this chunk (may be empty).
    pub citations: Vec<FilterCitation>,
    /// Incremental tool call delta, if in tool action mode.
    pub tool_calls: Option<FilterToolCallDelta>,
    /// True if this content appears after an "Answer:" marker.
    pub is_post_answer: bool,
    /// True if this content is from a thinking/reasoning block.
    pub is_tools_reason: bool,
}

/// An incremental update to a search query being parsed.
///
/// Multiple deltas with the same `index` should be concatenated to build the
/// full query text.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSearchQueryDelta {
    /// Index of the search query (0-based, for multi-query scenarios).
    pub index: usize,
    /// Incremental text for this search query.
    pub text: String,
}

/// An incremental update to a tool call being parsed.
///
/// Exactly one of `id`, `name`, `param_delta`, and `raw_param_delta` is
/// populated per delta; callers should merge successive deltas sharing the
/// same `index` to reconstruct the full tool call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterToolCallDelta {
    /// Index of this tool call (0-based).
    pub index: usize,
    /// Tool call identifier chunk (CMD3+ formats only).
    pub id: Option<String>,
    /// Tool name chunk.
    pub name: Option<String>,
    /// Structured parameter delta, if `stream_processed_params` is enabled.
    pub param_delta: Option<FilterToolParameter>,
    /// Raw JSON parameter text chunk, if `stream_processed_params` is disabled.
    pub raw_param_delta: Option<String>,
}

/// A parsed tool parameter update.
///
/// When `stream_processed_params` is enabled, parameters are parsed into
/// name/value pairs and the value is streamed incrementally as `value_delta`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterToolParameter {
    /// Parameter name.
    pub name: String,
    /// Incremental parameter value (may be partial JSON).
    pub value_delta: String,
}

/// A citation parsed from the model output with source attribution.
///
/// # Format Support
///
/// - **Legacy format**: `<co: 1,2>text</co: 1,2>` (single tool call, multiple results)
/// - **CMD3+ format**: `<co>text</co: 0:[1,2],1:[0]>` (multiple tool calls with result indices)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterCitation {
    /// Unicode scalar index where the citation starts in the overall text output.
    pub start_index: usize,
    /// Unicode scalar index where the citation ends (exclusive).
    pub end_index: usize,
    /// The actual cited text content.
    pub text: String,
    /// Source documents/results that ground this citation.
    pub sources: Vec<Source>,
    /// True if this citation appears in a thinking/reasoning block.
    pub is_thinking: bool,
}

/// Source attribution for a citation.
///
/// Identifies which tool call and which specific results from that tool call
/// are being cited.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Source {
    /// Index of the tool call that produced these results.
    pub tool_call_index: usize,
    /// Indices of specific results from this tool call.
    pub tool_result_indices: Vec<usize>,
}

/// Parsing mode for the filter state machine.
///
/// The filter transitions between these modes based on special tokens
/// encountered in the stream; each mode determines how subsequent bytes are
/// processed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FilterMode {
    /// Output all text without special processing.
    PlainText,
    /// Discard all tokens (no output).
    Ignore,
    /// Parse tool calls from JSON-formatted action blocks.
    ToolAction,
    /// Parse thinking/reasoning blocks (citations still tracked).
    ToolReason,
    /// Parse non-grounded answer text.
    Answer,
    /// Parse grounded answer text with citation extraction.
    GroundedAnswer,
    /// Stop parsing; include the stop token in the final output.
    InclusiveStop,
    /// Stop parsing; exclude the stop token from the final output.
    ExclusiveStop,
    /// Parse search query content.
    SearchQuery,
    /// Transition marker between successive search queries.
    NextSearchQuery,
}
