#![warn(missing_docs)]
//! A streaming parser for Cohere-family model token output.
//!
//! This library consumes tokens (or token ids, via a pluggable detokenizer) as a
//! language model generates them and incrementally extracts structured content:
//! citations with source attribution, tool calls and their parameters, search
//! queries, reasoning/thinking blocks, and plain answer text.
//!
//! # Overview
//!
//! The filter is a state machine that processes decoded text chunk by chunk and
//! emits zero or more [`FilterOutput`] values per chunk. It never buffers the
//! whole generation in memory; only as much as is needed to recognize a special
//! token, a citation marker, or a JSON value boundary that may span chunks.
//!
//! # Quick Start
//!
//! ```rust
//! use cohere_stream_filter::parsing::{FilterOptions, new_filter, Filter};
//!
//! let options = FilterOptions::new().cmd3();
//! let mut filter = new_filter(options);
//!
//! let outputs = filter.write_decoded("<|START_RESPONSE|>Hello", Default::default());
//! for output in outputs {
//!     println!("text: {}", output.text);
//! }
//!
//! let final_outputs = filter.flush_partials();
//! ```
//!
//! To drive the filter from raw token ids instead of pre-decoded text, wrap it
//! in [`parsing::ingress::IngressFilter`] with a [`detokenizer::Detokenizer`]
//! implementation, or use [`stream::StreamFilter`] to run the filter on a
//! dedicated worker thread.
//!
//! # Architecture
//!
//! - [`parsing::FilterImpl`]: the mode/citation/action/parameter state machine
//! - [`parsing::types::FilterMode`]: the modes the machine can be in
//! - [`parsing::FilterOptions`]: builder for configuring a filter instance
//! - [`parsing::types::FilterOutput`]: structured output emitted per chunk
//! - [`parsing::ingress::IngressFilter`]: token-id ingress, detokenization, repetition guard
//! - [`stream::StreamFilter`]: a bounded-channel worker-thread wrapper

/// Error types for this library.
pub mod errors;

/// The detokenizer capability the ingress layer depends on.
pub mod detokenizer;

/// Parsing module for token stream processing and filtering.
///
/// Contains the filter implementation, options, and types for processing
/// Cohere model outputs with support for citations, tool calls, and other
/// structured content.
pub mod parsing;

/// Threaded, bounded-channel wrapper around a filter.
pub mod stream;

pub use detokenizer::Detokenizer;
pub use errors::MelodyError;
pub use parsing::types::{
    FilterCitation, FilterMode, FilterOutput, FilterSearchQueryDelta, FilterToolCallDelta,
    FilterToolParameter, Source, TokenIdsWithLogProb,
};
pub use parsing::{Filter, FilterOptions, new_filter};

#[cfg(test)]
mod tests;
