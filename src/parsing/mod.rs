//! Parsing module for token stream processing and filtering.
//!
//! This module provides the core functionality for parsing and filtering
//! streamed Cohere model output, with support for citations, tool calls, and
//! other structured content.

mod action_filter;
mod citations_filter;
mod filter;
/// Token-ingress layer: bridges raw token ids to decoded text.
pub mod ingress;
mod options;
mod param_filter;
mod repetition;

/// Type definitions for filter outputs, citations, and tool calls.
pub mod types;

pub use filter::{Filter, FilterImpl};
pub use options::{FilterOptions, new_filter};
