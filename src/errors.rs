//! Errors
//!
//! This module documents the errors that can occur in this library.

use thiserror::Error;

/// Errors that can occur while ingesting or decoding a token stream.
#[derive(Error, Debug)]
pub enum MelodyError {
    /// The caller supplied something the filter cannot process, e.g. a
    /// negative or out-of-range token id handed to a detokenizer.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The repetition guard detected `limit` identical consecutive windows
    /// of length `max_sequence_length` and halted ingestion.
    #[error(
        "repetition limit exceeded: {limit} repeats of a {max_sequence_length}-token sequence"
    )]
    RepetitionLimitExceeded {
        /// Number of identical windows observed before the guard tripped.
        limit: usize,
        /// Length, in tokens, of the window being compared.
        max_sequence_length: usize,
    },

    /// The configured detokenizer failed to decode a token id sequence.
    #[error("detokenization error: {0}")]
    Detokenization(String),
}
