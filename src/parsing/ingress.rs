//! Token-ingress layer
//!
//! Bridges raw token ids (as produced by a model's sampler) to the filter's
//! decoded-text interface. Owns the detokenizer, buffers token ids until they
//! decode to a complete (non-partial) UTF-8 string, and runs the repetition
//! guard before handing decoded text to the mode machine.

use crate::detokenizer::Detokenizer;
use crate::errors::MelodyError;
use crate::parsing::filter::{Filter, FilterImpl};
use crate::parsing::repetition::RepetitionGuard;
use crate::parsing::types::{FilterOutput, TokenIdsWithLogProb};

/// Wraps a [`FilterImpl`] with a [`Detokenizer`], turning a stream of token
/// ids into a stream of [`FilterOutput`].
///
/// This is the only place in the crate that holds a detokenizer or sees raw
/// token ids directly; the mode/citation/action/parameter parsers only ever
/// see decoded text.
pub struct IngressFilter<D: Detokenizer> {
    filter: FilterImpl,
    detokenizer: D,
    pending_ids: Vec<u32>,
    pending_logprobs: Vec<f32>,
    raw_tokens: Vec<u32>,
    repetition: RepetitionGuard,
}

impl<D: Detokenizer> IngressFilter<D> {
    /// Wraps `filter` with `detokenizer`. The repetition guard is configured
    /// from whatever `with_repetition_limit` was applied to the
    /// [`crate::parsing::FilterOptions`] that produced `filter`.
    #[must_use]
    pub fn new(filter: FilterImpl, detokenizer: D) -> Self {
        let (limit, max_sequence_length) = filter.repetition_limit_config();
        Self {
            filter,
            detokenizer,
            pending_ids: Vec::new(),
            pending_logprobs: Vec::new(),
            raw_tokens: Vec::new(),
            repetition: RepetitionGuard::new(limit, max_sequence_length),
        }
    }

    /// Feed a single token id (with its optional log probability) into the
    /// filter.
    ///
    /// Buffers the id alongside any prior undecoded ids and attempts to
    /// decode; if the decoded text ends in `U+FFFD` the id is assumed to be
    /// part of a multi-byte UTF-8 sequence split across tokens and decoding
    /// is retried once more ids arrive. On a successful decode the repetition
    /// guard runs before dispatch; a tripped guard yields `Err` without
    /// dispatching the decoded text (the token is still recorded in
    /// [`Self::raw_tokens`]).
    pub fn write(
        &mut self,
        token_id: u32,
        logprob: Option<f32>,
    ) -> Result<Vec<FilterOutput>, MelodyError> {
        self.raw_tokens.push(token_id);
        self.pending_ids.push(token_id);
        if let Some(lp) = logprob {
            self.pending_logprobs.push(lp);
        }

        let decoded = self
            .detokenizer
            .decode(&self.pending_ids, false)
            .map_err(|e| MelodyError::Detokenization(e.to_string()))?;

        if decoded.ends_with('\u{FFFD}') {
            return Ok(Vec::new());
        }

        let provenance = TokenIdsWithLogProb {
            token_ids: std::mem::take(&mut self.pending_ids),
            logprobs: std::mem::take(&mut self.pending_logprobs),
        };

        if self.repetition.push(token_id) {
            return Err(MelodyError::RepetitionLimitExceeded {
                limit: self.repetition.limit(),
                max_sequence_length: self.repetition.max_sequence_length(),
            });
        }

        Ok(self.filter.write_decoded(&decoded, provenance))
    }

    /// Feed already-decoded text directly, bypassing the detokenizer. Cannot
    /// fail since no decode is attempted.
    pub fn write_decoded(&mut self, decoded: &str, provenance: TokenIdsWithLogProb) -> Vec<FilterOutput> {
        self.filter.write_decoded(decoded, provenance)
    }

    /// Flush any buffered partial output. A trailing undecoded multi-byte
    /// sequence (if any) is not recovered by this call; it remains visible
    /// only through [`Self::raw_tokens`].
    pub fn flush_partials(&mut self) -> Vec<FilterOutput> {
        self.filter.flush_partials()
    }

    /// Every token id ever passed to [`Self::write`], in call order.
    #[must_use]
    pub fn raw_tokens(&self) -> &[u32] {
        &self.raw_tokens
    }
}
