//! The detokenizer capability.
//!
//! The ingress layer (`parsing::ingress`) turns token ids into text by calling
//! through this trait. The core filter never touches a tokenizer directly;
//! callers supply whatever backs their model (an HTTP call to an inference
//! server, an in-process `HuggingFace` tokenizer, a test double, etc).

use crate::errors::MelodyError;

/// Decodes token ids into text.
///
/// Implementations are expected to be stateless with respect to the ids they
/// are given: calling `decode` twice with the same ids and flag should
/// produce the same string. The ingress layer is responsible for retrying
/// with a growing id buffer when a decode ends on a partial multi-byte UTF-8
/// sequence; the detokenizer itself does not need to handle that case.
pub trait Detokenizer {
    /// Decode `token_ids` into text.
    ///
    /// `skip_special_tokens` mirrors the common `HuggingFace` tokenizer
    /// parameter of the same name; the ingress layer always calls this with
    /// `false` so that special tokens remain visible to the mode machine.
    fn decode(&self, token_ids: &[u32], skip_special_tokens: bool) -> Result<String, MelodyError>;
}
