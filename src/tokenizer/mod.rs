//! Conversion between text and token ids.

mod simple;
pub use simple::*;

use thiserror::Error;

/// Text or ids outside the vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    /// The character was not in the corpus the vocabulary was built from.
    #[error("character {0:?} is not in the vocabulary")]
    UnknownCharacter(char),
    /// The id is not below the vocabulary size.
    #[error("token id {id} is out of range for a vocabulary of {vocab_size}")]
    UnknownToken {
        /// The offending id.
        id: usize,
        /// Size of the vocabulary.
        vocab_size: usize,
    },
}

/// Conversion between text and token ids.
pub trait Tokenizer {
    /// Number of distinct tokens.
    fn vocab_size(&self) -> usize;
    /// Encodes `string` symbol by symbol.
    fn tokenize(&self, string: &str) -> Result<Vec<usize>, TokenizerError>;
    /// Decodes `tokens` back into text.
    fn untokenize(&self, tokens: &[usize]) -> Result<String, TokenizerError>;
}
