use super::{Tokenizer, TokenizerError};
use std::collections::{BTreeSet, HashMap};

/// Character-level tokenizer: the vocabulary is the sorted set of distinct
/// characters of a corpus, and each character's id is its rank.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    ch_to_int: HashMap<char, usize>,
    int_to_ch: Vec<char>,
}

impl SimpleTokenizer {
    /// Builds the vocabulary from the distinct characters of `dataset`.
    pub fn new(dataset: &str) -> Self {
        let int_to_ch = dataset
            .chars()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let ch_to_int = int_to_ch
            .iter()
            .enumerate()
            .map(|(i, ch)| (*ch, i))
            .collect::<HashMap<char, usize>>();
        Self {
            ch_to_int,
            int_to_ch,
        }
    }

    /// The vocabulary, in id order.
    pub fn chars(&self) -> &[char] {
        &self.int_to_ch
    }
}

impl Tokenizer for SimpleTokenizer {
    fn vocab_size(&self) -> usize {
        self.int_to_ch.len()
    }
    fn tokenize(&self, string: &str) -> Result<Vec<usize>, TokenizerError> {
        string
            .chars()
            .map(|ch| {
                self.ch_to_int
                    .get(&ch)
                    .copied()
                    .ok_or(TokenizerError::UnknownCharacter(ch))
            })
            .collect()
    }
    fn untokenize(&self, tokens: &[usize]) -> Result<String, TokenizerError> {
        tokens
            .iter()
            .map(|&id| {
                self.int_to_ch
                    .get(id)
                    .copied()
                    .ok_or(TokenizerError::UnknownToken {
                        id,
                        vocab_size: self.vocab_size(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokenizer() {
        let tokenizer = SimpleTokenizer::new("cabbac");
        assert_eq!(tokenizer.vocab_size(), 3);
        assert_eq!(tokenizer.chars(), &['a', 'b', 'c']);
        assert_eq!(tokenizer.tokenize("abc").unwrap(), vec![0, 1, 2]);
        assert_eq!(tokenizer.untokenize(&[2, 0]).unwrap(), "ca");
    }

    #[test]
    fn test_encode_decode() {
        let tokenizer = SimpleTokenizer::new("hello world\nçà");
        for text in ["hello", "", "world hello", "çà\n"] {
            let tokens = tokenizer.tokenize(text).unwrap();
            assert_eq!(tokenizer.untokenize(&tokens).unwrap(), text);
        }
    }

    #[test]
    fn test_unknown_symbols() {
        let tokenizer = SimpleTokenizer::new("ab");
        assert_eq!(
            tokenizer.tokenize("abc"),
            Err(TokenizerError::UnknownCharacter('c'))
        );
        assert_eq!(
            tokenizer.untokenize(&[0, 2]),
            Err(TokenizerError::UnknownToken {
                id: 2,
                vocab_size: 2
            })
        );
        assert_eq!(SimpleTokenizer::new("").vocab_size(), 0);
    }
}
