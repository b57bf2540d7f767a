//! Trace word tokenizer.
//!
//! Trace captures arrive as text files with one 32-bit word per token,
//! written either in decimal or in hexadecimal depending on which firmware
//! produced the dump. Capture tools also tend to leave a stray non-numeric
//! token at the end of the file (an EOF marker or a truncated line), which
//! is dropped rather than treated as corruption.

use thiserror::Error;

/// Errors produced while converting raw tokens into trace words.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WordParseError {
    /// A token other than the trailing EOF artifact failed to parse
    /// under both radixes.
    #[error("trace word {token:?} at position {index} is neither a decimal nor a hexadecimal integer")]
    MalformedWord {
        /// Position of the offending token in the input.
        index: usize,
        /// The token text.
        token: String,
    },
}

/// Convert raw text tokens into 32-bit trace words.
///
/// All tokens are parsed as decimal first. If any token fails decimal
/// parsing, the whole list is re-parsed as hexadecimal (captures are
/// uniformly one radix or the other, never mixed). A final token that
/// parses under neither radix is discarded as an end-of-file artifact;
/// this check happens once, only for the last token.
///
/// An empty token list is valid and yields an empty word list.
pub fn parse_trace_words<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<u32>, WordParseError> {
    let mut tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();

    if let Some(last) = tokens.last() {
        if parse_word(last, 10).is_none() && parse_word(last, 16).is_none() {
            log::debug!("dropping trailing non-numeric token {last:?}");
            tokens.pop();
        }
    }

    if let Some(words) = parse_all(&tokens, 10) {
        return Ok(words);
    }
    match parse_all(&tokens, 16) {
        Some(words) => Ok(words),
        None => {
            // Re-scan to report which token broke the hexadecimal pass.
            let (index, token) = tokens
                .iter()
                .enumerate()
                .find(|(_, t)| parse_word(t, 16).is_none())
                .map(|(i, t)| (i, t.to_string()))
                .unwrap_or_default();
            Err(WordParseError::MalformedWord { index, token })
        }
    }
}

/// Parse every token under one radix, or give up on the first failure.
fn parse_all(tokens: &[&str], radix: u32) -> Option<Vec<u32>> {
    let mut words = Vec::with_capacity(tokens.len());
    for token in tokens {
        words.push(parse_word(token, radix)?);
    }
    Some(words)
}

/// Parse one token, tolerating a `0x`/`0X` prefix in hexadecimal mode.
fn parse_word(token: &str, radix: u32) -> Option<u32> {
    let digits = if radix == 16 {
        token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token)
    } else {
        token
    };
    u32::from_str_radix(digits, radix).ok()
}
