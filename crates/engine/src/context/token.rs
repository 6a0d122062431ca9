//! The one token estimate Ragline uses everywhere.
//!
//! A token is counted per started group of four UTF-8 bytes. Context
//! budgets, prompt accounting, and answer accounting all call
//! [`estimate_tokens`], so their numbers line up.
//!
//! Because it rounds up per string, joining strings never costs more than
//! the parts did: `estimate_tokens(a + b) <= estimate_tokens(a) + estimate_tokens(b)`.

/// Tokens charged for `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
