//! Text normalization used as the comparison key for notes, queries and
//! product names.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Normalize text for comparison.
///
/// Decomposes to NFD, drops combining marks, lowercases and trims.
///
/// ```
/// use restock_core::normalize::normalize;
///
/// assert_eq!(normalize("  Leche Descremada "), "leche descremada");
/// assert_eq!(normalize("Plátano"), "platano");
/// ```
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}
