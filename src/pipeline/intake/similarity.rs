/// Reduce a filename to the characters that carry meaning for comparison:
/// lower-cased ASCII letters and digits. Separators, spaces and the dot before
/// the extension are dropped so `Invoice 2024.PDF` and `invoice_2024.pdf` agree.
pub fn normalize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Normalized Levenshtein similarity of two filenames in `[0, 1]`:
/// `1 - edit_distance / max(len_a, len_b)` over the normalized names.
///
/// Two names that normalize to nothing are not considered similar. Names that
/// differ only in separators or punctuation (`inv-001.pdf`, `inv_001.pdf`)
/// score 1.0 without being exact matches; duplicate ranking still orders such
/// a fuzzy hit after any exact-filename or content-hash match of equal score.
pub fn filename_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_filename(a);
    let b = normalize_filename(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Case-insensitive equality of two filenames, ignoring surrounding whitespace.
pub fn is_exact_filename_match(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}
