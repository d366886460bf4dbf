// src/core/utils/text.rs

//! Word and substring matching over request header values, with optional
//! case folding. A "word" match requires the needle to sit on
//! non-alphanumeric boundaries, so `"you"` matches in `"are you?"` but
//! `"re"` does not match in `"are"`.

/// Compares two characters, optionally ASCII-case-insensitively.
pub fn eq_char(a: char, b: char, case_insensitive: bool) -> bool {
    if a == b {
        return true;
    }
    if case_insensitive {
        return a.to_ascii_lowercase() == b.to_ascii_lowercase() && a.is_ascii_alphabetic();
    }
    false
}

/// Whether `haystack` contains `word` on word boundaries.
pub fn contains_word(haystack: &str, word: &str, case_insensitive: bool) -> bool {
    let hay: Vec<char> = haystack.chars().collect();
    let needle: Vec<char> = word.chars().collect();
    if hay.is_empty() || needle.is_empty() || needle.len() > hay.len() {
        return false;
    }
    for start in 0..=(hay.len() - needle.len()) {
        if !matches_at(&hay, &needle, start, case_insensitive) {
            continue;
        }
        let left_ok = start == 0 || !hay[start - 1].is_alphanumeric();
        let end = start + needle.len();
        let right_ok = end == hay.len() || !hay[end].is_alphanumeric();
        if left_ok && right_ok {
            return true;
        }
    }
    false
}

/// Whether `haystack` contains `needle` anywhere. Empty needles never match.
pub fn contains_sub(haystack: &str, needle: &str, case_insensitive: bool) -> bool {
    let hay: Vec<char> = haystack.chars().collect();
    let sub: Vec<char> = needle.chars().collect();
    if hay.is_empty() || sub.is_empty() || sub.len() > hay.len() {
        return false;
    }
    (0..=(hay.len() - sub.len())).any(|start| matches_at(&hay, &sub, start, case_insensitive))
}

/// Whether every word in `words` appears in `haystack` on word boundaries.
pub fn contains_all_words(haystack: &str, words: &[String], case_insensitive: bool) -> bool {
    !words.is_empty()
        && words
            .iter()
            .all(|w| contains_word(haystack, w, case_insensitive))
}

/// Whether any word in `words` appears in `haystack` on word boundaries.
pub fn contains_any_word(haystack: &str, words: &[String], case_insensitive: bool) -> bool {
    words
        .iter()
        .any(|w| contains_word(haystack, w, case_insensitive))
}

fn matches_at(hay: &[char], needle: &[char], start: usize, case_insensitive: bool) -> bool {
    needle
        .iter()
        .enumerate()
        .all(|(i, &c)| eq_char(hay[start + i], c, case_insensitive))
}
