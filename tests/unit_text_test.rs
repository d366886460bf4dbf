use edgecache::core::utils::text::{
    contains_all_words, contains_any_word, contains_sub, contains_word, eq_char,
};

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

#[test]
fn test_contains_all_words() {
    assert!(contains_all_words("How are you?", &words(&["are", "you"]), false));
    assert!(!contains_all_words(
        "How are you?",
        &words(&["how", "are", "you"]),
        false
    ));
    assert!(contains_all_words(
        "How are you?",
        &words(&["how", "are", "you"]),
        true
    ));
}

#[test]
fn test_contains_any_word() {
    assert!(contains_any_word("How are you?", &words(&["are", "you"]), false));
    assert!(contains_any_word(
        "How are you?",
        &words(&["are", "you", "ok"]),
        false
    ));
    assert!(!contains_any_word("How are you?", &words(&["how", "ok"]), false));
    assert!(contains_any_word("How are you?", &words(&["how"]), true));
    assert!(contains_any_word("How are you?", &words(&["how", "ok"]), true));
}

#[test]
fn test_contains_word_requires_boundaries() {
    assert!(!contains_word("", "How", true));
    assert!(!contains_word("How are you?", "", true));
    assert!(contains_word("How are you?", "How", true));
    assert!(!contains_word("How are you?", "how", false));
    assert!(contains_word("How are you?", "you", false));
    assert!(contains_word("How are you?", "are", false));
    assert!(!contains_word("How are you?", "re", false));
    assert!(contains_word("How are you w?", "w", false));
    assert!(contains_word("w How are you?", "w", false));
    assert!(contains_word("How are w you?", "w", false));
    assert!(contains_word("How are how you?", "how", false));
    assert!(contains_word("How are you?", "how", true));
    assert!(contains_word("How are you?", "ARE", true));
    assert!(contains_word("How are you", "you", false));
    assert!(contains_word("How are you", "YOU", true));
    assert!(contains_word("How are you?", "YOU", true));
    assert!(!contains_word("How are you1?", "YOU", true));
    assert!(!contains_word("How are you1?", "YOU YOU YOU YOU YOU YOU YOU", true));
}

#[test]
fn test_contains_sub_matches_anywhere() {
    assert!(!contains_sub("", "How", true));
    assert!(!contains_sub("How are you?", "", true));
    assert!(contains_sub("How are you1?", "YOU", true));
    assert!(contains_sub("How are you1?", "ow", false));
    assert!(contains_sub("How are you1?", "H", false));
    assert!(contains_sub("How are you1?", "How", false));
    assert!(contains_sub("How are you doing", "oi", false));
    assert!(contains_sub("How are you doing", "g", false));
    assert!(contains_sub("How are you doing", "ing", false));
    assert!(!contains_sub("How are you doing", "int", false));
}

#[test]
fn test_eq_char() {
    assert!(eq_char('a', 'a', false));
    assert!(eq_char('a', 'a', true));
    assert!(!eq_char('a', 'A', false));
    assert!(eq_char('a', 'A', true));
    assert!(!eq_char('c', 'C', false));
    assert!(eq_char('c', 'C', true));
    assert!(eq_char('C', 'C', true));
    assert!(eq_char('C', 'c', true));
    assert!(eq_char('Z', 'z', true));
    assert!(eq_char('z', 'Z', true));
    let shifted = char::from_u32('z' as u32 + ('a' as u32 - 'A' as u32)).unwrap();
    assert!(!eq_char('z', shifted, true));
}
