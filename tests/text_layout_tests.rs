use radium_ui::text_layout::{
    decode_utf8, is_utf8_start_byte, next_char_pos, prev_char_pos, tail_that_fits, wrap_text,
    WrapMode,
};

// Fixed-width measure: 10px per character.
fn char_measure(s: &str) -> f32 {
    s.chars().count() as f32 * 10.0
}

#[test]
fn none_mode_returns_input_unchanged() {
    let lines = wrap_text("hello world this is long", 30.0, WrapMode::None, char_measure);
    assert_eq!(lines, vec!["hello world this is long".to_string()]);
}

#[test]
fn non_positive_width_returns_input_unchanged() {
    let lines = wrap_text("hello world", 0.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["hello world".to_string()]);
    let lines = wrap_text("hello world", -5.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["hello world".to_string()]);
}

#[test]
fn explicit_newline_splits_without_empty_line() {
    let lines = wrap_text("Hello\nWorld", 200.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["Hello".to_string(), "World".to_string()]);
}

#[test]
fn empty_paragraph_yields_one_empty_line() {
    let lines = wrap_text("Hello\n\nWorld", 200.0, WrapMode::Word, char_measure);
    assert_eq!(
        lines,
        vec!["Hello".to_string(), String::new(), "World".to_string()]
    );
    // Trailing newline ends with an empty line
    let lines = wrap_text("Hello\n", 200.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["Hello".to_string(), String::new()]);
}

#[test]
fn word_wrap_respects_width() {
    let lines = wrap_text("aa bb cc dd", 50.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["aa bb".to_string(), "cc dd".to_string()]);
    for line in &lines {
        assert!(char_measure(line) <= 50.0);
    }
}

#[test]
fn word_wrap_collapses_run_of_separators() {
    let lines = wrap_text("a  b\tc", 200.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["a b c".to_string()]);
}

#[test]
fn overlong_word_breaks_at_char_granularity() {
    let lines = wrap_text("aaaa bb cc", 35.0, WrapMode::Word, char_measure);
    assert_eq!(
        lines,
        vec![
            "aaa".to_string(),
            "a".to_string(),
            "bb".to_string(),
            "cc".to_string()
        ]
    );
}

#[test]
fn char_wrap_fills_lines_exactly() {
    let lines = wrap_text("abcdef", 30.0, WrapMode::Char, char_measure);
    assert_eq!(lines, vec!["abc".to_string(), "def".to_string()]);
}

#[test]
fn single_overwide_char_still_emitted() {
    // Every character is wider than the line; each gets its own line
    // rather than being dropped.
    let wide = |s: &str| s.chars().count() as f32 * 50.0;
    let lines = wrap_text("ab", 30.0, WrapMode::Char, wide);
    assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn wrap_handles_multibyte_text() {
    let lines = wrap_text("héllo wörld", 60.0, WrapMode::Word, char_measure);
    assert_eq!(lines, vec!["héllo".to_string(), "wörld".to_string()]);
}

#[test]
fn decode_utf8_all_lengths() {
    assert_eq!(decode_utf8("A".as_bytes()), Some((0x41, 1)));
    assert_eq!(decode_utf8("é".as_bytes()), Some((0xE9, 2)));
    assert_eq!(decode_utf8("€".as_bytes()), Some((0x20AC, 3)));
    assert_eq!(decode_utf8("𝄞".as_bytes()), Some((0x1D11E, 4)));
}

#[test]
fn decode_utf8_rejects_malformed_input() {
    // Truncated 3-byte sequence
    assert_eq!(decode_utf8(&"€".as_bytes()[..2]), None);
    // Bare continuation byte
    assert_eq!(decode_utf8(&[0x80]), None);
    // Invalid lead byte
    assert_eq!(decode_utf8(&[0xFF, 0x80]), None);
    // Lead byte followed by a non-continuation byte
    assert_eq!(decode_utf8(&[0xC3, 0x41]), None);
    assert_eq!(decode_utf8(&[]), None);
}

#[test]
fn char_position_navigation() {
    let text = "aé€𝄞";
    assert!(is_utf8_start_byte(text.as_bytes()[0]));
    assert!(!is_utf8_start_byte(text.as_bytes()[2]));

    let mut pos = 0;
    let mut steps = Vec::new();
    while pos < text.len() {
        steps.push(pos);
        pos = next_char_pos(text, pos);
    }
    assert_eq!(steps, vec![0, 1, 3, 6]);
    assert_eq!(pos, text.len());

    assert_eq!(prev_char_pos(text, 6), 3);
    assert_eq!(prev_char_pos(text, 3), 1);
    assert_eq!(prev_char_pos(text, 1), 0);
    assert_eq!(prev_char_pos(text, 0), 0);
}

#[test]
fn tail_that_fits_keeps_suffix() {
    let (tail, width) = tail_that_fits("hello", 30.0, char_measure);
    assert_eq!(tail, "llo");
    assert!((width - 30.0).abs() < 1e-6);
}

#[test]
fn tail_that_fits_whole_string_when_it_fits() {
    let (tail, width) = tail_that_fits("hi", 100.0, char_measure);
    assert_eq!(tail, "hi");
    assert!((width - 20.0).abs() < 1e-6);
}

#[test]
fn tail_that_fits_degenerate_inputs() {
    let (tail, width) = tail_that_fits("", 100.0, char_measure);
    assert!(tail.is_empty());
    assert_eq!(width, 0.0);
    let (tail, width) = tail_that_fits("hello", 0.0, char_measure);
    assert!(tail.is_empty());
    assert_eq!(width, 0.0);
}
