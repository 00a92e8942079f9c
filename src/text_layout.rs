//! UTF-8 aware text wrapping.
//!
//! Measurement is injected as a closure so the wrapping policy stays
//! independent of any particular font backend; the [`crate::RenderCore`]
//! facade supplies a closure backed by the glyph rasterizer.

/// How `wrap_text` breaks lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// No wrapping; the input comes back as a single line.
    #[default]
    None,
    /// Break at word boundaries; overlong words fall back to `Char`.
    Word,
    /// Break between code points.
    Char,
}

/// True if `byte` starts a UTF-8 sequence (ASCII or a leading byte).
#[inline]
pub fn is_utf8_start_byte(byte: u8) -> bool {
    // Continuation bytes are 10xxxxxx.
    (byte & 0xC0) != 0x80
}

/// Byte offset of the code point following the one at `pos`.
pub fn next_char_pos(text: &str, pos: usize) -> usize {
    let bytes = text.as_bytes();
    if pos >= bytes.len() {
        return bytes.len();
    }
    let mut next = pos + 1;
    while next < bytes.len() && !is_utf8_start_byte(bytes[next]) {
        next += 1;
    }
    next
}

/// Byte offset of the code point preceding the one at `pos`.
pub fn prev_char_pos(text: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    let bytes = text.as_bytes();
    let mut prev = pos - 1;
    while prev > 0 && !is_utf8_start_byte(bytes[prev]) {
        prev -= 1;
    }
    prev
}

/// Decode one code point from the front of `bytes`.
///
/// Returns the code point and its encoded length. Truncated sequences,
/// stray continuation bytes and invalid leading bytes all return `None`;
/// callers stop consuming at that boundary.
pub fn decode_utf8(bytes: &[u8]) -> Option<(u32, usize)> {
    let first = *bytes.first()?;

    if first < 0x80 {
        return Some((u32::from(first), 1));
    }

    let len = if first & 0xE0 == 0xC0 {
        2
    } else if first & 0xF0 == 0xE0 {
        3
    } else if first & 0xF8 == 0xF0 {
        4
    } else {
        return None;
    };

    if bytes.len() < len {
        return None;
    }

    let mut value = u32::from(first & (0x7F >> len));
    for &byte in &bytes[1..len] {
        if byte & 0xC0 != 0x80 {
            return None;
        }
        value = (value << 6) | u32::from(byte & 0x3F);
    }
    Some((value, len))
}

/// Wrap `text` into lines no wider than `max_width`.
///
/// Paragraphs are delimited by `\n`. An empty paragraph yields exactly one
/// empty output line; non-empty paragraphs contribute only their wrapped
/// lines. With `WrapMode::None` or a non-positive width the input is
/// returned unchanged as a single line.
pub fn wrap_text<F>(text: &str, max_width: f32, mode: WrapMode, mut measure: F) -> Vec<String>
where
    F: FnMut(&str) -> f32,
{
    if mode == WrapMode::None || max_width <= 0.0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        if paragraph.is_empty() {
            lines.push(String::new());
        } else {
            wrap_paragraph(paragraph, max_width, mode, &mut measure, &mut lines);
        }
    }
    lines
}

fn wrap_paragraph<F>(
    paragraph: &str,
    max_width: f32,
    mode: WrapMode,
    measure: &mut F,
    lines: &mut Vec<String>,
) where
    F: FnMut(&str) -> f32,
{
    if mode == WrapMode::Char {
        let current = break_chars(paragraph, max_width, String::new(), measure, lines);
        if !current.is_empty() {
            lines.push(current);
        }
        return;
    }

    // Word mode: greedy fill, single-space joins, char-level fallback for
    // words that cannot fit on a line of their own.
    let mut current = String::new();
    for word in paragraph.split([' ', '\t']) {
        if word.is_empty() {
            continue;
        }

        if measure(word) > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = break_chars(word, max_width, current, measure, lines);
            continue;
        }

        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
}

/// Character-level greedy fill. Completed lines go to `lines`; the
/// still-open trailing line is returned so word wrapping can continue
/// filling it.
fn break_chars<F>(
    text: &str,
    max_width: f32,
    mut current: String,
    measure: &mut F,
    lines: &mut Vec<String>,
) -> String
where
    F: FnMut(&str) -> f32,
{
    let mut pos = 0;
    while pos < text.len() {
        let next = next_char_pos(text, pos);
        let ch = &text[pos..next];
        let mut candidate = current.clone();
        candidate.push_str(ch);
        if measure(&candidate) > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(ch);
        } else {
            current = candidate;
        }
        pos = next;
    }
    current
}

/// Longest suffix of `text` that measures within `max_width`, with its
/// width. Text-input style widgets use this to keep the caret visible.
pub fn tail_that_fits<F>(text: &str, max_width: f32, mut measure: F) -> (String, f32)
where
    F: FnMut(&str) -> f32,
{
    if text.is_empty() || max_width <= 0.0 {
        return (String::new(), 0.0);
    }

    let mut start = text.len();
    let mut best = (String::new(), 0.0);
    while start > 0 {
        let candidate_start = prev_char_pos(text, start);
        let tail = &text[candidate_start..];
        let width = measure(tail);
        if width > max_width {
            break;
        }
        best = (tail.to_string(), width);
        start = candidate_start;
    }
    best
}
