use radium_ui::font::{glyph_cache_key, measure_advances};

#[test]
fn cache_key_packs_size_and_codepoint() {
    // Size in tenths of a pixel in the high half, code point in the low.
    assert_eq!(glyph_cache_key(0x41, 16.0), (160u64 << 32) | 0x41);
    assert_eq!(glyph_cache_key(0x1F600, 12.5), (125u64 << 32) | 0x1F600);
}

#[test]
fn cache_key_quantizes_to_tenths() {
    assert_eq!(glyph_cache_key(65, 16.0), glyph_cache_key(65, 16.04));
    assert_ne!(glyph_cache_key(65, 16.0), glyph_cache_key(65, 16.1));
    assert_ne!(glyph_cache_key(65, 16.0), glyph_cache_key(66, 16.0));
}

#[test]
fn measure_unlimited_consumes_whole_string() {
    let (width, consumed) = measure_advances("hello", 0.0, |_| 10.0, |_, _| 0.0);
    assert!((width - 50.0).abs() < 1e-6);
    assert_eq!(consumed, 5);
}

#[test]
fn measure_stops_before_exceeding_width() {
    // Third character would push past 25.
    let (width, consumed) = measure_advances("hello", 25.0, |_| 10.0, |_, _| 0.0);
    assert!((width - 20.0).abs() < 1e-6);
    assert_eq!(consumed, 2);
}

#[test]
fn measure_applies_kerning_between_neighbors() {
    // 'A' followed by 'V' tucks in by 3.
    let kern = |a: u32, b: u32| {
        if a == 'A' as u32 && b == 'V' as u32 {
            -3.0
        } else {
            0.0
        }
    };
    let (width, consumed) = measure_advances("AV", 0.0, |_| 10.0, kern);
    assert!((width - 17.0).abs() < 1e-6);
    assert_eq!(consumed, 2);

    // Kerning applies between characters, not before the first.
    let (width, _) = measure_advances("V", 0.0, |_| 10.0, kern);
    assert!((width - 10.0).abs() < 1e-6);
}

#[test]
fn measure_counts_bytes_not_chars() {
    // "é€" is 2 + 3 bytes.
    let (_, consumed) = measure_advances("é€", 0.0, |_| 10.0, |_, _| 0.0);
    assert_eq!(consumed, 5);
}

#[test]
fn measure_resumes_without_overlap() {
    let text = "the quick brown fox jumps over the lazy dog";
    let mut offset = 0;
    let mut covered = 0;
    while offset < text.len() {
        let (_, consumed) = measure_advances(&text[offset..], 40.0, |_| 10.0, |_, _| 0.0);
        assert!(consumed > 0, "measurement must make progress");
        covered += consumed;
        offset += consumed;
    }
    assert_eq!(covered, text.len());
}

#[test]
fn measure_accumulates_fractions_without_rounding() {
    // 10 chars of 1.05 px: per-char rounding would give 10, exact is 10.5.
    let (width, _) = measure_advances("aaaaaaaaaa", 0.0, |_| 1.05, |_, _| 0.0);
    assert!((width - 10.5).abs() < 1e-4);
}
