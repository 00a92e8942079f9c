use std::cell::Cell;

use radium_ui::icon::{
    coverage_to_rgba, parse_codepoints, parse_codepoints_json, parse_codepoints_txt,
    quantize_size, LruCache, LruLedger, EVICTION_BATCH, MAX_FONT_CACHE_SIZE, SIZE_LADDER,
};

#[test]
fn quantize_rounds_up_the_ladder() {
    assert_eq!(quantize_size(10.0), 16);
    assert_eq!(quantize_size(16.0), 16);
    assert_eq!(quantize_size(16.2), 24);
    assert_eq!(quantize_size(24.0), 24);
    assert_eq!(quantize_size(33.0), 48);
    assert_eq!(quantize_size(128.0), 128);
}

#[test]
fn quantize_clamps_extremes() {
    assert_eq!(quantize_size(4000.0), *SIZE_LADDER.last().unwrap());
    assert_eq!(quantize_size(0.0), SIZE_LADDER[0]);
    assert_eq!(quantize_size(-5.0), SIZE_LADDER[0]);
}

#[test]
fn coverage_expands_to_premultiplied_white() {
    let rgba = coverage_to_rgba(&[0, 128, 255]);
    assert_eq!(
        rgba,
        vec![0, 0, 0, 0, 128, 128, 128, 128, 255, 255, 255, 255]
    );
}

#[test]
fn txt_parser_skips_comments_and_garbage() {
    let content = "\
# material icons
home e88a

search e8b6
broken zz99
lonely
menu E5D2
";
    let map = parse_codepoints_txt(content);
    assert_eq!(map.len(), 3);
    assert_eq!(map.get("home"), Some(&0xE88A));
    assert_eq!(map.get("search"), Some(&0xE8B6));
    assert_eq!(map.get("menu"), Some(&0xE5D2));
    assert!(!map.contains_key("broken"));
}

#[test]
fn json_parser_reads_flat_string_map() {
    let content = r#"{ "home": "e88a", "search": "e8b6" }"#;
    let map = parse_codepoints_json(content);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("home"), Some(&0xE88A));
    assert_eq!(map.get("search"), Some(&0xE8B6));
}

#[test]
fn json_parser_agrees_with_serde_json_on_flat_maps() {
    let value = serde_json::json!({
        "home": "e88a",
        "search": "e8b6",
        "menu": "e5d2",
        "close": "e5cd"
    });
    let content = serde_json::to_string_pretty(&value).unwrap();
    let scanned = parse_codepoints_json(&content);

    let reference: std::collections::HashMap<String, u32> =
        serde_json::from_str::<std::collections::HashMap<String, String>>(&content)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k, u32::from_str_radix(&v, 16).unwrap()))
            .collect();
    assert_eq!(scanned, reference);
}

#[test]
fn format_auto_detection() {
    assert_eq!(
        parse_codepoints("  {\"home\": \"e88a\"}").get("home"),
        Some(&0xE88A)
    );
    assert_eq!(parse_codepoints("home e88a").get("home"), Some(&0xE88A));
}

#[test]
fn ledger_tracks_least_recent() {
    let mut ledger = LruLedger::default();
    ledger.touch("a");
    ledger.touch("b");
    ledger.touch("c");
    assert_eq!(ledger.lru_key().as_deref(), Some("a"));

    // Touching refreshes recency.
    ledger.touch("a");
    assert_eq!(ledger.lru_key().as_deref(), Some("b"));
}

#[test]
fn ledger_oldest_returns_sorted_batch() {
    let mut ledger = LruLedger::default();
    for key in ["e", "d", "c", "b", "a"] {
        ledger.touch(key);
    }
    assert_eq!(ledger.oldest(3), vec!["e", "d", "c"]);
    // Asking for more than exist returns everything, still ordered.
    assert_eq!(ledger.oldest(10).len(), 5);
}

#[test]
fn ledger_remove_drops_key() {
    let mut ledger = LruLedger::default();
    ledger.touch("a");
    ledger.touch("b");
    ledger.remove("a");
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.lru_key().as_deref(), Some("b"));
}

#[test]
fn repeated_lookup_returns_cached_entry() {
    // A second lookup for the same key must serve the cached value:
    // no rebuild, no eviction, no growth.
    let mut cache: LruCache<u32> = LruCache::new(4, 2);
    let builds = Cell::new(0);

    let first = cache
        .get_or_insert_with("material_59530_24", || {
            builds.set(builds.get() + 1);
            Some(7)
        })
        .copied();
    assert_eq!(first, Some(7));

    let second = cache
        .get_or_insert_with("material_59530_24", || {
            builds.set(builds.get() + 1);
            Some(99)
        })
        .copied();
    assert_eq!(second, Some(7));

    assert_eq!(builds.get(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.eviction_count(), 0);
}

#[test]
fn insert_at_capacity_evicts_least_recent() {
    let mut cache: LruCache<u32> = LruCache::new(3, 2);
    cache.get_or_insert_with("a", || Some(0));
    cache.get_or_insert_with("b", || Some(1));
    cache.get_or_insert_with("c", || Some(2));

    // Refresh "a" so "b" becomes the eviction victim.
    cache.get_or_insert_with("a", || None);
    cache.get_or_insert_with("d", || Some(3));

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.eviction_count(), 1);
    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
    assert!(cache.contains("d"));
}

#[test]
fn failed_build_inserts_nothing() {
    let mut cache: LruCache<u32> = LruCache::new(4, 2);
    assert!(cache.get_or_insert_with("missing", || None).is_none());
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.eviction_count(), 0);
}

#[test]
fn remove_prefix_drops_one_font_family() {
    let mut cache: LruCache<u32> = LruCache::new(8, 2);
    cache.get_or_insert_with("material_1_16", || Some(1));
    cache.get_or_insert_with("material_2_16", || Some(2));
    cache.get_or_insert_with("feather_1_16", || Some(3));

    cache.remove_prefix("material_");
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("feather_1_16"));
}

#[test]
fn eviction_policy_bounds_cache_size() {
    // Mirror of the cache's pre-insert eviction: one LRU removal, then a
    // batch when still at capacity.
    let mut ledger = LruLedger::default();
    for i in 0..MAX_FONT_CACHE_SIZE {
        ledger.touch(&format!("font_{i}_16"));
    }

    if let Some(victim) = ledger.lru_key() {
        ledger.remove(&victim);
    }
    assert_eq!(ledger.len(), MAX_FONT_CACHE_SIZE - 1);
    assert_eq!(ledger.lru_key().as_deref(), Some("font_1_16"));

    // Refill to capacity and run the batch path.
    ledger.touch("font_overflow_16");
    if ledger.len() >= MAX_FONT_CACHE_SIZE {
        for victim in ledger.oldest(EVICTION_BATCH) {
            ledger.remove(&victim);
        }
    }
    assert_eq!(ledger.len(), MAX_FONT_CACHE_SIZE - EVICTION_BATCH);
    // The survivors are the most recently used.
    assert_eq!(
        ledger.lru_key().as_deref(),
        Some(&*format!("font_{}_16", EVICTION_BATCH + 1))
    );
}
