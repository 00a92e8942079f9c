use radium_ui::atlas::ShelfPacker;

#[test]
fn allocations_share_a_shelf() {
    let mut packer = ShelfPacker::new(128, 2);
    // Padded footprint of a 10x10 glyph is 12x12.
    assert_eq!(packer.allocate(10, 10), Some((0, 0)));
    assert_eq!(packer.allocate(10, 10), Some((12, 0)));
    assert_eq!(packer.allocate(10, 8), Some((24, 0)));
    assert_eq!(packer.shelf_count(), 1);
}

#[test]
fn taller_glyph_opens_a_new_shelf() {
    let mut packer = ShelfPacker::new(128, 2);
    assert_eq!(packer.allocate(10, 10), Some((0, 0)));
    // 20 high exceeds the 12-high shelf; new shelf below it.
    assert_eq!(packer.allocate(10, 20), Some((0, 12)));
    assert_eq!(packer.shelf_count(), 2);
}

#[test]
fn shorter_glyph_backfills_first_fitting_shelf() {
    let mut packer = ShelfPacker::new(128, 2);
    packer.allocate(10, 10);
    packer.allocate(10, 20);
    // Fits on the first shelf even though the second was opened later.
    assert_eq!(packer.allocate(8, 10), Some((12, 0)));
}

#[test]
fn full_shelf_spills_to_next() {
    let mut packer = ShelfPacker::new(32, 2);
    assert_eq!(packer.allocate(20, 10), Some((0, 0)));
    // 22 wide remaining space is 10; spills to a new shelf.
    assert_eq!(packer.allocate(20, 10), Some((0, 12)));
}

#[test]
fn exhausted_page_returns_none() {
    let mut packer = ShelfPacker::new(32, 2);
    assert!(packer.allocate(30, 30).is_some());
    assert_eq!(packer.allocate(30, 30), None);
    // A glyph wider than the page never fits.
    assert_eq!(packer.allocate(40, 4), None);
}

#[test]
fn reset_discards_all_placements() {
    let mut packer = ShelfPacker::new(32, 2);
    packer.allocate(30, 30);
    assert_eq!(packer.allocate(30, 30), None);

    packer.reset(64);
    assert_eq!(packer.size(), 64);
    assert_eq!(packer.shelf_count(), 0);
    assert_eq!(packer.allocate(30, 30), Some((0, 0)));
}

#[test]
fn allocations_never_overlap() {
    let mut packer = ShelfPacker::new(256, 2);
    let mut rects: Vec<(u32, u32, u32, u32)> = Vec::new();
    let sizes = [(10, 14), (30, 8), (5, 5), (60, 20), (12, 12), (40, 3)];
    for _ in 0..8 {
        for &(w, h) in &sizes {
            if let Some((x, y)) = packer.allocate(w, h) {
                rects.push((x, y, w, h));
            }
        }
    }
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            let disjoint =
                a.0 + a.2 <= b.0 || b.0 + b.2 <= a.0 || a.1 + a.3 <= b.1 || b.1 + b.3 <= a.1;
            assert!(disjoint, "{a:?} overlaps {b:?}");
        }
    }
}
