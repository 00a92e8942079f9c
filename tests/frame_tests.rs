use radium_ui::frame::{grown_size, resolve_scissor, MAX_FRAMES_IN_FLIGHT};
use radium_ui::utils::Rectangle;

#[test]
fn frames_in_flight_is_double_buffered() {
    assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
}

#[test]
fn first_allocation_takes_exact_size() {
    assert_eq!(grown_size(0, 1024), 1024);
}

#[test]
fn growth_at_least_doubles() {
    // A small overshoot still doubles to amortize reallocation.
    assert_eq!(grown_size(1024, 1100), 2048);
    // A large jump is honored exactly.
    assert_eq!(grown_size(1024, 10_000), 10_000);
}

#[test]
fn repeated_growth_is_logarithmic() {
    let mut size = 0u64;
    let mut reallocations = 0;
    for needed in (0..100_000u64).step_by(97) {
        if needed > size {
            size = grown_size(size, needed);
            reallocations += 1;
        }
    }
    // Doubling keeps reallocation count small over a long ramp.
    assert!(reallocations <= 12, "reallocated {reallocations} times");
}

#[test]
fn absent_scissor_means_full_frame() {
    assert_eq!(resolve_scissor(None, 800, 600), Some((0, 0, 800, 600)));
}

#[test]
fn offscreen_scissor_skips_the_batch() {
    // A clip rect entirely past the right edge must not fall back to the
    // full frame; the batch is dropped instead.
    let rect = Rectangle::new(900.0, 10.0, 50.0, 50.0);
    assert_eq!(resolve_scissor(Some(rect), 800, 600), None);
}

#[test]
fn partial_scissor_is_clamped() {
    let rect = Rectangle::new(-10.0, 0.0, 100.0, 700.0);
    assert_eq!(resolve_scissor(Some(rect), 800, 600), Some((0, 0, 90, 600)));
}
