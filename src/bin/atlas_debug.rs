//! Dump the glyph atlas to a PNG for visual inspection.
//!
//! Usage: atlas_debug <font.ttf> [text] [output.png]
//!
//! Rasterizes and packs every distinct character of `text` (a pangram by
//! default) on a headless device, then writes the atlas page to disk and
//! prints utilization counters.

use std::collections::BTreeSet;
use std::fs;

use anyhow::Context;
use radium_ui::{RenderCore, RenderCoreConfig};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let font_path = args.next().context("usage: atlas_debug <font.ttf> [text] [output.png]")?;
    let text = args
        .next()
        .unwrap_or_else(|| "Sphinx of black quartz, judge my vow! 0123456789".to_string());
    let output = args.next().unwrap_or_else(|| "debug_atlas.png".to_string());

    let mut core = RenderCore::new(RenderCoreConfig::default());
    core.initialize_headless()
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let font_data = fs::read(&font_path).with_context(|| format!("reading {font_path}"))?;
    core.load_font(font_data)
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let mut packed = 0usize;
    let mut missed = 0usize;
    for codepoint in text.chars().collect::<BTreeSet<char>>() {
        if codepoint.is_whitespace() {
            continue;
        }
        match core.get_or_add_glyph(codepoint as u32) {
            Some(_) => packed += 1,
            None => missed += 1,
        }
    }

    core.save_atlas_debug_png(&output)?;

    if let Some(stats) = core.atlas_stats() {
        println!(
            "{output}: {}x{} page, {} glyphs on {} shelves, {:.1}% used",
            stats.atlas_size,
            stats.atlas_size,
            stats.glyph_count,
            stats.shelf_count,
            stats.utilization * 100.0
        );
    }
    println!("packed {packed} glyphs, {missed} misses");

    core.shutdown();
    Ok(())
}
