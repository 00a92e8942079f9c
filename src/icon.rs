//! Icon fonts and the per-icon GPU texture cache.
//!
//! Icons are glyphs of dedicated icon fonts, addressed by name through a
//! codepoint map loaded next to the font. Each requested
//! `(font, codepoint, quantized size)` gets its own small RGBA texture;
//! a bounded LRU cache keeps the texture count in check.

use std::collections::HashMap;

use uuid::Uuid;

use crate::font::{FontError, FontRasterizer};

/// Hard cap on cached icon textures. Eviction runs before insertion, so
/// the cache never exceeds this.
pub const MAX_FONT_CACHE_SIZE: usize = 128;
/// Entries removed in one batch when a single eviction is not enough.
pub const EVICTION_BATCH: usize = 16;

/// Requested icon sizes snap onto this ladder, bounding the number of
/// distinct cache entries a single icon can occupy.
pub const SIZE_LADDER: [u32; 7] = [16, 24, 32, 48, 64, 96, 128];

/// Round `size` up to the nearest ladder entry, clamping to the largest.
pub fn quantize_size(size: f32) -> u32 {
    let size = size.ceil() as u32;
    for step in SIZE_LADDER {
        if size <= step {
            return step;
        }
    }
    SIZE_LADDER[SIZE_LADDER.len() - 1]
}

/// Expand a single-channel coverage bitmap to premultiplied white RGBA.
pub fn coverage_to_rgba(coverage: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(coverage.len() * 4);
    for &alpha in coverage {
        // White premultiplied by alpha collapses to alpha per channel.
        rgba.extend_from_slice(&[alpha, alpha, alpha, alpha]);
    }
    rgba
}

/// Parse the line-oriented `<name> <hex-codepoint>` format. Blank lines
/// and `#` comments are skipped; malformed hex values are logged and
/// dropped, never fatal.
pub fn parse_codepoints_txt(content: &str) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(hex)) = (parts.next(), parts.next()) else {
            continue;
        };
        match u32::from_str_radix(hex, 16) {
            Ok(codepoint) => {
                map.insert(name.to_string(), codepoint);
            }
            Err(_) => log::warn!("invalid codepoint format: {name} - {hex}"),
        }
    }
    map
}

/// Parse a flat `{"name": "hex", ...}` object by scanning quote pairs.
///
/// This is deliberately not a JSON parser: nesting, escapes and
/// non-string values are not handled. The codepoints files shipped with
/// icon fonts are flat string-to-string maps, and this stays dependency
/// free. Known limitation.
pub fn parse_codepoints_json(content: &str) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    let bytes = content.as_bytes();
    let mut pos = 0;

    let find_quote = |from: usize| -> Option<usize> {
        bytes[from..].iter().position(|&b| b == b'"').map(|i| from + i)
    };

    loop {
        let Some(key_start) = find_quote(pos) else { break };
        let Some(key_end) = find_quote(key_start + 1) else { break };
        let Some(value_start) = find_quote(key_end + 1) else { break };
        let Some(value_end) = find_quote(value_start + 1) else { break };

        let key = &content[key_start + 1..key_end];
        let value = &content[value_start + 1..value_end];
        match u32::from_str_radix(value, 16) {
            Ok(codepoint) => {
                map.insert(key.to_string(), codepoint);
            }
            Err(_) => log::warn!("invalid codepoint in JSON: {key} - {value}"),
        }

        pos = value_end + 1;
    }
    map
}

/// Auto-detect TXT vs JSON by the first non-whitespace byte.
pub fn parse_codepoints(content: &str) -> HashMap<String, u32> {
    if content.trim_start().starts_with('{') {
        parse_codepoints_json(content)
    } else {
        parse_codepoints_txt(content)
    }
}

/// A cached, sampleable GPU texture for one icon.
pub struct TextureInfo {
    pub id: Uuid,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub bind_group: wgpu::BindGroup,
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub width: f32,
    pub height: f32,
}

/// LRU bookkeeping: a logical access clock per key. Kept separate from
/// the GPU entries so the policy is testable without a device.
#[derive(Default)]
pub struct LruLedger {
    clock: u64,
    stamps: HashMap<String, u64>,
}

impl LruLedger {
    pub fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.stamps.insert(key.to_string(), self.clock);
    }

    pub fn remove(&mut self, key: &str) {
        self.stamps.remove(key);
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Least-recently-touched key, by linear scan.
    pub fn lru_key(&self) -> Option<String> {
        self.stamps
            .iter()
            .min_by_key(|(_, &stamp)| stamp)
            .map(|(key, _)| key.clone())
    }

    /// The `n` least-recently-touched keys, oldest first (full sort).
    pub fn oldest(&self, n: usize) -> Vec<String> {
        let mut entries: Vec<_> = self.stamps.iter().collect();
        entries.sort_by_key(|(_, &stamp)| stamp);
        entries.into_iter().take(n).map(|(k, _)| k.clone()).collect()
    }
}

/// A bounded key-to-value store with the icon cache's eviction policy:
/// one LRU eviction before inserting at capacity, then a sorted batch
/// when that was not enough. Generic over the entry type so the
/// hit/miss bookkeeping is testable without GPU resources.
pub struct LruCache<T> {
    capacity: usize,
    batch: usize,
    entries: HashMap<String, CacheEntry<T>>,
    ledger: LruLedger,
    eviction_count: u64,
}

struct CacheEntry<T> {
    value: T,
    access_count: u64,
}

impl<T> LruCache<T> {
    pub fn new(capacity: usize, batch: usize) -> Self {
        Self {
            capacity,
            batch,
            entries: HashMap::new(),
            ledger: LruLedger::default(),
            eviction_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn eviction_count(&self) -> u64 {
        self.eviction_count
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Fetch `key`, building the value on a miss.
    ///
    /// A hit only refreshes recency and the access count; it never
    /// evicts or rebuilds. A miss evicts first when at capacity and
    /// inserts nothing when `build` fails.
    pub fn get_or_insert_with(
        &mut self,
        key: &str,
        build: impl FnOnce() -> Option<T>,
    ) -> Option<&T> {
        if !self.entries.contains_key(key) {
            if self.entries.len() >= self.capacity {
                self.evict();
            }
            let value = build()?;
            self.entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    access_count: 0,
                },
            );
        }
        self.ledger.touch(key);
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        Some(&entry.value)
    }

    /// Evict the least-recently-used entry; when the store is still at
    /// or above capacity afterwards, batch-evict the oldest `batch`
    /// entries.
    fn evict(&mut self) {
        let Some(lru_key) = self.ledger.lru_key() else {
            return;
        };
        if let Some(entry) = self.entries.remove(&lru_key) {
            log::debug!(
                "evicted LRU entry {lru_key} (access count {})",
                entry.access_count
            );
        }
        self.ledger.remove(&lru_key);
        self.eviction_count += 1;

        if self.entries.len() >= self.capacity {
            let victims = self.ledger.oldest(self.batch);
            let mut evicted = 0u64;
            for key in victims {
                if self.entries.remove(&key).is_some() {
                    evicted += 1;
                }
                self.ledger.remove(&key);
            }
            self.eviction_count += evicted;
            log::info!(
                "batch evicted {evicted} entries, cache size {}",
                self.entries.len()
            );
        }
    }

    /// Drop every entry whose key starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in stale {
            self.entries.remove(&key);
            self.ledger.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.ledger = LruLedger::default();
    }
}

pub struct IconCache {
    fonts: HashMap<String, FontRasterizer>,
    codepoints: HashMap<String, HashMap<String, u32>>,
    textures: LruCache<TextureInfo>,
}

impl IconCache {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            codepoints: HashMap::new(),
            textures: LruCache::new(MAX_FONT_CACHE_SIZE, EVICTION_BATCH),
        }
    }

    /// Register an icon font from memory together with its codepoint map
    /// (TXT or JSON, auto-detected).
    pub fn load_icon_font(
        &mut self,
        name: &str,
        font_data: Vec<u8>,
        codepoints_data: &str,
        pixel_size: f32,
    ) -> Result<(), FontError> {
        let rasterizer = FontRasterizer::from_bytes(font_data, pixel_size)?;
        let codepoints = parse_codepoints(codepoints_data);
        if codepoints.is_empty() {
            log::warn!("no codepoints loaded for icon font '{name}'");
        }
        log::info!("icon font '{name}' loaded: {} icons", codepoints.len());
        self.fonts.insert(name.to_string(), rasterizer);
        self.codepoints.insert(name.to_string(), codepoints);
        Ok(())
    }

    pub fn unload_icon_font(&mut self, name: &str) {
        self.fonts.remove(name);
        self.codepoints.remove(name);
        self.textures.remove_prefix(&format!("{name}_"));
        log::info!("icon font '{name}' unloaded");
    }

    /// Look up an icon's code point by name. Unknown names resolve to
    /// `None` with a warning; callers degrade to a missing glyph.
    pub fn codepoint(&self, font_name: &str, icon_name: &str) -> Option<u32> {
        let Some(icons) = self.codepoints.get(font_name) else {
            log::warn!("icon font '{font_name}' not found");
            return None;
        };
        let codepoint = icons.get(icon_name).copied();
        if codepoint.is_none() {
            log::warn!("icon '{icon_name}' not found in font '{font_name}'");
        }
        codepoint
    }

    pub fn has_icon(&self, font_name: &str, icon_name: &str) -> bool {
        self.codepoints
            .get(font_name)
            .is_some_and(|icons| icons.contains_key(icon_name))
    }

    pub fn icon_names(&self, font_name: &str) -> Vec<String> {
        self.codepoints
            .get(font_name)
            .map(|icons| icons.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn eviction_count(&self) -> u64 {
        self.textures.eviction_count()
    }

    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    /// Fetch (or rasterize, upload and cache) the texture for one icon
    /// glyph at a quantized size.
    ///
    /// Hits update the entry's access stamp and count. Misses evict
    /// first when at capacity, then rasterize at the quantized size
    /// (restoring the font's previous size), convert coverage to
    /// premultiplied white RGBA and upload a dedicated texture.
    pub fn get_texture_info(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture_bind_group_layout: &wgpu::BindGroupLayout,
        font_name: &str,
        codepoint: u32,
        size: f32,
    ) -> Option<&TextureInfo> {
        let quantized = quantize_size(size);
        let key = format!("{font_name}_{codepoint}_{quantized}");

        let rasterizer = self.fonts.get_mut(font_name)?;
        self.textures.get_or_insert_with(&key, || {
            let glyph = rasterizer.render_glyph(codepoint, quantized as f32)?.clone();
            if glyph.width <= 0 || glyph.height <= 0 {
                log::warn!("empty bitmap for codepoint {codepoint}");
                return None;
            }

            let rgba = coverage_to_rgba(&glyph.bitmap);
            Some(create_icon_texture(
                device,
                queue,
                texture_bind_group_layout,
                &rgba,
                glyph.width as u32,
                glyph.height as u32,
            ))
        })
    }

    pub fn shutdown(&mut self) {
        log::info!(
            "icon cache shut down, total evictions: {}",
            self.textures.eviction_count()
        );
        self.textures.clear();
        self.fonts.clear();
        self.codepoints.clear();
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new()
    }
}

fn create_icon_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> TextureInfo {
    use wgpu::util::DeviceExt;

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Icon Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        // Linear (non-sRGB) keeps the premultiplied byte math exact.
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    let unpadded_bytes_per_row = width * 4;
    let padded_bytes_per_row = unpadded_bytes_per_row
        .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let mut padded = vec![0u8; (padded_bytes_per_row * height) as usize];
    for row in 0..height as usize {
        let dst = row * padded_bytes_per_row as usize;
        let src = row * unpadded_bytes_per_row as usize;
        padded[dst..dst + unpadded_bytes_per_row as usize]
            .copy_from_slice(&rgba[src..src + unpadded_bytes_per_row as usize]);
    }

    let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Icon Upload Buffer"),
        contents: &padded,
        usage: wgpu::BufferUsages::COPY_SRC,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Icon Upload Encoder"),
    });
    encoder.copy_buffer_to_texture(
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
        label: Some("Icon Bind Group"),
    });

    TextureInfo {
        id: Uuid::new_v4(),
        texture,
        view,
        bind_group,
        uv_min: [0.0, 0.0],
        uv_max: [1.0, 1.0],
        width: width as f32,
        height: height as f32,
    }
}
