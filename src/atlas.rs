//! Shelf bin packing glyph atlas.
//!
//! Allocation is append-only within a generation: positions are handed
//! out left to right along horizontal shelves and never reused. When the
//! page fills up the atlas doubles (up to [`GlyphAtlas::MAX_SIZE`]) and
//! discards its entire packing state; every previously returned
//! [`AtlasGlyph`] becomes stale and callers must re-submit bitmaps. The
//! generation counter makes that staleness observable.

use std::collections::HashMap;

/// A glyph's placement in the atlas: normalized UVs, pixel rect and the
/// metrics needed to position it at draw time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AtlasGlyph {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub bearing_x: i32,
    pub bearing_y: i32,
    pub advance_x: f32,
}

/// One packing row. Height is fixed by the first glyph placed in it.
#[derive(Copy, Clone, Debug)]
struct Shelf {
    y: u32,
    height: u32,
    x_cursor: u32,
}

/// Pure shelf allocator; the GPU texture is managed by [`GlyphAtlas`].
///
/// First-fit over shelves in creation order, accepting some vertical
/// waste in exchange for a trivial data structure.
pub struct ShelfPacker {
    size: u32,
    padding: u32,
    shelves: Vec<Shelf>,
    cursor_y: u32,
}

impl ShelfPacker {
    pub fn new(size: u32, padding: u32) -> Self {
        Self {
            size,
            padding,
            shelves: Vec::new(),
            cursor_y: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn shelf_count(&self) -> usize {
        self.shelves.len()
    }

    /// Reserve a `width` x `height` region (padding added to both
    /// dimensions). Returns the top-left corner, or `None` when neither
    /// an existing shelf nor the remaining vertical space can take it.
    pub fn allocate(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        let padded_w = width + self.padding;
        let padded_h = height + self.padding;

        for shelf in &mut self.shelves {
            if shelf.height >= padded_h && shelf.x_cursor + padded_w <= self.size {
                let x = shelf.x_cursor;
                shelf.x_cursor += padded_w;
                return Some((x, shelf.y));
            }
        }

        if self.cursor_y + padded_h <= self.size {
            let shelf = Shelf {
                y: self.cursor_y,
                height: padded_h,
                x_cursor: padded_w,
            };
            self.cursor_y += padded_h;
            self.shelves.push(shelf);
            return Some((0, shelf.y));
        }

        None
    }

    /// Discard all placements, optionally adopting a new page size.
    pub fn reset(&mut self, size: u32) {
        self.size = size;
        self.shelves.clear();
        self.cursor_y = 0;
    }
}

/// Atlas utilization counters.
#[derive(Copy, Clone, Debug, Default)]
pub struct AtlasStats {
    pub atlas_size: u32,
    pub glyph_count: usize,
    pub shelf_count: usize,
    pub used_pixels: u64,
    pub utilization: f32,
}

/// A single `R8Unorm` GPU page of packed glyph coverage bitmaps.
pub struct GlyphAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    size: u32,
    padding: u32,
    generation: u64,
    packer: ShelfPacker,
    glyph_map: HashMap<u32, AtlasGlyph>,
}

impl GlyphAtlas {
    pub const MAX_SIZE: u32 = 4096;

    pub fn new(
        device: &wgpu::Device,
        texture_bind_group_layout: &wgpu::BindGroupLayout,
        initial_size: u32,
        padding: u32,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let (texture, view, bind_group) =
            Self::create_page(device, texture_bind_group_layout, &sampler, initial_size);
        log::info!("created {0}x{0} glyph atlas", initial_size);

        Self {
            texture,
            view,
            bind_group,
            sampler,
            size: initial_size,
            padding,
            generation: 0,
            packer: ShelfPacker::new(initial_size, padding),
            glyph_map: HashMap::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bumped on every clear or expansion; any [`AtlasGlyph`] obtained
    /// under an older generation is stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn get_glyph(&self, codepoint: u32) -> Option<AtlasGlyph> {
        self.glyph_map.get(&codepoint).copied()
    }

    /// Pack a coverage bitmap, uploading it to the page.
    ///
    /// Returns the cached entry when `codepoint` is already packed. On a
    /// full page the atlas expands (doubling, capped at `MAX_SIZE`) and
    /// drops all prior placements; failure to fit even after expansion
    /// returns `None` and the glyph simply does not render.
    #[allow(clippy::too_many_arguments)]
    pub fn add_glyph(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture_bind_group_layout: &wgpu::BindGroupLayout,
        codepoint: u32,
        bitmap: &[u8],
        width: i32,
        height: i32,
        bearing_x: i32,
        bearing_y: i32,
        advance_x: f32,
    ) -> Option<AtlasGlyph> {
        if let Some(existing) = self.glyph_map.get(&codepoint) {
            return Some(*existing);
        }

        if width <= 0 || height <= 0 {
            let glyph = AtlasGlyph {
                u0: 0.0,
                v0: 0.0,
                u1: 0.0,
                v1: 0.0,
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                bearing_x,
                bearing_y,
                advance_x,
            };
            self.glyph_map.insert(codepoint, glyph);
            return Some(glyph);
        }

        let (w, h) = (width as u32, height as u32);
        let position = match self.packer.allocate(w, h) {
            Some(position) => position,
            None => {
                if !self.expand(device, texture_bind_group_layout) {
                    log::error!("atlas cannot fit codepoint {codepoint} even at max size");
                    return None;
                }
                self.packer.allocate(w, h)?
            }
        };

        self.upload_bitmap(device, queue, bitmap, position, w, h);

        let page = self.size as f32;
        let glyph = AtlasGlyph {
            u0: position.0 as f32 / page,
            v0: position.1 as f32 / page,
            u1: (position.0 + w) as f32 / page,
            v1: (position.1 + h) as f32 / page,
            x: position.0 as i32,
            y: position.1 as i32,
            width,
            height,
            bearing_x,
            bearing_y,
            advance_x,
        };
        self.glyph_map.insert(codepoint, glyph);
        Some(glyph)
    }

    pub fn clear(&mut self) {
        self.glyph_map.clear();
        self.packer.reset(self.size);
        self.generation += 1;
        log::info!("cleared glyph atlas");
    }

    pub fn stats(&self) -> AtlasStats {
        let used_pixels: u64 = self
            .glyph_map
            .values()
            .map(|g| g.width as u64 * g.height as u64)
            .sum();
        let total = u64::from(self.size) * u64::from(self.size);
        AtlasStats {
            atlas_size: self.size,
            glyph_count: self.glyph_map.len(),
            shelf_count: self.packer.shelf_count(),
            used_pixels,
            utilization: if total > 0 {
                used_pixels as f32 / total as f32
            } else {
                0.0
            },
        }
    }

    /// Read the page back and save it as a grayscale PNG. Debug aid.
    pub fn save_debug_png(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &str,
    ) -> anyhow::Result<()> {
        let bytes_per_row = align_to(self.size, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Atlas Readback Buffer"),
            size: u64::from(bytes_per_row) * u64::from(self.size),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Atlas Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.size),
                },
            },
            wgpu::Extent3d {
                width: self.size,
                height: self.size,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((self.size * self.size) as usize);
        for row in 0..self.size {
            let start = (row * bytes_per_row) as usize;
            pixels.extend_from_slice(&mapped[start..start + self.size as usize]);
        }
        drop(mapped);
        readback.unmap();

        let image = image::GrayImage::from_raw(self.size, self.size, pixels)
            .ok_or_else(|| anyhow::anyhow!("atlas readback size mismatch"))?;
        image.save(path)?;
        Ok(())
    }

    fn expand(&mut self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> bool {
        if self.size >= Self::MAX_SIZE {
            log::warn!("atlas already at max size {}", Self::MAX_SIZE);
            return false;
        }

        let new_size = self.size * 2;
        log::info!("expanding atlas {0}x{0} -> {1}x{1}", self.size, new_size);

        let (texture, view, bind_group) =
            Self::create_page(device, layout, &self.sampler, new_size);
        self.texture = texture;
        self.view = view;
        self.bind_group = bind_group;
        self.size = new_size;

        // No partial copy on resize: the old page is dropped wholesale
        // and callers must re-submit every bitmap.
        self.glyph_map.clear();
        self.packer.reset(new_size);
        self.generation += 1;
        log::warn!("atlas expansion invalidated all packed glyphs");
        true
    }

    fn create_page(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        size: u32,
    ) -> (wgpu::Texture, wgpu::TextureView, wgpu::BindGroup) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Glyph Atlas Texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some("Glyph Atlas Bind Group"),
        });
        (texture, view, bind_group)
    }

    fn upload_bitmap(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bitmap: &[u8],
        position: (u32, u32),
        width: u32,
        height: u32,
    ) {
        use wgpu::util::DeviceExt;

        let padded_bytes_per_row = align_to(width, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let mut padded = vec![0u8; (padded_bytes_per_row * height) as usize];
        for row in 0..height as usize {
            let dst = row * padded_bytes_per_row as usize;
            let src = row * width as usize;
            padded[dst..dst + width as usize].copy_from_slice(&bitmap[src..src + width as usize]);
        }

        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Glyph Upload Buffer"),
            contents: &padded,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Glyph Upload Encoder"),
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
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: position.0,
                    y: position.1,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));
    }
}

#[inline]
fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
