extern crate image;

pub mod atlas;
pub mod device;
pub mod font;
pub mod frame;
pub mod icon;
pub mod text_layout;
pub mod utils;

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use winit::window::{Window, WindowId};

use crate::atlas::{AtlasGlyph, AtlasStats, GlyphAtlas};
use crate::device::{DeviceError, DeviceManager};
use crate::font::{FontError, FontRasterizer};
use crate::frame::{FrameManager, RenderBatch};
use crate::icon::{IconCache, TextureInfo};
use crate::text_layout::WrapMode;
use crate::utils::BatchUniforms;

/// Host-tunable knobs, deserializable from a config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCoreConfig {
    pub atlas_size: u32,
    pub atlas_padding: u32,
    pub font_pixel_size: f32,
    pub clear_color: [f64; 4],
}

impl Default for RenderCoreConfig {
    fn default() -> Self {
        Self {
            atlas_size: 2048,
            atlas_padding: 2,
            font_pixel_size: 16.0,
            clear_color: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

/// The rendering resource core: owns the GPU device, the UI font and its
/// glyph atlas, the icon texture cache and the per-frame buffer ring.
///
/// GPU-backed resources come up lazily when the first window is claimed;
/// text measurement and wrapping work as soon as a font is loaded.
pub struct RenderCore {
    config: RenderCoreConfig,
    devices: DeviceManager,
    font: Option<FontRasterizer>,
    atlas: Option<GlyphAtlas>,
    icons: IconCache,
    frames: FrameManager,
    texture_bind_group_layout: Option<wgpu::BindGroupLayout>,
    uniform_bind_group_layout: Option<wgpu::BindGroupLayout>,
    white_bind_group: Option<wgpu::BindGroup>,
    pipeline: Option<wgpu::RenderPipeline>,
    pipeline_format: Option<wgpu::TextureFormat>,
}

impl RenderCore {
    pub fn new(config: RenderCoreConfig) -> Self {
        Self {
            config,
            devices: DeviceManager::new(),
            font: None,
            atlas: None,
            icons: IconCache::new(),
            frames: FrameManager::new(),
            texture_bind_group_layout: None,
            uniform_bind_group_layout: None,
            white_bind_group: None,
            pipeline: None,
            pipeline_format: None,
        }
    }

    pub fn config(&self) -> &RenderCoreConfig {
        &self.config
    }

    pub fn frame_counter(&self) -> u64 {
        self.frames.frame_counter()
    }

    /* WINDOW AND DEVICE LIFECYCLE */

    /// Claim `window` for rendering, bringing the device and the shared
    /// GPU resources up if this is the first claim.
    pub fn claim_window(
        &mut self,
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        self.devices.claim_window(window.clone(), width, height)?;
        let format = self
            .devices
            .surface(window.id())
            .map(|claimed| claimed.config.format)
            .ok_or(DeviceError::NoAdapter)?;
        self.ensure_gpu_resources(format);
        Ok(())
    }

    /// Bring the device and shared GPU resources up without a window.
    /// Debug tooling uses this path; rendering still requires a claim.
    pub fn initialize_headless(&mut self) -> Result<(), DeviceError> {
        self.devices.initialize()?;
        self.ensure_gpu_resources(wgpu::TextureFormat::Bgra8UnormSrgb);
        Ok(())
    }

    pub fn resize(&mut self, window_id: WindowId, width: u32, height: u32) {
        self.devices.resize_surface(window_id, width, height);
    }

    pub fn release_window(&mut self, window_id: WindowId) {
        self.devices.release_window(window_id);
    }

    /// Release every GPU resource. Waits for the device to go idle
    /// before tearing it down; safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(device) = self.devices.device() {
            device.poll(wgpu::Maintain::Wait);
        }
        self.icons.shutdown();
        self.frames.cleanup();
        self.atlas = None;
        self.white_bind_group = None;
        self.pipeline = None;
        self.pipeline_format = None;
        self.uniform_bind_group_layout = None;
        self.texture_bind_group_layout = None;
        self.devices.cleanup();
    }

    /* TEXT */

    pub fn load_font(&mut self, data: Vec<u8>) -> Result<(), FontError> {
        self.font = Some(FontRasterizer::from_bytes(
            data,
            self.config.font_pixel_size,
        )?);
        Ok(())
    }

    pub fn font_height(&self) -> i32 {
        self.font.as_ref().map_or(0, FontRasterizer::font_height)
    }

    pub fn baseline(&self) -> i32 {
        self.font.as_ref().map_or(0, FontRasterizer::baseline)
    }

    pub fn measure_text_width(&mut self, text: &str, size: f32) -> f32 {
        match self.font.as_mut() {
            Some(font) => font.with_pixel_size(size, |font| font.measure_text_width(text)),
            None => 0.0,
        }
    }

    /// Width of the longest prefix of `text` that fits in `max_width`,
    /// plus the number of bytes it consumed.
    pub fn measure_string(&mut self, text: &str, max_width: f32, size: f32) -> (f32, usize) {
        match self.font.as_mut() {
            Some(font) => {
                font.with_pixel_size(size, |font| font.measure_string(text, max_width))
            }
            None => (0.0, 0),
        }
    }

    pub fn wrap_text(
        &mut self,
        text: &str,
        max_width: f32,
        mode: WrapMode,
        size: f32,
    ) -> Vec<String> {
        match self.font.as_mut() {
            Some(font) => font.with_pixel_size(size, |font| {
                text_layout::wrap_text(text, max_width, mode, |line| {
                    font.measure_text_width(line)
                })
            }),
            None => vec![text.to_string()],
        }
    }

    /* GLYPH ATLAS */

    /// Fetch `codepoint` from the atlas, rasterizing and packing it on a
    /// miss. `None` before a font is loaded, before the device is up, or
    /// when the glyph cannot fit even in a fully expanded atlas.
    pub fn get_or_add_glyph(&mut self, codepoint: u32) -> Option<AtlasGlyph> {
        let atlas = self.atlas.as_mut()?;
        if let Some(existing) = atlas.get_glyph(codepoint) {
            return Some(existing);
        }

        let device = self.devices.device()?;
        let queue = self.devices.queue()?;
        let layout = self.texture_bind_group_layout.as_ref()?;
        let pixel_size = self.config.font_pixel_size;
        let glyph = self
            .font
            .as_mut()?
            .render_glyph(codepoint, pixel_size)?
            .clone();

        atlas.add_glyph(
            device,
            queue,
            layout,
            codepoint,
            &glyph.bitmap,
            glyph.width,
            glyph.height,
            glyph.bearing_x,
            glyph.bearing_y,
            glyph.advance_x,
        )
    }

    pub fn atlas_generation(&self) -> u64 {
        self.atlas.as_ref().map_or(0, GlyphAtlas::generation)
    }

    pub fn atlas_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.atlas.as_ref().map(GlyphAtlas::bind_group)
    }

    pub fn atlas_stats(&self) -> Option<AtlasStats> {
        self.atlas.as_ref().map(GlyphAtlas::stats)
    }

    pub fn save_atlas_debug_png(&self, path: &str) -> anyhow::Result<()> {
        let atlas = self
            .atlas
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("atlas not initialized"))?;
        let device = self
            .devices
            .device()
            .ok_or_else(|| anyhow::anyhow!("device not initialized"))?;
        let queue = self
            .devices
            .queue()
            .ok_or_else(|| anyhow::anyhow!("device not initialized"))?;
        atlas.save_debug_png(device, queue, path)
    }

    /* ICONS */

    pub fn load_icon_font(
        &mut self,
        name: &str,
        font_data: Vec<u8>,
        codepoints_data: &str,
    ) -> Result<(), FontError> {
        self.icons
            .load_icon_font(name, font_data, codepoints_data, self.config.font_pixel_size)
    }

    pub fn unload_icon_font(&mut self, name: &str) {
        self.icons.unload_icon_font(name);
    }

    pub fn icon_codepoint(&self, font_name: &str, icon_name: &str) -> Option<u32> {
        self.icons.codepoint(font_name, icon_name)
    }

    /// Registry and cache-statistics queries live on the cache itself.
    pub fn icons(&self) -> &IconCache {
        &self.icons
    }

    /// Fetch an icon glyph's standalone texture at (quantized) `size`,
    /// rendering it on a miss and evicting least-recently-used entries
    /// when the cache is full.
    pub fn get_icon_texture(
        &mut self,
        font_name: &str,
        codepoint: u32,
        size: f32,
    ) -> Option<&TextureInfo> {
        let device = self.devices.device()?;
        let queue = self.devices.queue()?;
        let layout = self.texture_bind_group_layout.as_ref()?;
        self.icons
            .get_texture_info(device, queue, layout, font_name, codepoint, size)
    }

    /* FRAME SUBMISSION */

    /// Upload and draw a frame of batches to `window_id`'s surface.
    pub fn render(&mut self, window_id: WindowId, batches: &[RenderBatch]) {
        let (Some(device), Some(queue)) = (self.devices.device(), self.devices.queue()) else {
            return;
        };
        let Some(claimed) = self.devices.surface(window_id) else {
            log::warn!("render on unclaimed window");
            return;
        };
        let (Some(pipeline), Some(uniform_layout), Some(white)) = (
            self.pipeline.as_ref(),
            self.uniform_bind_group_layout.as_ref(),
            self.white_bind_group.as_ref(),
        ) else {
            return;
        };

        let [r, g, b, a] = self.config.clear_color;
        self.frames.execute(
            device,
            queue,
            &claimed.surface,
            pipeline,
            uniform_layout,
            white,
            wgpu::Color { r, g, b, a },
            claimed.config.width,
            claimed.config.height,
            batches,
        );
    }

    /* SHARED GPU RESOURCES */

    fn ensure_gpu_resources(&mut self, format: wgpu::TextureFormat) {
        let Some(device) = self.devices.device() else {
            return;
        };
        let Some(queue) = self.devices.queue() else {
            return;
        };

        if self.texture_bind_group_layout.is_none() {
            self.texture_bind_group_layout = Some(device.create_bind_group_layout(
                &wgpu::BindGroupLayoutDescriptor {
                    label: Some("texture_bind_group_layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                multisampled: false,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                },
            ));
        }

        if self.uniform_bind_group_layout.is_none() {
            self.uniform_bind_group_layout = Some(device.create_bind_group_layout(
                &wgpu::BindGroupLayoutDescriptor {
                    label: Some("uniform_bind_group_layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<BatchUniforms>() as _,
                            ),
                        },
                        count: None,
                    }],
                },
            ));
        }

        let (Some(texture_layout), Some(uniform_layout)) = (
            self.texture_bind_group_layout.as_ref(),
            self.uniform_bind_group_layout.as_ref(),
        ) else {
            return;
        };

        if self.white_bind_group.is_none() {
            self.white_bind_group = Some(create_white_bind_group(device, queue, texture_layout));
        }

        if self.atlas.is_none() {
            self.atlas = Some(GlyphAtlas::new(
                device,
                texture_layout,
                self.config.atlas_size,
                self.config.atlas_padding,
            ));
        }

        if self.pipeline.is_none() || self.pipeline_format != Some(format) {
            self.pipeline = Some(create_pipeline(device, texture_layout, uniform_layout, format));
            self.pipeline_format = Some(format);
        }
    }
}

/// Untextured batches bind a 1x1 opaque white texture so the pipeline
/// needs no variant without a sampler.
fn create_white_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::BindGroup {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("White Texture"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255u8; 4],
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
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
        label: Some("White Bind Group"),
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    texture_bind_group_layout: &wgpu::BindGroupLayout,
    uniform_bind_group_layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("UI Shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("../shaders/ui.wgsl"))),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("UI Pipeline Layout"),
        bind_group_layouts: &[texture_bind_group_layout, uniform_bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("UI Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<utils::Vertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                // premultiplied alpha
                blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
