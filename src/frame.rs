//! Per-frame geometry upload and draw submission.
//!
//! All batches of a frame are staged into one shared transfer buffer
//! (vertices first, then indices), copied into the frame's dedicated
//! vertex/index buffers and drawn in a single render pass. Frame
//! resources rotate through a two-deep ring indexed by the frame
//! counter, bounding CPU/GPU overlap to one frame without explicit
//! fences; buffers only ever grow, so a slot's buffers are never
//! reallocated while the GPU may still read them.

use crate::utils::{BatchUniforms, Rectangle, Vertex};

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// One frame's worth of positioned, colored, optionally textured
/// triangles, submitted by the widget layer. Immutable for the duration
/// of a frame submission.
pub struct RenderBatch<'a> {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub texture: Option<&'a wgpu::BindGroup>,
    pub scissor: Option<Rectangle>,
    pub uniforms: BatchUniforms,
}

#[derive(Default)]
struct FrameResource {
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    vertex_buffer_size: u64,
    index_buffer_size: u64,
}

/// Grow-only doubling policy: the new capacity is the larger of the
/// request and twice the current capacity.
#[inline]
pub fn grown_size(current: u64, needed: u64) -> u64 {
    needed.max(current * 2)
}

/// Scissor bounds for one batch. `None` means the batch's clip rect
/// misses the frame entirely and the batch must not be drawn; a batch
/// without a clip rect gets the full frame.
pub fn resolve_scissor(
    scissor: Option<Rectangle>,
    width: u32,
    height: u32,
) -> Option<(u32, u32, u32, u32)> {
    match scissor {
        Some(rect) => rect.to_scissor(width, height),
        None => Some((0, 0, width, height)),
    }
}

pub struct FrameManager {
    frames: [FrameResource; MAX_FRAMES_IN_FLIGHT],
    frame_counter: u64,
    transfer_buffer: Option<wgpu::Buffer>,
    transfer_buffer_size: u64,
}

impl FrameManager {
    pub fn new() -> Self {
        Self {
            frames: Default::default(),
            frame_counter: 0,
            transfer_buffer: None,
            transfer_buffer_size: 0,
        }
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Upload and draw one frame of batches to `surface`.
    ///
    /// A frame with no geometry is skipped silently; so is a frame whose
    /// swapchain texture cannot be acquired (the next frame retries).
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface: &wgpu::Surface,
        pipeline: &wgpu::RenderPipeline,
        uniform_bind_group_layout: &wgpu::BindGroupLayout,
        fallback_texture: &wgpu::BindGroup,
        clear_color: wgpu::Color,
        width: u32,
        height: u32,
        batches: &[RenderBatch],
    ) {
        let total_vertices: usize = batches.iter().map(|b| b.vertices.len()).sum();
        let total_indices: usize = batches.iter().map(|b| b.indices.len()).sum();
        if total_vertices == 0 || total_indices == 0 {
            return;
        }

        let vertex_size = (total_vertices * std::mem::size_of::<Vertex>()) as u64;
        let index_size = (total_indices * std::mem::size_of::<u16>()) as u64;
        // Buffer copies must be 4-byte aligned; u16 index data may not be.
        let index_copy_size = align_copy(index_size);

        let frame_index = (self.frame_counter % MAX_FRAMES_IN_FLIGHT as u64) as usize;
        self.ensure_transfer_buffer(device, vertex_size + index_copy_size);
        Self::ensure_frame_buffers(
            device,
            &mut self.frames[frame_index],
            vertex_size,
            index_copy_size,
        );

        if !self.stage_batches(device, batches, vertex_size, index_size) {
            log::error!("failed to map transfer buffer");
            return;
        }

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("swapchain texture not ready: {err}");
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // Per-batch uniform bind groups have to outlive the render pass,
        // so they are built up front.
        let uniform_bind_groups: Vec<wgpu::BindGroup> = batches
            .iter()
            .map(|batch| {
                let mut uniforms = batch.uniforms;
                uniforms.screen_size = [width as f32, height as f32];
                create_uniform_bind_group(device, uniform_bind_group_layout, &uniforms)
            })
            .collect();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let resource = &self.frames[frame_index];
        let (Some(vertex_buffer), Some(index_buffer), Some(transfer_buffer)) = (
            resource.vertex_buffer.as_ref(),
            resource.index_buffer.as_ref(),
            self.transfer_buffer.as_ref(),
        ) else {
            return;
        };

        encoder.copy_buffer_to_buffer(transfer_buffer, 0, vertex_buffer, 0, vertex_size);
        encoder.copy_buffer_to_buffer(
            transfer_buffer,
            vertex_size,
            index_buffer,
            0,
            index_copy_size,
        );

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("UI Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(pipeline);
            rpass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            rpass.set_vertex_buffer(0, vertex_buffer.slice(..));
            rpass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);

            let mut vertex_offset = 0u32;
            let mut index_offset = 0u32;
            for (batch, uniform_bind_group) in batches.iter().zip(&uniform_bind_groups) {
                let index_count = batch.indices.len() as u32;
                let base_vertex = vertex_offset as i32;
                let first_index = index_offset;
                // Skipped batches still occupy their staged region.
                vertex_offset += batch.vertices.len() as u32;
                index_offset += index_count;

                if batch.vertices.is_empty() || index_count == 0 {
                    continue;
                }
                let Some(scissor) = resolve_scissor(batch.scissor, width, height) else {
                    continue;
                };
                rpass.set_scissor_rect(scissor.0, scissor.1, scissor.2, scissor.3);

                rpass.set_bind_group(0, batch.texture.unwrap_or(fallback_texture), &[]);
                rpass.set_bind_group(1, uniform_bind_group, &[]);

                rpass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.frame_counter += 1;
    }

    /// Drop the pooled buffers. The caller waits for device idle first.
    pub fn cleanup(&mut self) {
        for frame in &mut self.frames {
            frame.vertex_buffer = None;
            frame.index_buffer = None;
            frame.vertex_buffer_size = 0;
            frame.index_buffer_size = 0;
        }
        self.transfer_buffer = None;
        self.transfer_buffer_size = 0;
    }

    fn ensure_transfer_buffer(&mut self, device: &wgpu::Device, needed: u64) {
        if self.transfer_buffer_size >= needed && self.transfer_buffer.is_some() {
            return;
        }
        self.transfer_buffer_size = grown_size(self.transfer_buffer_size, needed);
        self.transfer_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Transfer Buffer"),
            size: self.transfer_buffer_size,
            usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }));
    }

    fn ensure_frame_buffers(
        device: &wgpu::Device,
        frame: &mut FrameResource,
        vertex_size: u64,
        index_size: u64,
    ) {
        if frame.vertex_buffer_size < vertex_size || frame.vertex_buffer.is_none() {
            frame.vertex_buffer_size = grown_size(frame.vertex_buffer_size, vertex_size);
            frame.vertex_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Frame Vertex Buffer"),
                size: frame.vertex_buffer_size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }

        if frame.index_buffer_size < index_size || frame.index_buffer.is_none() {
            frame.index_buffer_size = grown_size(frame.index_buffer_size, index_size);
            frame.index_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Frame Index Buffer"),
                size: frame.index_buffer_size,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
    }

    /// Map the transfer buffer and lay the frame's geometry out as one
    /// contiguous vertex region followed by one contiguous index region.
    fn stage_batches(
        &self,
        device: &wgpu::Device,
        batches: &[RenderBatch],
        vertex_size: u64,
        index_size: u64,
    ) -> bool {
        let Some(transfer_buffer) = self.transfer_buffer.as_ref() else {
            return false;
        };

        let slice = transfer_buffer.slice(..vertex_size + align_copy(index_size));
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Write, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            _ => return false,
        }

        {
            let mut mapped = slice.get_mapped_range_mut();
            let mut vertex_offset = 0usize;
            let mut index_offset = vertex_size as usize;

            for batch in batches {
                let bytes: &[u8] = bytemuck::cast_slice(&batch.vertices);
                mapped[vertex_offset..vertex_offset + bytes.len()].copy_from_slice(bytes);
                vertex_offset += bytes.len();
            }
            for batch in batches {
                let bytes: &[u8] = bytemuck::cast_slice(&batch.indices);
                mapped[index_offset..index_offset + bytes.len()].copy_from_slice(bytes);
                index_offset += bytes.len();
            }
        }
        transfer_buffer.unmap();
        true
    }
}

impl Default for FrameManager {
    fn default() -> Self {
        Self::new()
    }
}

fn create_uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &BatchUniforms,
) -> wgpu::BindGroup {
    use wgpu::util::DeviceExt;

    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Batch Uniform Buffer"),
        contents: bytemuck::bytes_of(uniforms),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: None,
            }),
        }],
        label: Some("Batch Uniform Bind Group"),
    })
}

#[inline]
fn align_copy(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}
