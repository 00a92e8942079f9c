//! GPU device acquisition with ordered backend fallback.
//!
//! Backends are tried in a fixed order: the platform's primary native
//! API first, then GL, then a software rasterizer adapter. A backend
//! can fail at two points, either while creating the adapter/device or
//! later while claiming a window surface; both tear the current device
//! down and advance to the next backend.

use std::collections::HashMap;
use std::sync::Arc;

use winit::window::{Window, WindowId};

/// One rung of the fallback ladder.
struct BackendConfig {
    name: &'static str,
    backends: wgpu::Backends,
    force_fallback: bool,
}

fn backend_ladder() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            name: "native",
            backends: wgpu::Backends::PRIMARY,
            force_fallback: false,
        },
        BackendConfig {
            name: "gl",
            backends: wgpu::Backends::GL,
            force_fallback: false,
        },
        BackendConfig {
            name: "software",
            backends: wgpu::Backends::all(),
            force_fallback: true,
        },
    ]
}

#[derive(Debug)]
pub enum DeviceError {
    /// No adapter matched the current backend config.
    NoAdapter,
    RequestDevice(wgpu::RequestDeviceError),
    CreateSurface(wgpu::CreateSurfaceError),
    /// Every backend in the ladder was tried and failed.
    Exhausted,
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::NoAdapter => write!(f, "no suitable gpu adapter found"),
            DeviceError::RequestDevice(err) => write!(f, "device request failed: {err}"),
            DeviceError::CreateSurface(err) => write!(f, "surface creation failed: {err}"),
            DeviceError::Exhausted => write!(f, "all gpu backends failed"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub struct ClaimedSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

pub struct DeviceManager {
    ladder: Vec<BackendConfig>,
    ladder_index: usize,
    instance: Option<wgpu::Instance>,
    adapter: Option<wgpu::Adapter>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    surfaces: HashMap<WindowId, ClaimedSurface>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            ladder: backend_ladder(),
            ladder_index: 0,
            instance: None,
            adapter: None,
            device: None,
            queue: None,
            surfaces: HashMap::new(),
        }
    }

    pub fn device(&self) -> Option<&wgpu::Device> {
        self.device.as_ref()
    }

    pub fn queue(&self) -> Option<&wgpu::Queue> {
        self.queue.as_ref()
    }

    pub fn surface(&self, window_id: WindowId) -> Option<&ClaimedSurface> {
        self.surfaces.get(&window_id)
    }

    /// Create instance, adapter, device and queue for the current rung,
    /// advancing down the ladder on failure until one succeeds.
    pub fn initialize(&mut self) -> Result<(), DeviceError> {
        while self.ladder_index < self.ladder.len() {
            match self.try_initialize(self.ladder_index) {
                Ok(()) => {
                    log::info!(
                        "gpu device ready on '{}' backend",
                        self.ladder[self.ladder_index].name
                    );
                    return Ok(());
                }
                Err(err) => {
                    log::warn!(
                        "backend '{}' unavailable: {err}",
                        self.ladder[self.ladder_index].name
                    );
                    self.teardown();
                    self.ladder_index += 1;
                }
            }
        }
        Err(DeviceError::Exhausted)
    }

    fn try_initialize(&mut self, index: usize) -> Result<(), DeviceError> {
        let config = &self.ladder[index];
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback,
        }))
        .ok_or(DeviceError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(DeviceError::RequestDevice)?;

        self.instance = Some(instance);
        self.adapter = Some(adapter);
        self.device = Some(device);
        self.queue = Some(queue);
        Ok(())
    }

    /// Attach a swapchain to `window`. Claiming an already-claimed
    /// window is a no-op. A surface failure on the current backend
    /// tears the device down and retries on the next rung, so every
    /// previously claimed window is invalidated with it.
    pub fn claim_window(
        &mut self,
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        if self.surfaces.contains_key(&window.id()) {
            return Ok(());
        }

        loop {
            if self.device.is_none() {
                self.initialize()?;
            }
            match self.try_claim(window.clone(), width, height) {
                Ok(claimed) => {
                    self.surfaces.insert(window.id(), claimed);
                    return Ok(());
                }
                Err(err) => {
                    log::warn!(
                        "claiming window on '{}' backend failed: {err}",
                        self.ladder[self.ladder_index].name
                    );
                    self.teardown();
                    self.ladder_index += 1;
                    if self.ladder_index >= self.ladder.len() {
                        return Err(DeviceError::Exhausted);
                    }
                }
            }
        }
    }

    fn try_claim(
        &mut self,
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<ClaimedSurface, DeviceError> {
        let (Some(instance), Some(adapter), Some(device)) =
            (self.instance.as_ref(), self.adapter.as_ref(), self.device.as_ref())
        else {
            return Err(DeviceError::NoAdapter);
        };

        let surface = instance
            .create_surface(window)
            .map_err(DeviceError::CreateSurface)?;
        let capabilities = surface.get_capabilities(adapter);
        if capabilities.formats.is_empty() {
            return Err(DeviceError::NoAdapter);
        }

        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .unwrap_or(capabilities.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &config);
        Ok(ClaimedSurface { surface, config })
    }

    pub fn resize_surface(&mut self, window_id: WindowId, width: u32, height: u32) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        if let Some(claimed) = self.surfaces.get_mut(&window_id) {
            claimed.config.width = width.max(1);
            claimed.config.height = height.max(1);
            claimed.surface.configure(device, &claimed.config);
        }
    }

    pub fn release_window(&mut self, window_id: WindowId) {
        self.surfaces.remove(&window_id);
    }

    /// Wait for in-flight GPU work, then drop every surface and the
    /// device. The only point where the CPU blocks on device idle.
    pub fn cleanup(&mut self) {
        if let Some(device) = self.device.as_ref() {
            device.poll(wgpu::Maintain::Wait);
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.surfaces.clear();
        self.queue = None;
        self.device = None;
        self.adapter = None;
        self.instance = None;
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
