//! Shared GPU context for wgpu resources.

use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::info;
use winit::window::Window;

/// Shared GPU resources used by stages, the engine and the window output.
#[derive(Clone)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initializes a context for offscreen rendering only.
    pub fn headless() -> Result<Self> {
        let instance = Self::create_instance();
        Self::with_instance(instance, None)
    }

    /// Initializes a context compatible with the window, returning the
    /// window's surface alongside it.
    pub fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = Self::create_instance();
        let surface = instance
            .create_surface(window)
            .map_err(|e| Error::Gpu(format!("failed to create surface: {e}")))?;
        let context = Self::with_instance(instance, Some(&surface))?;
        Ok((context, surface))
    }

    /// Number of sampled textures a fragment shader may bind.
    pub fn max_sampled_textures(&self) -> u32 {
        self.device.limits().max_sampled_textures_per_shader_stage
    }

    /// Largest width or height of a 2D texture.
    pub fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    pub fn max_bind_groups(&self) -> u32 {
        self.device.limits().max_bind_groups
    }

    /// Rejects a `width` x `height` texture the device cannot allocate.
    pub fn check_texture_size(&self, name: &str, width: u32, height: u32) -> Result<()> {
        let max = self.max_texture_size();
        if width > max || height > max {
            return Err(Error::TextureTooLarge {
                name: name.to_string(),
                width,
                height,
                max,
            });
        }
        Ok(())
    }

    /// Runs `build` inside a validation error scope. A validation error is
    /// returned instead of reaching the device's uncaptured error handler.
    pub fn capture_validation<T>(
        &self,
        build: impl FnOnce(&wgpu::Device) -> T,
    ) -> std::result::Result<T, wgpu::Error> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(&self.device);
        match pollster::block_on(scope.pop()) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    fn create_instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn with_instance(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::Gpu(format!("failed to obtain GPU adapter: {e}")))?;

        info!(
            "Using GPU adapter: {} (max texture size {})",
            adapter.get_info().name,
            adapter.limits().max_texture_dimension_2d
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("glslfilter Device"),
            required_features: wgpu::Features::empty(),
            // Window and PNG modes share the adapter's real limits.
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| Error::Gpu(format!("failed to create device: {e}")))?;

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }
}
