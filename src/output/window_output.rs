//! Window surface the engine presents its final pass to.

use crate::shader::GpuContext;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::window::Window;

/// Configuration for window output.
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "glslfilter".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Owns the configured surface of a window.
pub struct WindowPresenter {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,
}

impl WindowPresenter {
    /// Configures `surface` for the window's current size.
    pub fn new(gpu: &GpuContext, surface: wgpu::Surface<'static>, window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&gpu.adapter);

        // Chain targets hold plain unorm values; a non-sRGB surface shows them unchanged.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        info!("Configured window surface as {:?}", surface_format);

        Ok(Self { surface, config, window })
    }

    /// Format the present pass must render in.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn resize(&mut self, gpu: &GpuContext, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    /// Acquires the next surface texture, lets `draw` render into it and
    /// presents it.
    pub fn present<F>(&mut self, draw: F) -> Result<()>
    where
        F: FnOnce(&wgpu::TextureView) -> crate::Result<()>,
    {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        draw(&view)?;
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }

    /// Returns a reference to the window.
    pub fn window(&self) -> &Window {
        &self.window
    }
}
