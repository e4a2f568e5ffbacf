//! Runs the stages of a chain in order over two ping-pong targets.

use super::binder::Placeholder;
use super::gpu_context::GpuContext;
use super::stage::{FilterStage, StageSpec, CHAIN_FORMAT};
use super::{PREVIOUS_RESULT_BINDING, VIEWPORT_SIZE_BINDING};
use crate::error::{Error, Result};
use crate::frame::{PixelBuffer, ScreenVertex, BYTES_PER_PIXEL};
use crate::uniform::{NumericType, ScalarKind, UniformValue, VectorSize};
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Samples the last chain target onto the window surface.
const PRESENT_SHADER: &str = r#"
#version 450
layout(location = 0) in vec2 fragTexCoord;
layout(location = 0) out vec4 fragColor;
layout(set = 0, binding = 0) uniform texture2D previousResult;
layout(set = 0, binding = 1) uniform sampler previousResultSampler;

void main() {
    fragColor = texture(sampler2D(previousResult, previousResultSampler), fragTexCoord);
}
"#;

const VIEWPORT_SIZE_TYPE: NumericType = NumericType::new(ScalarKind::Int, VectorSize::Two, false);

/// Slot selection for the two alternating offscreen targets.
pub struct PingPong;

impl PingPong {
    pub const TARGETS: usize = 2;

    /// Target stage `stage` renders into.
    pub fn write_slot(stage: usize) -> usize {
        stage % Self::TARGETS
    }

    /// Target holding the previous stage's output. The first stage has none.
    pub fn read_slot(stage: usize) -> Option<usize> {
        stage.checked_sub(1).map(Self::write_slot)
    }

    /// Target holding the result of a chain of `stages` stages.
    pub fn final_slot(stages: usize) -> usize {
        Self::write_slot(stages.saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    /// Surface format for presentation. `None` for headless engines.
    pub present_format: Option<wgpu::TextureFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Rendered,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Owns the stages of a chain and the targets they render through.
pub struct PipelineEngine {
    gpu: GpuContext,
    config: EngineConfig,
    state: EngineState,
    vertex_buffer: wgpu::Buffer,
    placeholder: Placeholder,
    chain_sampler: wgpu::Sampler,
    targets: Vec<RenderTarget>,
    stages: Vec<FilterStage>,
    present: Option<FilterStage>,
}

impl PipelineEngine {
    pub fn new(gpu: &GpuContext, config: EngineConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(Error::Definition(format!(
                "render size {}x{} is empty",
                config.width, config.height
            )));
        }
        gpu.check_texture_size("render target", config.width, config.height)?;

        let vertex_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(ScreenVertex::TRIANGLE),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let chain_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Previous Result Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            placeholder: Placeholder::new(&gpu.device, &gpu.queue),
            gpu: gpu.clone(),
            config,
            state: EngineState::Uninitialized,
            vertex_buffer,
            chain_sampler,
            targets: Vec::new(),
            stages: Vec::new(),
            present: None,
        })
    }

    /// Takes ownership of the chain and allocates the offscreen targets.
    pub fn initialize(&mut self, stages: Vec<FilterStage>) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(Error::AlreadyInitialized);
        }
        if stages.is_empty() {
            return Err(Error::NoStages);
        }

        self.targets = (0..PingPong::TARGETS)
            .map(|i| self.create_target(i))
            .collect();

        if let Some(format) = self.config.present_format {
            let spec = StageSpec {
                fragment_source: PRESENT_SHADER.to_string(),
                ..Default::default()
            };
            self.present = Some(FilterStage::with_target(&self.gpu, &spec, true, format)?);
        }

        info!(
            "Initialized pipeline: {} stages, {}x{}, {} targets",
            stages.len(),
            self.config.width,
            self.config.height,
            self.targets.len()
        );
        self.stages = stages;
        self.state = EngineState::Initialized;
        Ok(())
    }

    /// Builds and initializes the chain from specs in one step.
    pub fn initialize_from_specs(&mut self, specs: &[StageSpec]) -> Result<()> {
        let stages = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| FilterStage::new(&self.gpu, spec, i))
            .collect::<Result<Vec<_>>>()?;
        self.initialize(stages)
    }

    /// Runs every stage once, then the present pass when `present_to` is
    /// given. Nothing is submitted if any stage fails to bind.
    pub fn render(&mut self, present_to: Option<&wgpu::TextureView>) -> Result<()> {
        if self.state == EngineState::Uninitialized {
            return Err(Error::NotInitialized);
        }
        let present = match (present_to, &self.present) {
            (Some(view), Some(stage)) => Some((view, stage)),
            (Some(_), None) => return Err(Error::PresentUnavailable),
            (None, _) => None,
        };

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Filter Chain Encoder"),
        });

        for (i, stage) in self.stages.iter().enumerate() {
            let previous = PingPong::read_slot(i).map(|slot| &self.targets[slot].view);
            let bind_groups = self.bind_stage(stage, previous)?;
            let target = &self.targets[PingPong::write_slot(i)].view;
            self.record_pass(&mut encoder, &format!("Stage {}", i), target, stage, &bind_groups);
            debug!("Recorded stage {} into target {}", i, PingPong::write_slot(i));
        }

        if let Some((view, stage)) = present {
            self.record_present(&mut encoder, view, stage)?;
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.state = EngineState::Rendered;
        Ok(())
    }

    /// Draws the last rendered result onto `view` without running the
    /// chain again.
    pub fn present(&self, view: &wgpu::TextureView) -> Result<()> {
        if self.state != EngineState::Rendered {
            return Err(Error::NothingRendered);
        }
        let stage = self.present.as_ref().ok_or(Error::PresentUnavailable)?;

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
        self.record_present(&mut encoder, view, stage)?;
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Reads the final target back into a tight RGBA buffer.
    pub fn last_render_image(&self) -> Result<PixelBuffer> {
        if self.state != EngineState::Rendered {
            return Err(Error::NothingRendered);
        }

        let (width, height) = (self.config.width, self.config.height);
        let padded_row = (width * BYTES_PER_PIXEL as u32).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let final_target = &self.targets[PingPong::final_slot(self.stages.len())];
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &final_target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.gpu
            .device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| Error::Gpu(format!("device poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| Error::Gpu(format!("readback channel closed: {e}")))?
            .map_err(|e| Error::Gpu(format!("failed to map readback buffer: {e}")))?;

        let data = slice.get_mapped_range().to_vec();
        readback.unmap();

        let image = PixelBuffer::with_stride(width, height, padded_row as usize, data)?;
        Ok(image.into_tight())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Number of offscreen targets allocated, independent of chain length.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn bind_stage(&self, stage: &FilterStage, previous: Option<&wgpu::TextureView>) -> Result<Vec<wgpu::BindGroup>> {
        let mut session = stage.activate();
        let resolution = UniformValue::Int(vec![self.config.width as i32, self.config.height as i32]);
        session.bind_optional_uniform(VIEWPORT_SIZE_BINDING, &VIEWPORT_SIZE_TYPE, &resolution)?;
        if let Some(view) = previous {
            session.bind_texture(PREVIOUS_RESULT_BINDING, view, &self.chain_sampler)?;
        }
        stage.bind_resources(&mut session)?;
        Ok(stage.finish_binding(&self.gpu, session, &self.placeholder))
    }

    fn record_present(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        stage: &FilterStage,
    ) -> Result<()> {
        let last = &self.targets[PingPong::final_slot(self.stages.len())].view;
        let bind_groups = self.bind_stage(stage, Some(last))?;
        self.record_pass(encoder, "Present", view, stage, &bind_groups);
        Ok(())
    }

    fn record_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        stage: &FilterStage,
        bind_groups: &[wgpu::BindGroup],
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        stage.draw(&mut pass, bind_groups, &self.vertex_buffer);
    }

    fn create_target(&self, index: usize) -> RenderTarget {
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Ping-Pong Target {}", index)),
            size: wgpu::Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CHAIN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderTarget { texture, view }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_alternate_write_targets() {
        let slots: Vec<_> = (0..5).map(PingPong::write_slot).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn each_stage_reads_what_the_previous_one_wrote() {
        assert_eq!(PingPong::read_slot(0), None);
        for stage in 1..16 {
            let read = PingPong::read_slot(stage).unwrap();
            assert_eq!(read, PingPong::write_slot(stage - 1));
            assert_ne!(read, PingPong::write_slot(stage));
        }
    }

    #[test]
    fn final_slot_is_last_write() {
        assert_eq!(PingPong::final_slot(1), 0);
        assert_eq!(PingPong::final_slot(2), 1);
        assert_eq!(PingPong::final_slot(3), 0);
        for n in 1..16 {
            assert_eq!(PingPong::final_slot(n), PingPong::write_slot(n - 1));
        }
    }

    #[test]
    fn viewport_uniform_is_ivec2() {
        assert_eq!(VIEWPORT_SIZE_TYPE.scalar, ScalarKind::Int);
        assert_eq!(VIEWPORT_SIZE_TYPE.width(), 2);
        assert!(!VIEWPORT_SIZE_TYPE.is_array);
    }
}
