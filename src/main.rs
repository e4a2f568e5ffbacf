//! glslfilter: chain GLSL fragment shaders over an image on the GPU.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use glslfilter::loader::{self, LoadedDefinition};
use glslfilter::output::{PngExport, WindowConfig, WindowPresenter};
use glslfilter::shader::{EngineConfig, GpuContext, PipelineEngine, StageSpec};
use glslfilter::utils::PerfTimer;
use std::fs::File;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{WindowAttributes, WindowId};

/// Where the final image goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Show the result in a window until it is closed
    Window,
    /// Write the result as PNG
    Png,
}

/// Apply a chain of GLSL fragment shaders to an image.
#[derive(Parser, Debug)]
#[command(name = "glslfilter")]
#[command(about = "Chain GLSL fragment shader passes over an image on the GPU")]
struct Args {
    /// Filter definition (YAML, or JSON with a .json extension). Read from
    /// stdin when omitted
    #[arg(short, long)]
    definition: Option<PathBuf>,

    /// Output mode. Defaults to window when stdout is a terminal, png otherwise
    #[arg(short, long, value_enum)]
    output: Option<OutputMode>,

    /// Write the PNG to this file instead of stdout
    #[arg(long)]
    png_path: Option<PathBuf>,
}

/// Event loop state for window mode.
struct FilterApp {
    config: WindowConfig,
    specs: Vec<StageSpec>,
    timer: PerfTimer,
    window: Option<Arc<winit::window::Window>>,
    gpu: Option<GpuContext>,
    presenter: Option<WindowPresenter>,
    engine: Option<PipelineEngine>,
    rendered: bool,
    failure: Option<anyhow::Error>,
}

impl FilterApp {
    fn new(config: WindowConfig, specs: Vec<StageSpec>, timer: PerfTimer) -> Self {
        Self {
            config,
            specs,
            timer,
            window: None,
            gpu: None,
            presenter: None,
            engine: None,
            rendered: false,
            failure: None,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(window_attrs).context("failed to create window")?);

        let (gpu, surface) = GpuContext::for_window(window.clone())?;
        let presenter = WindowPresenter::new(&gpu, surface, window.clone())?;

        let mut engine = PipelineEngine::new(
            &gpu,
            EngineConfig {
                width: self.config.width,
                height: self.config.height,
                present_format: Some(presenter.format()),
            },
        )?;
        engine.initialize(loader::build_stages(&gpu, &self.specs)?)?;
        self.timer.log_split("init");

        window.request_redraw();
        self.window = Some(window);
        self.gpu = Some(gpu);
        self.presenter = Some(presenter);
        self.engine = Some(engine);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(presenter), Some(engine)) = (&mut self.presenter, &mut self.engine) else {
            return Ok(());
        };
        // The chain runs once. Later redraws (expose, resize) show the
        // cached final target.
        if self.rendered {
            presenter.present(|view| engine.present(view))?;
        } else {
            presenter.present(|view| engine.render(Some(view)))?;
            self.rendered = true;
            self.timer.log_split("render");
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for FilterApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.initialize(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let (Some(presenter), Some(gpu)) = (&mut self.presenter, &self.gpu) {
                    presenter.resize(gpu, size);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so a piped PNG on stdout stays intact.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let mut timer = PerfTimer::new();

    let loaded = loader::read_definition(args.definition.as_deref())?;
    let specs = loaded.stage_specs()?;

    let output = args.output.unwrap_or_else(|| {
        if std::io::stdout().is_terminal() {
            OutputMode::Window
        } else {
            OutputMode::Png
        }
    });
    info!("Running {} stages with {:?} output", specs.len(), output);

    match output {
        OutputMode::Window => run_window_mode(&loaded, specs, timer),
        OutputMode::Png => run_png_mode(&loaded, &specs, &mut timer, args.png_path),
    }
}

fn run_window_mode(loaded: &LoadedDefinition, specs: Vec<StageSpec>, timer: PerfTimer) -> Result<()> {
    let render = loaded.definition.render;
    let config = WindowConfig {
        width: render.width,
        height: render.height,
        ..Default::default()
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = FilterApp::new(config, specs, timer);
    event_loop.run_app(&mut app)?;

    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_png_mode(
    loaded: &LoadedDefinition,
    specs: &[StageSpec],
    timer: &mut PerfTimer,
    png_path: Option<PathBuf>,
) -> Result<()> {
    let render = loaded.definition.render;
    let gpu = GpuContext::headless()?;

    let mut engine = PipelineEngine::new(
        &gpu,
        EngineConfig {
            width: render.width,
            height: render.height,
            present_format: None,
        },
    )?;
    engine.initialize(loader::build_stages(&gpu, specs)?)?;
    timer.log_split("init");

    engine.render(None)?;
    timer.log_split("render");

    let image = engine.last_render_image()?;
    let writer: Box<dyn Write + Send> = match &png_path {
        Some(path) => Box::new(File::create(path).with_context(|| format!("failed to create {:?}", path))?),
        None => Box::new(std::io::stdout()),
    };

    info!("Writing PNG");
    let export = PngExport::spawn(image, writer);
    export.join()?;
    timer.log_split("PNG written");
    Ok(())
}
