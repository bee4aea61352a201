//! quadshade CLI.

use anyhow::{Context, Result};
use clap::Parser;
use quadshade::config::{AppConfig, ConfigOverrides, GpuErrorPolicy};
use quadshade::output::WindowRenderer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

/// Exit code when the window or GPU cannot be set up.
const EXIT_INIT_FAILURE: i32 = -1;

/// Draw an animated quad from a two-section GLSL shader file.
#[derive(Parser, Debug)]
#[command(name = "quadshade")]
#[command(about = "Draw an animated quad from a two-section GLSL shader file")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shader file with `#shader vertex` and `#shader fragment` sections
    #[arg(short, long)]
    shader: Option<PathBuf>,

    /// Window width
    #[arg(long)]
    width: Option<u32>,

    /// Window height
    #[arg(long)]
    height: Option<u32>,

    /// Window title
    #[arg(long)]
    title: Option<String>,

    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// What to do when a GPU call fails validation
    #[arg(long, value_enum)]
    gpu_error_policy: Option<GpuErrorPolicy>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            shader: self.shader.clone(),
            log_level: self.log_level.clone(),
            gpu_error_policy: self.gpu_error_policy,
        }
    }
}

/// Application state for the event loop.
struct QuadApp {
    config: AppConfig,
    window: Option<Arc<Window>>,
    renderer: Option<WindowRenderer>,
    init_error: Option<anyhow::Error>,
}

impl QuadApp {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            init_error: None,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attrs = WindowAttributes::default()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .context("Failed to create window")?,
        );
        self.window = Some(window.clone());

        let renderer = WindowRenderer::new(window, &self.config).context("Failed to create renderer")?;
        self.renderer = Some(renderer);
        info!("Window created successfully");
        Ok(())
    }
}

impl ApplicationHandler for QuadApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.initialize(event_loop) {
            self.init_error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = &mut self.renderer {
                    if let Err(e) = renderer.render() {
                        error!("Render error: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            renderer.window().request_redraw();
        }
    }
}

fn run(config: AppConfig) -> Result<()> {
    config.log_level()?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = QuadApp::new(config);
    event_loop.run_app(&mut app)?;

    match app.init_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() {
    let args = Args::parse();
    let config = AppConfig::resolve(args.config.as_deref(), args.overrides());

    let level = config
        .as_ref()
        .ok()
        .and_then(|config| config.log_level().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting quadshade...");
    let result = config.map_err(anyhow::Error::from).and_then(run);
    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(EXIT_INIT_FAILURE);
    }
}
