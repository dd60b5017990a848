use crate::cli::Args;
use anyhow::{Context, Result};
use pixels::{Pixels, SurfaceTexture};
use rand::Rng;
use sct_core::{KeyClass, Phase, QueuedInput};
use sct_render::TaskRenderer;
use sct_task::{AbortFlag, JsonLinesSink, Session, SessionEvent, TaskConfig};
use sct_timing::{HighPrecisionTimer, Timer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Icon, Window, WindowId},
};

type TaskSession = Session<HighPrecisionTimer, QueuedInput, JsonLinesSink>;

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    session: TaskSession,
    renderer: Option<TaskRenderer>,
    abort: AbortFlag,
    icon: Option<Icon>,
    windowed: bool,
    scale_factor: f64,
    refresh_rate: Option<f64>,
    should_exit: bool,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => TaskConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TaskConfig::default(),
        };
        if args.no_practice {
            config.practice_reps = 0;
        }

        let seed = args.seed.unwrap_or_else(|| rand::rng().random());
        let sink = JsonLinesSink::create(&log_path(&args))?;
        info!(
            participant = %args.participant,
            session = %args.session,
            seed,
            log = %sink.path().display(),
            "session configured"
        );

        let abort = AbortFlag::new();
        let timer = HighPrecisionTimer::new();
        let session = Session::new(config, timer, QueuedInput::new(), sink, seed, abort.clone())?;

        Ok(Self {
            window: None,
            pixels: None,
            session,
            renderer: None,
            abort,
            icon: load_icon("assets/icon.png"),
            windowed: args.windowed,
            scale_factor: 1.0,
            refresh_rate: None,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        println!("=== STOP-CHANGE TASK ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
        println!("Press SPACE to start or ESC to abort.\n");

        event_loop.run_app(&mut self).map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow::anyhow!("No monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let fullscreen = if self.windowed {
            None
        } else {
            Some(Fullscreen::Borderless(Some(primary_monitor.clone())))
        };
        let window_attributes = Window::default_attributes()
            .with_title("Stop-Change Task")
            .with_fullscreen(fullscreen)
            .with_resizable(false)
            .with_window_icon(self.icon.clone());

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let physical_size = window.inner_size();
        self.scale_factor = window.scale_factor();

        info!(
            width = physical_size.width,
            height = physical_size.height,
            scale = self.scale_factor,
            refresh_hz = self.refresh_rate,
            "display configured"
        );

        let surface_texture =
            SurfaceTexture::new(physical_size.width, physical_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            physical_size.width,
            physical_size.height,
            surface_texture,
        )?);
        self.renderer = Some(TaskRenderer::new(
            physical_size.width,
            physical_size.height,
        )?);

        window.set_cursor_visible(false);
        window.request_redraw();
        self.window = Some(window);

        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut())
        else {
            return Ok(());
        };

        let start = self.session.timer().now();
        let visuals = self.session.visuals().clone();
        let progress = if self.session.phase().is_main() {
            self.session.trial_progress()
        } else {
            None
        };

        renderer.render_frame(&visuals, progress, pixels.frame_mut())?;
        pixels.render()?;

        // Feed actual frame durations into the calibration stats.
        let elapsed = self.session.timer().elapsed(start);
        self.session.timer_mut().record_frame(elapsed);

        Ok(())
    }

    fn update(&mut self) {
        for event in self.session.update() {
            debug!(?event, "session event");
            match event {
                SessionEvent::Aborted | SessionEvent::SessionComplete => {
                    self.should_exit = true;
                }
                _ => {}
            }
        }
    }

    fn handle_input(&mut self, key: winit::keyboard::PhysicalKey, event_loop: &ActiveEventLoop) {
        use winit::keyboard::{KeyCode, PhysicalKey};
        let PhysicalKey::Code(code) = key else {
            return;
        };
        match code {
            KeyCode::ArrowLeft | KeyCode::Digit1 | KeyCode::Numpad1 => {
                self.session.push_key(KeyClass::Left);
            }
            KeyCode::ArrowRight | KeyCode::Digit2 | KeyCode::Numpad2 => {
                self.session.push_key(KeyClass::Right);
            }
            KeyCode::ArrowDown => {
                self.session.push_key(KeyClass::Change);
            }
            KeyCode::Space => {
                self.session.handle_space();
                if self.session.is_done() {
                    self.cleanup_and_exit(event_loop);
                }
            }
            KeyCode::Escape => {
                // Cooperative: the session flushes completed trials on
                // its next tick and reports Aborted.
                self.abort.raise();
            }
            _ => {}
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                warn!(error = %e, "surface resize failed");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                warn!(error = %e, "buffer resize failed");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(new_size.width, new_size.height);
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        println!("\nSession ended.");
        println!("Trials recorded: {}", self.session.records().len());

        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                eprintln!("Failed to create window and surface: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.abort.raise();
                self.update();
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render() {
                    eprintln!("Render error: {}", e);
                }
                self.update();
                if self.should_exit {
                    self.cleanup_and_exit(event_loop);
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_input(event.physical_key, event_loop);
            }
            WindowEvent::Resized(new_size) => self.handle_resize(new_size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

fn log_path(args: &Args) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    args.output.join(format!(
        "{}_StopChangeTask_{}_{}.jsonl",
        args.participant, args.session, stamp
    ))
}

fn load_icon(path: &str) -> Option<Icon> {
    let image = image::open(path).ok()?.into_rgba8();
    let (width, height) = image.dimensions();
    Icon::from_rgba(image.into_raw(), width, height).ok()
}
