//! Scene viewer
//!
//! Loads a scene description (`resources/config/viewer.toml` by default, or the path
//! given as the first argument) and shows it with an orbit camera. Right-drag orbits,
//! scrolling zooms and Escape quits.

mod input;

use std::path::{Path, PathBuf};

use thiserror::Error;
use vk_renderer::config::{ConfigError, ViewerConfig};
use vk_renderer::foundation::logging;
use vk_renderer::foundation::time::{FrameLimiter, Timer};
use vk_renderer::render::vulkan::{FrameLoop, FrameOutcome, VulkanError, VulkanRenderer, Window, WindowError};
use vk_renderer::render::{OrbitCamera, RenderError};

use crate::input::{InputAction, InputState};

const DEFAULT_CONFIG: &str = "resources/config/viewer.toml";

/// Everything that can stop the viewer
#[derive(Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error("{path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Window(#[from] WindowError),
}

fn load_config() -> Result<ViewerConfig, ViewerError> {
    let (path, explicit) = match std::env::args().nth(1) {
        Some(arg) => (PathBuf::from(arg), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };

    if !explicit && !Path::new(&path).exists() {
        eprintln!("{DEFAULT_CONFIG} not found, using built-in defaults");
        let config = ViewerConfig::default();
        config
            .validate()
            .map_err(|source| ViewerError::Config { path, source })?;
        return Ok(config);
    }

    ViewerConfig::load_validated(&path).map_err(|source| ViewerError::Config { path, source })
}

fn run() -> Result<(), ViewerError> {
    let config = load_config()?;
    logging::init(&config.engine.log_level);
    log::info!("Starting scene viewer with {} model(s)", config.models.len());

    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
    let mut renderer = VulkanRenderer::new(&mut window, &config)?;

    let extent = renderer.extent();
    let mut camera = OrbitCamera::from_config(&config.camera, 1.0);
    camera.set_aspect(extent.width, extent.height);

    let mut input = InputState::default();
    let mut frames = FrameLoop::new();
    let mut limiter = FrameLimiter::new(config.engine.target_fps);
    let mut timer = Timer::new();

    while !window.should_close() {
        window.poll_events();
        for event in window.flush_events() {
            match input.handle(&event, window.get_cursor_pos()) {
                Some(InputAction::Close) => window.set_should_close(true),
                Some(InputAction::Rotate { dx, dy }) => camera.rotate(dx, dy),
                Some(InputAction::Zoom(steps)) => camera.zoom(steps),
                Some(InputAction::Resize(width, height)) => renderer.notify_resized(width, height),
                None => {}
            }
        }
        if window.should_close() {
            break;
        }

        let (width, height) = window.get_framebuffer_size();
        if width == 0 || height == 0 {
            log::debug!("Window minimized, waiting");
            let (width, height) = window.wait_while_minimized();
            renderer.notify_resized(width, height);
            continue;
        }

        let extent = renderer.extent();
        camera.set_aspect(extent.width, extent.height);
        renderer.set_camera(&camera);

        match frames.render_frame(&mut renderer)? {
            FrameOutcome::Presented => {}
            outcome => log::trace!("Frame {}: {outcome:?}", timer.frame_count()),
        }

        limiter.wait();
        timer.update();
    }

    renderer.wait_idle()?;

    let stats = frames.stats();
    log::info!(
        "Shutting down after {} frames ({} skipped, {} swapchain rebuilds, {:.1} fps average)",
        stats.presented,
        stats.skipped,
        stats.rebuilds,
        timer.average_fps()
    );
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        log::error!("{error}");
        eprintln!("Fatal: {error}");
        std::process::exit(1);
    }
}
