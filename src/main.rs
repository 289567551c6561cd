// =============================================================================
// VK-SCAFFOLD - Vulkan builders, swapchain and a polled event loop
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Window (winit, polled)                                         │
// │    └── Render                                                   │
// │          ├── Instance + Surface + Device                        │
// │          ├── Swapchain (images, views, per-image sync)          │
// │          ├── Render pass + Pipeline + Framebuffers              │
// │          └── Command pool + pre-recorded command buffers        │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Poll one window event (quit / resize)
// 2. Acquire swapchain image, wait for its previous submission to retire
// 3. Submit the image's pre-recorded commands
// 4. Present
//
// =============================================================================

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use vk_scaffold::config::Config;
use vk_scaffold::platform::{Event, Window, WindowBuilder, WindowStyle};
use vk_scaffold::render::Render;

// Upper bound on how long a minimized window sleeps between polls
const MINIMIZED_POLL: Duration = Duration::from_millis(100);

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting vk-scaffold");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.frameless { "frameless" } else { "normal" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    // Errors end the program but are not a failure exit
    if let Err(e) = run(&config) {
        log::warn!("{:#}", e);
    }
}

/// Initialize logging, optionally sending everything to the configured file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::from_default_env();
    builder.filter_level(config.get_log_level());
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== vk-scaffold log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Unable to open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

fn create_window(config: &Config) -> Result<Window> {
    let mut builder = WindowBuilder::new()
        .set_title(&config.window.title)
        .set_size(config.window.width, config.window.height);

    if let (Some(x), Some(y)) = (config.window.x, config.window.y) {
        builder = builder.set_position(x, y);
    }
    if config.window.frameless {
        builder = builder.set_style(WindowStyle::Frameless);
    }

    builder.build()
}

// =============================================================================
// MAIN LOOP
// =============================================================================

fn run(config: &Config) -> Result<()> {
    let mut window = create_window(config)?;
    // Dropped before the window it presents to
    let mut render = Render::new(&window, config)?;

    loop {
        let event = if render.is_minimized() {
            window.wait_events(MINIMIZED_POLL)
        } else {
            window.handle_events()
        };

        match event {
            Event::WindowQuit => {
                log::info!("Window closed, shutting down...");
                break;
            }
            Event::WindowResize { width, height } => {
                log::debug!("Window resized to {}x{}", width, height);
                render.resize(width, height)?;
            }
            _ => {}
        }

        render.draw_frame()?;
    }

    render.shutdown()
}
