// Platform window
//
// A single winit window driven by polling instead of `run_app`: every call to
// `handle_events` pumps the OS queue once without blocking, folds what arrived
// into the event table and hands back at most one event.

use anyhow::{Context, Result};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{WindowAttributes, WindowId},
};

use super::event::{Event, EventTable};

/// Pumps allowed for the platform to deliver `resumed` at startup
const STARTUP_PUMPS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowStyle {
    #[default]
    Normal,
    Frameless,
}

#[derive(Debug, Clone)]
pub struct WindowBuilder {
    title: String,
    width: u32,
    height: u32,
    position: Option<(i32, i32)>,
    style: WindowStyle,
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self {
            title: "vk-scaffold".to_string(),
            width: 800,
            height: 600,
            position: None,
            style: WindowStyle::Normal,
        }
    }
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn set_position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }

    pub fn set_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn set_style(mut self, style: WindowStyle) -> Self {
        self.style = style;
        self
    }

    fn attributes(&self) -> WindowAttributes {
        let mut attributes = WindowAttributes::default()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_decorations(self.style == WindowStyle::Normal);

        if let Some((x, y)) = self.position {
            attributes = attributes.with_position(PhysicalPosition::new(x, y));
        }
        attributes
    }

    pub fn build(&self) -> Result<Window> {
        let mut event_loop = EventLoop::new().context("Unable to create event loop")?;
        let mut state = WindowState {
            attributes: Some(self.attributes()),
            window: None,
            error: None,
            events: EventTable::new(),
        };

        // The window can only be created once the loop reports it is running
        for _ in 0..STARTUP_PUMPS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut state)
            {
                anyhow::bail!("Event loop exited during startup with code {}", code);
            }
            if let Some(error) = state.error.take() {
                anyhow::bail!("Unable to create window: {}", error);
            }
            if state.window.is_some() {
                break;
            }
        }

        if state.window.is_none() {
            anyhow::bail!("Unable to create window: platform never resumed");
        }

        log::info!("Window created: {}x{} '{}'", self.width, self.height, self.title);

        Ok(Window { state, event_loop })
    }
}

struct WindowState {
    attributes: Option<WindowAttributes>,
    window: Option<winit::window::Window>,
    error: Option<String>,
    events: EventTable,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let event = match event {
            WindowEvent::Resized(size) => Event::WindowResize {
                width: size.width,
                height: size.height,
            },
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
                Event::WindowQuit
            }
            WindowEvent::CursorMoved { position, .. } => Event::MouseMove {
                x: position.x as i32,
                y: position.y as i32,
            },
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                ..
            } => Event::MousePress,
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                Event::KeyboardPress
            }
            _ => return,
        };
        self.events.push(event);
    }
}

pub struct Window {
    // Declared first so the OS window is gone before its event loop
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Poll the OS without blocking and return at most one event.
    pub fn handle_events(&mut self) -> Event {
        self.wait_events(Duration::ZERO)
    }

    /// Like `handle_events`, but sleeps up to `timeout` when nothing is
    /// pending.
    pub fn wait_events(&mut self, timeout: Duration) -> Event {
        let timeout = if self.state.events.is_empty() {
            timeout
        } else {
            Duration::ZERO
        };
        if let PumpStatus::Exit(_) = self
            .event_loop
            .pump_app_events(Some(timeout), &mut self.state)
        {
            self.state.events.push(Event::WindowQuit);
        }
        self.state.events.pop()
    }

    fn window(&self) -> Result<&winit::window::Window> {
        self.state.window.as_ref().context("Window has been destroyed")
    }

    pub fn inner_size(&self) -> Result<(u32, u32)> {
        let size = self.window()?.inner_size();
        Ok((size.width, size.height))
    }

    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let window = self.window()?;
        Ok((window.raw_display_handle(), window.raw_window_handle()))
    }

    /// Instance extensions needed to create a surface on this platform, in
    /// the order the platform lists them.
    pub fn instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        let (display_handle, _) = self.raw_handles()?;
        let names = ash_window::enumerate_required_extensions(display_handle)
            .context("Unable to query surface extensions")?;

        // Pointers come from static extension-name constants
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }
}
