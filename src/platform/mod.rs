// Platform layer - window creation and polled input

pub mod event;
pub mod window;

pub use event::{Event, EventKind, EventTable};
pub use window::{Window, WindowBuilder, WindowStyle};
