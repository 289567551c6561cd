// Polled window events
//
// Between two polls only the newest event of each kind survives: a burst of
// resizes collapses into the final size and cursor motion into the final
// position. Window events come out ahead of input: quit first, then resize,
// then input kinds from newest-declared to oldest.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    None,
    MouseMove { x: i32, y: i32 },
    MousePress,
    KeyboardPress,
    WindowResize { width: u32, height: u32 },
    WindowQuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MouseMove = 0,
    MousePress,
    KeyboardPress,
    WindowResize,
    WindowQuit,
}

impl EventKind {
    pub const COUNT: usize = 5;
}

impl Event {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Event::None => None,
            Event::MouseMove { .. } => Some(EventKind::MouseMove),
            Event::MousePress => Some(EventKind::MousePress),
            Event::KeyboardPress => Some(EventKind::KeyboardPress),
            Event::WindowResize { .. } => Some(EventKind::WindowResize),
            Event::WindowQuit => Some(EventKind::WindowQuit),
        }
    }
}

/// One slot per event kind, last writer wins.
#[derive(Debug, Default)]
pub struct EventTable {
    slots: [Option<Event>; EventKind::COUNT],
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        if let Some(kind) = event.kind() {
            self.slots[kind as usize] = Some(event);
        }
    }

    /// Take the pending event of the highest kind, or `Event::None`.
    ///
    /// Continuous input such as cursor motion refills its slot every poll, so
    /// it must never shadow a quit or resize.
    pub fn pop(&mut self) -> Event {
        self.slots
            .iter_mut()
            .rev()
            .find_map(Option::take)
            .unwrap_or(Event::None)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
