//! The rendering seam between the widget core and whatever draws it.
//!
//! The core never touches a UI toolkit. It reports what should be visible
//! through `Surface`, and receives user actions through
//! [`Dispatch`](crate::controller::Dispatch).

use std::sync::Mutex;

use crate::forms::DynamicForm;
use crate::transcript::Turn;

/// A control that is disabled while its call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Send button and text input (chat and token submission).
    Send,
    /// File picker, drop target, and file-form confirm buttons.
    Upload,
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// Output side of the widget.
///
/// Implementations must be cheap and non-blocking; they are called while the
/// session is locked.
pub trait Surface: Send + Sync {
    /// A turn was appended to the log.
    fn render_turn(&self, turn: &Turn);

    /// Keep the newest turn in view.
    fn scroll_to_latest(&self);

    /// Replace the live form.
    fn render_form(&self, form: &DynamicForm);

    /// Inline notice for input rejected before any network call.
    fn show_notice(&self, text: &str);

    fn set_control_enabled(&self, control: Control, enabled: bool);

    /// Empty the text input.
    fn clear_input(&self);

    /// Open the dashboard page in a new window.
    fn open_dashboard(&self, _url: &str) {}
}

/// Everything a `Surface` was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Turn(Turn),
    ScrollToLatest,
    Form(DynamicForm),
    Notice(String),
    ControlEnabled(Control, bool),
    InputCleared,
    Dashboard(String),
}

/// Headless surface that records every call.
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SurfaceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Turn(turn) => Some(turn),
                _ => None,
            })
            .collect()
    }

    pub fn forms(&self) -> Vec<DynamicForm> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Form(form) => Some(form),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Notice(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Last enabled/disabled state reported for `control` (enabled if never touched).
    pub fn control_enabled(&self, control: Control) -> bool {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                SurfaceEvent::ControlEnabled(c, enabled) if c == control => Some(enabled),
                _ => None,
            })
            .unwrap_or(true)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Surface for RecordingSurface {
    fn render_turn(&self, turn: &Turn) {
        self.push(SurfaceEvent::Turn(turn.clone()));
    }

    fn scroll_to_latest(&self) {
        self.push(SurfaceEvent::ScrollToLatest);
    }

    fn render_form(&self, form: &DynamicForm) {
        self.push(SurfaceEvent::Form(form.clone()));
    }

    fn show_notice(&self, text: &str) {
        self.push(SurfaceEvent::Notice(text.to_string()));
    }

    fn set_control_enabled(&self, control: Control, enabled: bool) {
        self.push(SurfaceEvent::ControlEnabled(control, enabled));
    }

    fn clear_input(&self) {
        self.push(SurfaceEvent::InputCleared);
    }

    fn open_dashboard(&self, url: &str) {
        self.push(SurfaceEvent::Dashboard(url.to_string()));
    }
}
