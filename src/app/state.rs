use std::sync::{Arc, Mutex};

use gtk4::glib;

use super::session::{RequestId, Session};
use crate::config::Config;
use crate::describer::Moondream;
use crate::speech::StopHandle;
use crate::ui::window::WindowWidgets;

/// The loaded model, shared read-only in spirit by every description task.
/// The mutex serializes access to its key-value cache.
pub type SharedModel = Arc<Mutex<Moondream>>;

/// Events sent from background threads to the GTK main thread.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    DescriptionReady { request: RequestId, text: String },
    DescriptionFailed { request: RequestId, error: String },
    SpeechDone,
    SpeechFailed(String),
    ModelLoadFailed(String),
    TimerTick,
}

/// Central application state. Lives on the GTK main thread inside Rc<RefCell<>>.
pub struct AppState {
    pub session: Session,
    pub config: Config,
    pub tokio_rt: tokio::runtime::Runtime,
    pub model: Option<SharedModel>,
    pub backend_sender: async_channel::Sender<BackendEvent>,

    /// One-second ticker driving the elapsed-time readout.
    pub timer_source: Option<glib::SourceId>,
    /// Stops the speech task in flight, if any.
    pub speech_stop: Option<StopHandle>,

    // UI handles
    pub window: Option<WindowWidgets>,
}

impl AppState {
    pub fn new(
        config: Config,
        sender: async_channel::Sender<BackendEvent>,
    ) -> std::io::Result<Self> {
        let tokio_rt = tokio::runtime::Runtime::new()?;

        Ok(Self {
            session: Session::default(),
            config,
            tokio_rt,
            model: None,
            backend_sender: sender,
            timer_source: None,
            speech_stop: None,
            window: None,
        })
    }
}

/// Helper to update the status line.
pub fn update_status(state: &std::rc::Rc<std::cell::RefCell<AppState>>, label_text: &str) {
    let s = state.borrow();
    if let Some(ref window) = s.window {
        window.status_label.set_text(label_text);
    }
}
