mod event_handler;
mod model;
mod pipeline;
mod playback;
mod session;
mod state;
mod upload;

pub use event_handler::handle_backend_event;
pub use model::load_model;
pub use playback::{on_speak_requested, stop_speech};
pub use state::{AppState, BackendEvent};
pub use upload::on_upload_clicked;
