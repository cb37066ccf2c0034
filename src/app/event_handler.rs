use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use super::playback::on_speech_finished;
use super::session::elapsed_text;
use super::state::{update_status, AppState, BackendEvent};
use super::upload::{refresh_upload_button, stop_timer};

/// Handle a backend event. This is the core state machine.
pub fn handle_backend_event(state: &Rc<RefCell<AppState>>, event: BackendEvent) {
    match event {
        BackendEvent::DescriptionReady { request, text } => {
            let shown = state
                .borrow_mut()
                .session
                .complete_description(request, text);
            let Some(shown) = shown else {
                return;
            };
            if let Some(path) = state.borrow().session.image_path() {
                log::info!("Description ready for {} (request {request})", path.display());
            }
            stop_timer(state);
            {
                let s = state.borrow();
                if let Some(ref window) = s.window {
                    window.set_description(&shown);
                }
            }
            refresh_upload_button(state);
            update_status(state, "Ready");
        }
        BackendEvent::DescriptionFailed { request, error } => {
            if !state.borrow_mut().session.fail_description(request) {
                log::warn!("Dropping stale failure for request {request}: {error}");
                return;
            }
            log::error!("Description failed: {error}");
            stop_timer(state);
            refresh_upload_button(state);
            if let Some(ref window) = state.borrow().window {
                window.show_toast(&error);
            }
            update_status(state, &error);
        }
        BackendEvent::SpeechDone => {
            log::info!("Speech finished");
            on_speech_finished(state);
        }
        BackendEvent::SpeechFailed(error) => {
            log::error!("Speech failed: {error}");
            on_speech_finished(state);
            update_status(state, &error);
        }
        BackendEvent::ModelLoadFailed(error) => {
            log::error!("Model unavailable: {error}");
            update_status(state, &error);
        }
        BackendEvent::TimerTick => {
            let elapsed = state.borrow_mut().session.tick();
            if let (Some(elapsed), Some(ref window)) = (elapsed, &state.borrow().window) {
                window.timer_label.set_text(&elapsed_text(elapsed));
            }
        }
    }
}
