use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use super::pipeline::dispatch_speech;
use super::state::AppState;

/// Speak button clicked: read the current description aloud unless speech is
/// already running.
pub fn on_speak_requested(state: &Rc<RefCell<AppState>>) {
    let Some(text) = state.borrow_mut().session.begin_speech() else {
        log::info!("Ignoring speak request while speech is running");
        return;
    };

    if let Some(ref window) = state.borrow().window {
        window.speak_button.set_sensitive(false);
    }
    dispatch_speech(state, text);
}

/// Speech task finished (or failed): release the slot and re-enable the
/// speak button once.
pub fn on_speech_finished(state: &Rc<RefCell<AppState>>) {
    let mut s = state.borrow_mut();
    s.speech_stop = None;
    if !s.session.finish_speech() {
        log::warn!("Speech completion without a running speech task");
        return;
    }
    if let Some(ref window) = s.window {
        window.speak_button.set_sensitive(true);
    }
}

/// Ask a running speech task to stop. Best-effort; completion still arrives
/// through the normal event.
pub fn stop_speech(state: &Rc<RefCell<AppState>>) {
    if let Some(ref stop) = state.borrow().speech_stop {
        log::info!("Stopping speech");
        stop.stop();
    }
}
