use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use gtk4::glib;
use gtk4::prelude::*;

use super::pipeline::dispatch_description;
use super::session::elapsed_text;
use super::state::{update_status, AppState, BackendEvent};
use crate::error::ImageLoadError;
use crate::picture::SelectedImage;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// "Upload Image" clicked: open the chooser unless an upload would be refused.
/// The button stays disabled until the choice is cancelled or described.
pub fn on_upload_clicked(state: &Rc<RefCell<AppState>>) {
    if let Err(rejection) = state.borrow_mut().session.begin_selection() {
        log::info!("Ignoring upload: {rejection}");
        return;
    }
    refresh_upload_button(state);

    let Some(parent) = state.borrow().window.as_ref().map(|w| w.window.clone()) else {
        state.borrow_mut().session.end_selection();
        return;
    };
    let state_clone = state.clone();
    crate::ui::window::choose_image(&parent, move |path| match path {
        Some(path) => decode_image(&state_clone, path),
        None => {
            state_clone.borrow_mut().session.end_selection();
            refresh_upload_button(&state_clone);
        }
    });
}

/// Decode `path` in a blocking task and hand the result to the main thread.
fn decode_image(state: &Rc<RefCell<AppState>>, path: PathBuf) {
    let thumbnail_size = state.borrow().config.thumbnail_size;
    update_status(state, "Loading image...");

    // We can't send Rc<RefCell> into tokio, so use a separate channel
    // to pass the decoded image back to the main thread.
    let (image_tx, image_rx) = async_channel::bounded::<Result<SelectedImage, ImageLoadError>>(1);
    state.borrow().tokio_rt.spawn({
        let path = path.clone();
        async move {
            let result = tokio::task::spawn_blocking(move || {
                crate::picture::load_image(&path, thumbnail_size)
            })
            .await;
            match result {
                Ok(decoded) => {
                    let _ = image_tx.send(decoded).await;
                }
                Err(e) => log::error!("Image decode task panicked: {e}"),
            }
        }
    });

    let state_clone = state.clone();
    glib::spawn_future_local(async move {
        let decoded = match image_rx.recv().await {
            Ok(decoded) => decoded,
            Err(_) => {
                state_clone.borrow_mut().session.end_selection();
                refresh_upload_button(&state_clone);
                update_status(&state_clone, "Decode error: image task ended unexpectedly");
                return;
            }
        };
        state_clone.borrow_mut().session.end_selection();
        match decoded {
            Ok(image) => on_image_selected(&state_clone, image),
            Err(e) => {
                log::error!("Failed to load {}: {e}", path.display());
                refresh_upload_button(&state_clone);
                let message = format!("{}: {e}", e.kind());
                update_status(&state_clone, &message);
                if let Some(ref window) = state_clone.borrow().window {
                    window.show_toast(&message);
                }
            }
        }
    });
}

/// Show the decoded image and start describing it.
fn on_image_selected(state: &Rc<RefCell<AppState>>, image: SelectedImage) {
    let request = match state.borrow_mut().session.begin_description(&image.path) {
        Ok(request) => request,
        Err(rejection) => {
            log::info!("Ignoring {}: {rejection}", image.path.display());
            return;
        }
    };

    {
        let s = state.borrow();
        if let Some(ref window) = s.window {
            window.set_thumbnail(&image.thumbnail);
            window.timer_label.set_text(&elapsed_text(0));
        }
    }
    refresh_upload_button(state);
    update_status(state, "Describing image...");
    start_timer(state);

    dispatch_description(state, request, image);
}

/// Enable the upload button exactly when an upload would be accepted.
pub fn refresh_upload_button(state: &Rc<RefCell<AppState>>) {
    let s = state.borrow();
    if let Some(ref window) = s.window {
        window.upload_button.set_sensitive(s.session.check_upload().is_ok());
    }
}

/// A source sending one `TimerTick` per `TICK_INTERVAL`.
fn tick_source(sender: async_channel::Sender<BackendEvent>) -> glib::Source {
    glib::timeout_source_new(TICK_INTERVAL, None, glib::Priority::DEFAULT, move || {
        let _ = sender.try_send(BackendEvent::TimerTick);
        glib::ControlFlow::Continue
    })
}

/// Start the one-second elapsed-time ticker.
fn start_timer(state: &Rc<RefCell<AppState>>) {
    stop_timer(state);
    let sender = state.borrow().backend_sender.clone();
    let source = tick_source(sender).attach(None);
    state.borrow_mut().timer_source = Some(source);
}

/// Stop the ticker; the readout keeps its last value.
pub fn stop_timer(state: &Rc<RefCell<AppState>>) {
    if let Some(source) = state.borrow_mut().timer_source.take() {
        source.remove();
    }
}
