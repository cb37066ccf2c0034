use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use gtk4::glib;

use super::state::{update_status, AppState, BackendEvent};
use crate::describer::Moondream;

/// Load the vision-language model in a blocking task, then deliver it to the
/// main thread. Downloads the weights first if they are not cached.
pub fn load_model(state: &Rc<RefCell<AppState>>) {
    log::info!("Loading vision-language model...");
    update_status(state, "Loading model...");

    let sender = state.borrow().backend_sender.clone();
    let model_config = state.borrow().config.model.clone();

    // We can't send Rc<RefCell> into tokio, so use a separate channel
    // to pass the loaded model back to the main thread.
    let (model_tx, model_rx) = async_channel::bounded::<Moondream>(1);

    state.borrow().tokio_rt.spawn(async move {
        let result = tokio::task::spawn_blocking(move || Moondream::load(&model_config)).await;

        let error = match result {
            Ok(Ok(model)) => {
                let _ = model_tx.send(model).await;
                return;
            }
            Ok(Err(e)) => format!("{}: {e}", e.kind()),
            Err(e) => format!("Model load panicked: {e}"),
        };
        let _ = sender.send(BackendEvent::ModelLoadFailed(error)).await;
    });

    // Receive the loaded model on the GTK main thread
    let state_clone = state.clone();
    glib::spawn_future_local(async move {
        if let Ok(model) = model_rx.recv().await {
            {
                let mut s = state_clone.borrow_mut();
                s.model = Some(Arc::new(Mutex::new(model)));
                s.session.set_model_ready();
            }
            super::upload::refresh_upload_button(&state_clone);
            update_status(&state_clone, "Ready");
            log::info!("Model ready");
        }
    });
}
