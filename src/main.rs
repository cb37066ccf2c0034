mod app;
mod config;
mod describer;
mod error;
mod picture;
mod speech;
mod ui;

use std::cell::RefCell;
use std::rc::Rc;

use gtk4::prelude::*;

use app::{AppState, BackendEvent};
use config::Config;

fn main() -> gtk4::glib::ExitCode {
    env_logger::init();
    log::info!("Pixel to Prose starting");

    let application = libadwaita::Application::builder()
        .application_id("io.github.pixel-to-prose")
        .build();

    application.connect_activate(on_activate);
    application.run()
}

fn on_activate(app: &libadwaita::Application) {
    // Create async channel for backend → UI communication
    let (backend_tx, backend_rx) = async_channel::unbounded::<BackendEvent>();

    let state = match AppState::new(Config::load(), backend_tx) {
        Ok(state) => Rc::new(RefCell::new(state)),
        Err(e) => {
            log::error!("Failed to start background runtime: {e}");
            app.quit();
            return;
        }
    };

    let window = ui::window::build_window(app);

    // Wire up the "Upload Image" button
    {
        let state_clone = state.clone();
        window.upload_button.connect_clicked(move |_| {
            app::on_upload_clicked(&state_clone);
        });
    }

    // Wire up the speak button
    {
        let state_clone = state.clone();
        window.speak_button.connect_clicked(move |_| {
            app::on_speak_requested(&state_clone);
        });
    }

    // Stop speech when the window goes away
    {
        let state_clone = state.clone();
        window.window.connect_close_request(move |_| {
            app::stop_speech(&state_clone);
            gtk4::glib::Propagation::Proceed
        });
    }

    window.window.present();
    state.borrow_mut().window = Some(window);

    // Attach backend event handler
    {
        let state_clone = state.clone();
        gtk4::glib::spawn_future_local(async move {
            while let Ok(event) = backend_rx.recv().await {
                app::handle_backend_event(&state_clone, event);
            }
        });
    }

    // Start model download/load
    app::load_model(&state);
}
