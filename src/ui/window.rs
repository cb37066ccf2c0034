use std::path::PathBuf;

use gtk4::prelude::*;
use gtk4::{gdk, gio, glib};
use image::RgbImage;
use libadwaita::prelude::*;

/// Handles returned from building the main window.
pub struct WindowWidgets {
    pub window: libadwaita::ApplicationWindow,
    pub toast_overlay: libadwaita::ToastOverlay,
    pub picture: gtk4::Picture,
    pub upload_button: gtk4::Button,
    pub description_view: gtk4::TextView,
    pub speak_button: gtk4::Button,
    pub timer_label: gtk4::Label,
    pub status_label: gtk4::Label,
}

impl WindowWidgets {
    /// Replace the image area with `thumbnail`.
    pub fn set_thumbnail(&self, thumbnail: &RgbImage) {
        let (width, height) = thumbnail.dimensions();
        let bytes = glib::Bytes::from_owned(thumbnail.as_raw().clone());
        let texture = gdk::MemoryTexture::new(
            width as i32,
            height as i32,
            gdk::MemoryFormat::R8g8b8,
            &bytes,
            width as usize * 3,
        );
        self.picture.set_paintable(Some(&texture));
    }

    pub fn set_description(&self, text: &str) {
        self.description_view.buffer().set_text(text);
    }

    /// Short-lived notification at the bottom of the window.
    pub fn show_toast(&self, message: &str) {
        let toast = libadwaita::Toast::new(message);
        toast.set_timeout(4);
        self.toast_overlay.add_toast(toast);
    }
}

/// Build the main window. Upload stays disabled until the model is loaded.
pub fn build_window(app: &libadwaita::Application) -> WindowWidgets {
    libadwaita::StyleManager::default().set_color_scheme(libadwaita::ColorScheme::ForceDark);
    load_css();

    let window = libadwaita::ApplicationWindow::builder()
        .application(app)
        .title("Pixel to Prose")
        .default_width(600)
        .default_height(600)
        .build();

    let toolbar_view = libadwaita::ToolbarView::new();
    toolbar_view.add_top_bar(&libadwaita::HeaderBar::new());

    let content = gtk4::Box::new(gtk4::Orientation::Vertical, 12);
    content.set_margin_start(16);
    content.set_margin_end(16);
    content.set_margin_top(12);
    content.set_margin_bottom(12);

    // --- Image area ---
    let picture = gtk4::Picture::new();
    picture.set_content_fit(gtk4::ContentFit::Contain);
    picture.set_can_shrink(true);
    picture.set_vexpand(true);
    picture.set_size_request(-1, 200);
    content.append(&picture);

    // --- Upload ---
    let upload_button = gtk4::Button::builder()
        .label("Upload Image")
        .height_request(120)
        .sensitive(false)
        .build();
    upload_button.add_css_class("upload-button");
    content.append(&upload_button);

    // --- Description + speak ---
    let result_box = gtk4::Box::new(gtk4::Orientation::Horizontal, 12);

    let description_view = gtk4::TextView::builder()
        .editable(false)
        .cursor_visible(false)
        .wrap_mode(gtk4::WrapMode::WordChar)
        .left_margin(8)
        .right_margin(8)
        .top_margin(8)
        .bottom_margin(8)
        .build();
    description_view.add_css_class("description");
    let scrolled = gtk4::ScrolledWindow::builder()
        .hscrollbar_policy(gtk4::PolicyType::Never)
        .min_content_height(160)
        .hexpand(true)
        .child(&description_view)
        .build();
    result_box.append(&scrolled);

    let speak_icon = gtk4::Image::from_icon_name("audio-volume-high-symbolic");
    speak_icon.set_pixel_size(64);
    let speak_button = gtk4::Button::builder()
        .child(&speak_icon)
        .tooltip_text("Read description aloud")
        .valign(gtk4::Align::Center)
        .build();
    result_box.append(&speak_button);

    content.append(&result_box);

    // --- Readouts ---
    let timer_label = gtk4::Label::new(None);
    timer_label.add_css_class("elapsed");
    content.append(&timer_label);

    let status_label = gtk4::Label::new(Some("Starting..."));
    status_label.add_css_class("dim-label");
    status_label.set_wrap(true);
    content.append(&status_label);

    toolbar_view.set_content(Some(&content));
    let toast_overlay = libadwaita::ToastOverlay::new();
    toast_overlay.set_child(Some(&toolbar_view));
    window.set_content(Some(&toast_overlay));

    WindowWidgets {
        window,
        toast_overlay,
        picture,
        upload_button,
        description_view,
        speak_button,
        timer_label,
        status_label,
    }
}

fn load_css() {
    let Some(display) = gdk::Display::default() else {
        log::warn!("No display; skipping custom styles");
        return;
    };
    let css_provider = gtk4::CssProvider::new();
    css_provider.load_from_string(
        r#"
        .upload-button {
            font-size: 24pt;
            font-weight: 500;
        }
        textview.description, textview.description text {
            font-size: 18pt;
        }
        .elapsed {
            font-size: 16pt;
        }
        "#,
    );
    gtk4::style_context_add_provider_for_display(
        &display,
        &css_provider,
        gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );
}

/// Show the image file chooser. Calls `on_result` on the GTK main thread with
/// the chosen path, or `None` if the user cancelled.
pub fn choose_image<F>(parent: &libadwaita::ApplicationWindow, on_result: F)
where
    F: FnOnce(Option<PathBuf>) + 'static,
{
    let filter = gtk4::FileFilter::new();
    filter.set_name(Some("Image files (*.jpg *.jpeg *.png)"));
    for suffix in ["jpg", "jpeg", "png"] {
        filter.add_suffix(suffix);
    }
    let filters = gio::ListStore::new::<gtk4::FileFilter>();
    filters.append(&filter);

    let dialog = gtk4::FileDialog::builder()
        .title("Open Image File")
        .modal(true)
        .filters(&filters)
        .default_filter(&filter)
        .build();

    dialog.open(Some(parent), None::<&gio::Cancellable>, move |result| match result {
        Ok(file) => on_result(file.path()),
        Err(e) => {
            log::debug!("File dialog closed without a selection: {e}");
            on_result(None);
        }
    });
}
