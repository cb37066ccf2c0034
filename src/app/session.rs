use std::path::{Path, PathBuf};

/// Identifies one description task. Results for any other id are stale.
pub type RequestId = u64;

/// Why an upload was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ModelNotReady,
    SelectionOpen,
    DescriptionInFlight,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::ModelNotReady => f.write_str("model is still loading"),
            Rejection::SelectionOpen => f.write_str("an image is already being chosen"),
            Rejection::DescriptionInFlight => f.write_str("a description is already running"),
        }
    }
}

/// What the window shows and which tasks are running. Pure state: the GTK
/// side asks it what to do and applies the answer to widgets.
#[derive(Debug, Default)]
pub struct Session {
    model_ready: bool,
    next_request: RequestId,
    in_flight: Option<RequestId>,
    /// File chooser open or chosen file still decoding.
    selecting: bool,
    elapsed_seconds: u64,
    image_path: Option<PathBuf>,
    description: Option<String>,
    speaking: bool,
}

impl Session {
    pub fn set_model_ready(&mut self) {
        self.model_ready = true;
    }

    #[cfg(test)]
    pub fn is_describing(&self) -> bool {
        self.in_flight.is_some()
    }

    #[cfg(test)]
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    #[cfg(test)]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    #[cfg(test)]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Whether a new upload would be accepted right now.
    pub fn check_upload(&self) -> Result<(), Rejection> {
        if !self.model_ready {
            Err(Rejection::ModelNotReady)
        } else if self.selecting {
            Err(Rejection::SelectionOpen)
        } else if self.in_flight.is_some() {
            Err(Rejection::DescriptionInFlight)
        } else {
            Ok(())
        }
    }

    /// Claim the upload slot while the user picks and we decode a file.
    pub fn begin_selection(&mut self) -> Result<(), Rejection> {
        self.check_upload()?;
        self.selecting = true;
        Ok(())
    }

    /// Chooser cancelled or decode finished; uploads may resume.
    pub fn end_selection(&mut self) {
        self.selecting = false;
    }

    /// Register a freshly decoded image and open a description request for it.
    /// Resets the elapsed counter.
    pub fn begin_description(&mut self, path: &Path) -> Result<RequestId, Rejection> {
        self.check_upload()?;
        let request = self.next_request;
        self.next_request += 1;
        self.in_flight = Some(request);
        self.elapsed_seconds = 0;
        self.image_path = Some(path.to_path_buf());
        Ok(request)
    }

    /// One second passed. Returns the new count while a description runs.
    pub fn tick(&mut self) -> Option<u64> {
        self.in_flight?;
        self.elapsed_seconds += 1;
        Some(self.elapsed_seconds)
    }

    /// Accept the result of `request`. Returns the text to display, or `None`
    /// if the result is stale.
    pub fn complete_description(&mut self, request: RequestId, text: String) -> Option<String> {
        if self.in_flight != Some(request) {
            log::warn!("Dropping stale description for request {request}");
            return None;
        }
        self.in_flight = None;
        let display = display_text(&text);
        self.description = Some(text);
        Some(display)
    }

    /// Close `request` without a result; the previous description stays.
    pub fn fail_description(&mut self, request: RequestId) -> bool {
        if self.in_flight != Some(request) {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Claim the speech slot. Returns the text to speak, or `None` if a
    /// speech task is already running.
    pub fn begin_speech(&mut self) -> Option<String> {
        if self.speaking {
            return None;
        }
        self.speaking = true;
        Some(self.description.clone().unwrap_or_default())
    }

    /// Release the speech slot. Returns `true` only for the call that
    /// actually released it.
    pub fn finish_speech(&mut self) -> bool {
        std::mem::replace(&mut self.speaking, false)
    }
}

/// Text shown in the description area.
pub fn display_text(description: &str) -> String {
    format!("Output: \n{description}")
}

/// Text shown in the elapsed-time readout.
pub fn elapsed_text(seconds: u64) -> String {
    format!("Elapsed Time: {seconds} seconds")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> Session {
        let mut session = Session::default();
        session.set_model_ready();
        session
    }

    #[test]
    fn upload_waits_for_model() {
        let mut session = Session::default();
        assert_eq!(session.check_upload(), Err(Rejection::ModelNotReady));
        assert_eq!(
            session.begin_description(Path::new("cat.jpg")),
            Err(Rejection::ModelNotReady)
        );
        assert!(!session.is_describing());
    }

    #[test]
    fn description_completes_once_with_output_prefix() {
        let mut session = ready();
        let id = session.begin_description(Path::new("cat.jpg")).unwrap();
        assert_eq!(session.image_path(), Some(Path::new("cat.jpg")));

        let shown = session.complete_description(id, "A cat sitting on a windowsill.".into());
        assert_eq!(shown.as_deref(), Some("Output: \nA cat sitting on a windowsill."));
        assert_eq!(session.description(), Some("A cat sitting on a windowsill."));

        assert_eq!(session.complete_description(id, "again".into()), None);
        assert_eq!(session.description(), Some("A cat sitting on a windowsill."));
    }

    #[test]
    fn second_upload_rejected_while_describing() {
        let mut session = ready();
        let first = session.begin_description(Path::new("a.png")).unwrap();
        assert_eq!(
            session.begin_description(Path::new("b.png")),
            Err(Rejection::DescriptionInFlight)
        );
        assert_eq!(session.image_path(), Some(Path::new("a.png")));

        session.complete_description(first, "a".into());
        let second = session.begin_description(Path::new("b.png")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn stale_result_is_dropped() {
        let mut session = ready();
        let first = session.begin_description(Path::new("a.png")).unwrap();
        assert!(session.fail_description(first));
        let second = session.begin_description(Path::new("b.png")).unwrap();

        assert_eq!(session.complete_description(first, "old".into()), None);
        assert!(session.is_describing());
        assert!(session.complete_description(second, "new".into()).is_some());
        assert_eq!(session.description(), Some("new"));
    }

    #[test]
    fn elapsed_counts_while_describing_then_freezes() {
        let mut session = ready();
        assert_eq!(session.tick(), None);

        let id = session.begin_description(Path::new("cat.jpg")).unwrap();
        assert_eq!(session.tick(), Some(1));
        assert_eq!(session.tick(), Some(2));
        assert_eq!(session.tick(), Some(3));

        session.complete_description(id, "done".into());
        assert_eq!(session.tick(), None);
        assert_eq!(session.elapsed_seconds(), 3);

        session.begin_description(Path::new("dog.jpg")).unwrap();
        assert_eq!(session.elapsed_seconds(), 0);
        assert_eq!(session.tick(), Some(1));
    }

    #[test]
    fn failure_keeps_previous_description() {
        let mut session = ready();
        let id = session.begin_description(Path::new("a.png")).unwrap();
        session.complete_description(id, "first".into());

        let id = session.begin_description(Path::new("b.png")).unwrap();
        assert!(session.fail_description(id));
        assert!(!session.fail_description(id));
        assert_eq!(session.description(), Some("first"));
        assert!(!session.is_describing());
    }

    #[test]
    fn speak_is_a_no_op_while_speaking() {
        let mut session = ready();
        let id = session.begin_description(Path::new("cat.jpg")).unwrap();
        session.complete_description(id, "A cat sitting on a windowsill.".into());

        assert_eq!(
            session.begin_speech().as_deref(),
            Some("A cat sitting on a windowsill.")
        );
        assert_eq!(session.begin_speech(), None);
        assert!(session.is_speaking());
    }

    #[test]
    fn speech_release_happens_exactly_once() {
        let mut session = ready();
        session.begin_speech().unwrap();
        assert!(session.finish_speech());
        assert!(!session.finish_speech());
        assert!(session.begin_speech().is_some());
    }

    #[test]
    fn speaking_without_description_uses_empty_text() {
        let mut session = ready();
        assert_eq!(session.begin_speech().as_deref(), Some(""));
    }

    #[test]
    fn open_chooser_blocks_another_upload() {
        let mut session = ready();
        session.begin_selection().unwrap();
        assert_eq!(session.begin_selection(), Err(Rejection::SelectionOpen));
        assert_eq!(
            session.begin_description(Path::new("cat.jpg")),
            Err(Rejection::SelectionOpen)
        );

        session.end_selection();
        assert_eq!(session.check_upload(), Ok(()));
    }

    #[test]
    fn chosen_file_starts_description_after_selection_ends() {
        let mut session = ready();
        session.begin_selection().unwrap();
        session.end_selection();
        let id = session.begin_description(Path::new("cat.jpg")).unwrap();
        assert_eq!(session.begin_selection(), Err(Rejection::DescriptionInFlight));

        session.complete_description(id, "A cat.".into());
        assert_eq!(session.begin_selection(), Ok(()));
    }

    #[test]
    fn readout_formats() {
        assert_eq!(elapsed_text(7), "Elapsed Time: 7 seconds");
        assert_eq!(display_text(""), "Output: \n");
    }
}
