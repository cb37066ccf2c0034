use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Mutex;

use super::session::RequestId;
use super::state::{AppState, BackendEvent};
use crate::describer::{describe_image, VisionLanguageModel};
use crate::error::DescribeError;
use crate::picture::SelectedImage;
use crate::speech::{speak_to_completion, CommandSpeech, SpeechEngine};

/// Run one description on the shared model and turn the outcome into the
/// completion event for `request`.
pub fn description_task<M: VisionLanguageModel>(
    model: &Mutex<M>,
    request: RequestId,
    image: &SelectedImage,
    question: &str,
) -> BackendEvent {
    let result = model
        .lock()
        .map_err(|_| DescribeError::Poisoned)
        .and_then(|mut model| describe_image(&mut *model, &image.pixels, question));

    match result {
        Ok(text) => BackendEvent::DescriptionReady { request, text },
        Err(e) => BackendEvent::DescriptionFailed {
            request,
            error: format!("{}: {e}", e.kind()),
        },
    }
}

/// Speak `text` on a task-private engine and turn the outcome into the
/// completion event.
pub fn speech_task<E: SpeechEngine>(mut engine: E, text: &str) -> BackendEvent {
    match speak_to_completion(&mut engine, text) {
        Ok(()) => BackendEvent::SpeechDone,
        Err(e) => BackendEvent::SpeechFailed(format!("{}: {e}", e.kind())),
    }
}

/// Dispatch a description of `image` on the tokio runtime.
pub fn dispatch_description(
    state: &Rc<RefCell<AppState>>,
    request: RequestId,
    image: SelectedImage,
) {
    let s = state.borrow();
    let Some(model) = s.model.clone() else {
        log::error!("Description requested before the model was loaded");
        return;
    };
    let question = s.config.model.question.clone();
    let sender = s.backend_sender.clone();

    log::info!("Describing {} (request {request})", image.path.display());
    s.tokio_rt.spawn(async move {
        let result = tokio::task::spawn_blocking(move || {
            description_task(&model, request, &image, &question)
        })
        .await;

        let event = result.unwrap_or_else(|e| BackendEvent::DescriptionFailed {
            request,
            error: format!("Description task panicked: {e}"),
        });
        let _ = sender.send(event).await;
    });
}

/// Dispatch a speech task for `text` on the tokio runtime and keep its stop
/// handle on the state.
pub fn dispatch_speech(state: &Rc<RefCell<AppState>>, text: String) {
    let mut s = state.borrow_mut();
    let engine = CommandSpeech::new(&s.config.speech);
    s.speech_stop = Some(engine.stop_handle());
    let sender = s.backend_sender.clone();

    s.tokio_rt.spawn(async move {
        let result = tokio::task::spawn_blocking(move || speech_task(engine, &text)).await;

        let event = result.unwrap_or_else(|e| {
            BackendEvent::SpeechFailed(format!("Speech task panicked: {e}"))
        });
        let _ = sender.send(event).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describer::tests::ScriptedModel;
    use crate::speech::tests::RecordingEngine;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn cat_image() -> SelectedImage {
        let pixels = image::RgbImage::new(512, 384);
        SelectedImage {
            path: PathBuf::from("cat.jpg"),
            thumbnail: pixels.clone(),
            pixels: Arc::new(pixels),
        }
    }

    #[test]
    fn description_task_emits_ready_with_request_id() {
        let model = Mutex::new(ScriptedModel::new(vec!["A cat sitting on a windowsill.", "<END>"]));

        let event = description_task(&model, 7, &cat_image(), "describe this image in detail");

        match event {
            BackendEvent::DescriptionReady { request, text } => {
                assert_eq!(request, 7);
                assert_eq!(text, "A cat sitting on a windowsill.");
            }
            other => panic!("unexpected event {other:?}"),
        }
        let model = model.into_inner().unwrap();
        assert_eq!(model.questions, vec!["describe this image in detail"]);
        assert_eq!(model.encoded_sizes, vec![(512, 384)]);
    }

    #[test]
    fn description_task_reports_failure_kind() {
        let mut scripted = ScriptedModel::new(vec![]);
        scripted.fail_encode = true;
        let model = Mutex::new(scripted);

        match description_task(&model, 3, &cat_image(), "q") {
            BackendEvent::DescriptionFailed { request, error } => {
                assert_eq!(request, 3);
                assert!(error.starts_with("Tokenizer error: "), "{error}");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn speech_task_completes_once() {
        let event = speech_task(RecordingEngine::default(), "A cat sitting on a windowsill.");
        assert!(matches!(event, BackendEvent::SpeechDone));
    }

    #[test]
    fn speech_task_reports_engine_failure() {
        let engine = RecordingEngine {
            fail: true,
            ..Default::default()
        };
        match speech_task(engine, "hello") {
            BackendEvent::SpeechFailed(error) => assert!(error.starts_with("Speech error: ")),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
