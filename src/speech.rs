use std::io::ErrorKind;
use std::io::Write;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SpeechConfig;
use crate::error::SpeechError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A text-to-speech engine. One instance per utterance task.
pub trait SpeechEngine {
    /// Queue `text` for the next `run_and_wait`.
    fn say(&mut self, text: &str);

    /// Speak everything queued; blocks until done or stopped.
    fn run_and_wait(&mut self) -> Result<(), SpeechError>;

    /// Handle that can interrupt `run_and_wait` from another thread.
    fn stop_handle(&self) -> StopHandle;
}

/// Best-effort interruption of a running engine. Cloneable and `Send`, so
/// the UI thread can keep one while the engine runs on a worker.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
}

impl StopHandle {
    /// Request a stop. Does not wait for the engine to notice.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(child) = self.slot().as_mut() {
            if let Err(e) = child.kill() {
                log::debug!("Speech process already gone: {e}");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn track(&self, child: Child) {
        let mut slot = self.slot();
        *slot = Some(child);
        // a stop that raced the spawn must still take effect
        if self.is_stopped() {
            if let Some(child) = slot.as_mut() {
                let _ = child.kill();
            }
        }
    }

    /// Poll the tracked process; `Some` once it has exited.
    fn try_wait(&self) -> std::io::Result<Option<ExitStatus>> {
        let mut slot = self.slot();
        let status = match slot.as_mut() {
            Some(child) => child.try_wait()?,
            None => return Ok(None),
        };
        if status.is_some() {
            slot.take();
        }
        Ok(status)
    }
}

/// Speak `text` on `engine`, returning once it is spoken or stopped.
pub fn speak_to_completion<E: SpeechEngine>(engine: &mut E, text: &str) -> Result<(), SpeechError> {
    engine.say(text);
    engine.run_and_wait()
}

/// A speech program plus any fixed arguments it always gets.
#[derive(Debug, Clone, PartialEq)]
struct SpeechCommand {
    program: String,
    args: Vec<String>,
}

impl SpeechCommand {
    /// Split a configured command line such as `"festival --tts"`.
    fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Speech through the operating system's speech program
/// (`say` on macOS, espeak on Linux). The text is written to the program's
/// stdin, never to its argument list.
pub struct CommandSpeech {
    commands: Vec<SpeechCommand>,
    rate: Option<u32>,
    queue: Vec<String>,
    stop: StopHandle,
}

impl CommandSpeech {
    pub fn new(config: &SpeechConfig) -> Self {
        let commands = match config.command.as_deref().and_then(SpeechCommand::parse) {
            Some(command) => vec![command],
            None => default_programs()
                .iter()
                .map(|program| SpeechCommand {
                    program: program.to_string(),
                    args: Vec::new(),
                })
                .collect(),
        };
        Self {
            commands,
            rate: config.rate,
            queue: Vec::new(),
            stop: StopHandle::default(),
        }
    }

    /// Start the first available program.
    fn spawn(&self) -> Result<(String, Child), SpeechError> {
        for command in &self.commands {
            let program = &command.program;
            let result = Command::new(program)
                .args(&command.args)
                .args(speech_args(program, self.rate))
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
            match result {
                Ok(child) => return Ok((program.clone(), child)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("{program} not found, trying next");
                }
                Err(source) => {
                    return Err(SpeechError::Spawn {
                        program: program.clone(),
                        source,
                    })
                }
            }
        }
        let tried: Vec<&str> = self.commands.iter().map(|c| c.program.as_str()).collect();
        Err(SpeechError::NoEngine(tried.join(", ")))
    }
}

/// Write `text` to the speech program on its own thread, so a long text
/// filling the pipe cannot keep `stop` from reaching the child.
fn feed_stdin(mut stdin: ChildStdin, text: String) {
    std::thread::spawn(move || {
        if let Err(e) = stdin.write_all(text.as_bytes()) {
            if e.kind() != ErrorKind::BrokenPipe {
                log::warn!("Failed to send text to speech program: {e}");
            }
        }
    });
}

impl SpeechEngine for CommandSpeech {
    fn say(&mut self, text: &str) {
        self.queue.push(text.to_string());
    }

    fn run_and_wait(&mut self) -> Result<(), SpeechError> {
        for text in std::mem::take(&mut self.queue) {
            if self.stop.is_stopped() {
                break;
            }
            let (program, mut child) = self.spawn()?;
            log::info!("Speaking {} chars with {program}", text.len());
            if let Some(stdin) = child.stdin.take() {
                feed_stdin(stdin, text);
            }
            self.stop.track(child);

            let status = loop {
                match self.stop.try_wait()? {
                    Some(status) => break status,
                    None => std::thread::sleep(POLL_INTERVAL),
                }
            };
            if !status.success() && !self.stop.is_stopped() {
                return Err(SpeechError::Exit { program, status });
            }
        }
        Ok(())
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

#[cfg(target_os = "macos")]
fn default_programs() -> &'static [&'static str] {
    &["say"]
}

#[cfg(not(target_os = "macos"))]
fn default_programs() -> &'static [&'static str] {
    &["espeak-ng", "espeak", "spd-say"]
}

/// Arguments that make `program` read its text from stdin at `rate` wpm.
fn speech_args(program: &str, rate: Option<u32>) -> Vec<String> {
    let name = std::path::Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    let mut args = Vec::new();
    match name {
        "say" => {
            if let Some(rate) = rate {
                args.extend(["-r".to_string(), rate.to_string()]);
            }
            args.extend(["-f".to_string(), "-".to_string()]);
        }
        "espeak" | "espeak-ng" => {
            if let Some(rate) = rate {
                args.extend(["-s".to_string(), rate.to_string()]);
            }
            args.push("--stdin".to_string());
        }
        // spd-say returns immediately unless told to wait
        "spd-say" => args.extend(["-w".to_string(), "-e".to_string()]),
        _ => {}
    }
    args
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records what it was asked to say; never touches audio.
    #[derive(Default)]
    pub(crate) struct RecordingEngine {
        pub queued: Vec<String>,
        pub spoken: Vec<String>,
        pub fail: bool,
        pub stop: StopHandle,
    }

    impl SpeechEngine for RecordingEngine {
        fn say(&mut self, text: &str) {
            self.queued.push(text.to_string());
        }

        fn run_and_wait(&mut self) -> Result<(), SpeechError> {
            if self.fail {
                return Err(SpeechError::NoEngine("fake".into()));
            }
            if !self.stop.is_stopped() {
                self.spoken.append(&mut self.queued);
            }
            Ok(())
        }

        fn stop_handle(&self) -> StopHandle {
            self.stop.clone()
        }
    }

    #[test]
    fn speaks_queued_text() {
        let mut engine = RecordingEngine::default();
        speak_to_completion(&mut engine, "A cat sitting on a windowsill.").unwrap();
        assert_eq!(engine.spoken, vec!["A cat sitting on a windowsill."]);
    }

    #[test]
    fn empty_text_is_passed_through() {
        let mut engine = RecordingEngine::default();
        speak_to_completion(&mut engine, "").unwrap();
        assert_eq!(engine.spoken, vec![""]);
    }

    #[test]
    fn stop_before_run_skips_speech() {
        let mut engine = RecordingEngine::default();
        engine.stop_handle().stop();
        speak_to_completion(&mut engine, "hello").unwrap();
        assert!(engine.spoken.is_empty());
    }

    #[test]
    fn args_read_text_from_stdin() {
        assert_eq!(speech_args("say", Some(180)), vec!["-r", "180", "-f", "-"]);
        assert_eq!(
            speech_args("/usr/bin/espeak-ng", Some(150)),
            vec!["-s", "150", "--stdin"]
        );
        assert_eq!(speech_args("spd-say", Some(150)), vec!["-w", "-e"]);
        assert!(speech_args("festival", None).is_empty());
    }

    #[test]
    fn configured_command_keeps_its_arguments() {
        assert_eq!(
            SpeechCommand::parse("  festival --tts "),
            Some(SpeechCommand {
                program: "festival".into(),
                args: vec!["--tts".into()],
            })
        );
        assert_eq!(SpeechCommand::parse("   "), None);
    }

    #[test]
    fn missing_program_reports_no_engine() {
        let config = SpeechConfig {
            command: Some("pixel-to-prose-no-such-tts".into()),
            rate: None,
        };
        let mut engine = CommandSpeech::new(&config);
        let err = speak_to_completion(&mut engine, "hello").unwrap_err();
        assert!(matches!(err, SpeechError::NoEngine(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn stop_kills_running_utterance() {
        // `sleep` stands in for a long utterance
        let config = SpeechConfig {
            command: Some("sleep 30".into()),
            rate: None,
        };
        let mut engine = CommandSpeech::new(&config);
        let stop = engine.stop_handle();
        let worker = std::thread::spawn(move || speak_to_completion(&mut engine, "hello"));

        std::thread::sleep(Duration::from_millis(200));
        stop.stop();
        let started = std::time::Instant::now();
        worker.join().unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn text_starting_with_dash_is_not_an_option() {
        // `sleep 0` would reject a stray "-1" argument
        let config = SpeechConfig {
            command: Some("sleep 0".into()),
            rate: None,
        };
        let mut engine = CommandSpeech::new(&config);
        speak_to_completion(&mut engine, "-1").unwrap();
        speak_to_completion(&mut engine, "- A cat sitting on a windowsill.").unwrap();
    }
}
