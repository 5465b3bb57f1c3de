//! Voice capture pipeline for profile onboarding.
//!
//! One recorder may be active at a time: the microphone and the capture
//! process are exclusively owned by the recording question's session, and
//! acquiring a session while another is active fails fast with
//! [`VoiceError::Busy`]. Capture runs an OS recorder subprocess (`arecord`,
//! falling back to sox's `rec`) streaming WAV bytes to a collector task;
//! stopping kills the recorder, packages the buffered audio, and uploads it
//! base64-encoded for transcription.

use std::path::Path;
use std::process::Stdio;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::error::VoiceError;
use crate::protocol::{CreatePersonaRequest, Profile, QaEntry};

/// A WAV header alone is 44 bytes; anything at or under that captured
/// nothing usable.
const MIN_CAPTURE_BYTES: usize = 44;

// ---------------------------------------------------------------------------
// Per-question row state
// ---------------------------------------------------------------------------

/// Capture phase of one question's recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Idle,
    Recording,
    /// Finalizing: recorder stopped, audio packaged, transcription upload
    /// in flight. Rendered as "Transcribing…".
    Stopping,
}

/// Display state of one onboarding question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    pub question: String,
    /// Transcribed answer; empty until a transcription succeeds.
    pub answer: String,
    pub phase: RecorderPhase,
    /// Inline error scoped to this row, shown in place of the transcript.
    pub error: Option<String>,
}

impl QuestionRow {
    fn new(question: String) -> Self {
        QuestionRow {
            question,
            answer: String::new(),
            phase: RecorderPhase::Idle,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Capture subprocess
// ---------------------------------------------------------------------------

struct ActiveRecording {
    index: usize,
    child: Child,
    collector: JoinHandle<Vec<u8>>,
}

fn path_contains(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
}

/// Pick the capture command: `arecord` where ALSA tooling exists, sox's
/// `rec` otherwise. Both stream little-endian 16 kHz mono WAV to stdout.
fn detect_capture_program() -> Option<(String, Vec<String>)> {
    if path_contains("arecord") {
        Some((
            "arecord".to_string(),
            ["-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-t", "wav", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ))
    } else if path_contains("rec") {
        Some((
            "rec".to_string(),
            ["-q", "-t", "wav", "-r", "16000", "-c", "1", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        ))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct VoicePipeline {
    api: ApiClient,
    rows: Vec<QuestionRow>,
    active: Option<ActiveRecording>,
    saved_profile: Option<Profile>,
    create_in_flight: bool,
    /// Explicit recorder command override (config/env); auto-detected when
    /// unset.
    capture_program: Option<(String, Vec<String>)>,
}

impl VoicePipeline {
    pub fn new(api: ApiClient) -> Self {
        VoicePipeline {
            api,
            rows: Vec::new(),
            active: None,
            saved_profile: None,
            create_in_flight: false,
            capture_program: None,
        }
    }

    /// Override the capture command (e.g. from `MINGLE_CAPTURE`).
    pub fn set_capture_program(&mut self, program: String, args: Vec<String>) {
        self.capture_program = Some((program, args));
    }

    pub fn set_questions(&mut self, questions: Vec<String>) {
        self.rows = questions.into_iter().map(QuestionRow::new).collect();
    }

    pub fn rows(&self) -> &[QuestionRow] {
        &self.rows
    }

    pub fn save_profile(&mut self, profile: Profile) {
        self.saved_profile = Some(profile);
    }

    pub fn saved_profile(&self) -> Option<&Profile> {
        self.saved_profile.as_ref()
    }

    pub fn is_creating(&self) -> bool {
        self.create_in_flight
    }

    /// The subset of entries with non-empty answers, or `None` when no
    /// question was answered — sent as an explicit `null` so the server can
    /// tell "no answers" from "no questions".
    pub fn answered_entries(&self) -> Option<Vec<QaEntry>> {
        let answered: Vec<QaEntry> = self
            .rows
            .iter()
            .filter(|row| !row.answer.is_empty())
            .map(|row| QaEntry {
                question: row.question.clone(),
                answer: row.answer.clone(),
            })
            .collect();
        if answered.is_empty() {
            None
        } else {
            Some(answered)
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Acquire the microphone for question `index` and start buffering
    /// audio. Rejects when any session is already active; device failures
    /// revert the row to Idle with an inline error and leave other rows
    /// untouched.
    pub async fn start_recording(&mut self, index: usize) -> Result<(), VoiceError> {
        if index >= self.rows.len() {
            return Err(VoiceError::UnknownQuestion(index));
        }
        if self.active.is_some() {
            return Err(VoiceError::Busy);
        }

        let (program, args) = match self.capture_program.clone().or_else(detect_capture_program) {
            Some(cmd) => cmd,
            None => {
                let err = VoiceError::Device(
                    "no capture tool found (install alsa-utils or sox)".to_string(),
                );
                self.fail_row(index, &err);
                return Err(err);
            }
        };

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = VoiceError::Device(format!("{}: {}", program, e));
                self.fail_row(index, &err);
                return Err(err);
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            let err = VoiceError::Device("capture stream unavailable".to_string());
            self.fail_row(index, &err);
            return Err(err);
        };

        let collector = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });

        tracing::debug!(question = index, program = %program, "recording started");
        self.active = Some(ActiveRecording {
            index,
            child,
            collector,
        });
        let row = &mut self.rows[index];
        row.phase = RecorderPhase::Recording;
        row.error = None;
        Ok(())
    }

    /// Stop the recorder for question `index`, release the device, upload
    /// the captured audio and store the trimmed transcript as the answer.
    /// On failure the answer stays empty and the row carries an inline
    /// error.
    pub async fn stop_recording(&mut self, index: usize) -> Result<String, VoiceError> {
        let Some(active) = self.active.take() else {
            return Err(VoiceError::NotRecording(index));
        };
        if active.index != index {
            // A misdirected stop must not kill another question's session.
            self.active = Some(active);
            return Err(VoiceError::NotRecording(index));
        }
        let mut active = active;
        self.rows[index].phase = RecorderPhase::Stopping;

        // Release the device before anything else: kill the recorder and
        // reap it, then drain whatever the collector buffered.
        let _ = active.child.start_kill();
        let _ = active.child.wait().await;
        let audio = match active.collector.await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = VoiceError::Device(format!("capture task failed: {}", e));
                self.fail_row(index, &err);
                return Err(err);
            }
        };
        tracing::debug!(question = index, bytes = audio.len(), "recording stopped");

        if audio.len() <= MIN_CAPTURE_BYTES {
            let err = VoiceError::Device("no audio captured".to_string());
            self.fail_row(index, &err);
            return Err(err);
        }

        match self.api.transcribe(BASE64.encode(&audio)).await {
            Ok(response) => {
                let text = response.text.trim().to_string();
                let row = &mut self.rows[index];
                row.answer = text.clone();
                row.phase = RecorderPhase::Idle;
                row.error = None;
                Ok(text)
            }
            Err(e) => {
                let err = VoiceError::Transcribe(e.to_string());
                self.fail_row(index, &err);
                Err(err)
            }
        }
    }

    fn fail_row(&mut self, index: usize, err: &VoiceError) {
        if let Some(row) = self.rows.get_mut(index) {
            row.phase = RecorderPhase::Idle;
            row.error = Some(err.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Persona creation
    // -----------------------------------------------------------------------

    /// Create the persona from the saved profile plus answered questions.
    /// Refuses without a saved profile, and rejects duplicate submissions
    /// while a request is in flight.
    pub async fn create_persona(&mut self) -> Result<(), VoiceError> {
        if self.create_in_flight {
            return Err(VoiceError::CreateInFlight);
        }
        let profile = self
            .saved_profile
            .clone()
            .ok_or(VoiceError::ProfileMissing)?;

        let request = CreatePersonaRequest {
            profile,
            conversation: self.answered_entries(),
        };

        self.create_in_flight = true;
        let result = self.api.create_persona(&request).await;
        self.create_in_flight = false;

        result.map_err(|e| VoiceError::Transcribe(e.to_string()))
    }
}

/// True when the given path looks like an executable name that exists on
/// PATH — used by config validation before accepting a capture override.
pub fn capture_program_available(program: &str) -> bool {
    Path::new(program).is_file() || path_contains(program)
}
