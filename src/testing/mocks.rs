//! Test doubles for the engine, the user and the reload hook

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::apply::backup_path;
use crate::engine::{EngineError, EngineOutcome, TransformEngine, TransformReport};
use crate::interaction::UserInteraction;
use crate::workflow::ReloadHook;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Apply,
    Fail,
    Panic,
    Decline,
    LoseBackup,
}

/// Engine that writes fixed content to the destination, then behaves as scripted
#[derive(Debug)]
pub struct ScriptedEngine {
    content: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(content: &str, script: Script) -> Self {
        Self {
            content: content.to_string(),
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Writes `content` and reports one applied change
    pub fn applies(content: &str) -> Self {
        Self::new(content, Script::Apply)
    }

    /// Writes `content`, then returns a descriptor error
    pub fn corrupts_then_fails(content: &str) -> Self {
        Self::new(content, Script::Fail)
    }

    /// Writes `content`, then panics
    pub fn corrupts_then_panics(content: &str) -> Self {
        Self::new(content, Script::Panic)
    }

    /// Writes `content`, then reports that nothing was applied
    pub fn corrupts_then_declines(content: &str) -> Self {
        Self::new(content, Script::Decline)
    }

    /// Writes `content`, deletes the destination's backup, then returns a
    /// descriptor error so the rollback has nothing to restore from
    pub fn corrupts_and_deletes_backup(content: &str) -> Self {
        Self::new(content, Script::LoseBackup)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TransformEngine for ScriptedEngine {
    fn transform(
        &self,
        _source: &Path,
        descriptor: &Path,
        destination: &Path,
    ) -> Result<EngineOutcome, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::write(destination, &self.content).map_err(EngineError::io(destination))?;

        match self.script {
            Script::Apply => Ok(EngineOutcome::Applied(TransformReport {
                applied: 1,
                skipped: 0,
            })),
            Script::Fail => Err(EngineError::MalformedDescriptor {
                path: descriptor.to_path_buf(),
                message: "scripted failure".to_string(),
            }),
            Script::LoseBackup => {
                let backup = backup_path(destination);
                fs::remove_file(&backup).map_err(EngineError::io(&backup))?;
                Err(EngineError::MalformedDescriptor {
                    path: descriptor.to_path_buf(),
                    message: "scripted failure".to_string(),
                })
            }
            Script::Panic => panic!("scripted panic"),
            Script::Decline => Ok(EngineOutcome::NotApplied(TransformReport {
                applied: 0,
                skipped: 1,
            })),
        }
    }
}

/// Mock user interaction that records every message
pub struct MockUserInteraction {
    pub yes_no_responses: Mutex<Vec<bool>>,
    pub messages: Mutex<Vec<String>>,
}

impl Default for MockUserInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUserInteraction {
    pub fn new() -> Self {
        Self {
            yes_no_responses: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn add_yes_no_response(&self, response: bool) {
        self.yes_no_responses.lock().unwrap().push(response);
    }

    pub fn get_messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(format!("{kind}: {message}"));
    }
}

impl UserInteraction for MockUserInteraction {
    fn prompt_yes_no(&self, message: &str, _default: bool) -> Result<bool> {
        self.record("PROMPT", message);
        self.yes_no_responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No mock response configured"))
    }

    fn display_info(&self, message: &str) {
        self.record("INFO", message);
    }

    fn display_warning(&self, message: &str) {
        self.record("WARN", message);
    }

    fn display_error(&self, message: &str) {
        self.record("ERROR", message);
    }

    fn display_success(&self, message: &str) {
        self.record("SUCCESS", message);
    }
}

/// Reload hook that remembers which files it was asked to reload
#[derive(Debug, Default)]
pub struct RecordingReload {
    reloaded: Mutex<Vec<PathBuf>>,
}

impl RecordingReload {
    pub fn reloaded(&self) -> Vec<PathBuf> {
        self.reloaded.lock().unwrap().clone()
    }
}

impl ReloadHook for RecordingReload {
    fn reload(&self, path: &Path) {
        self.reloaded.lock().unwrap().push(path.to_path_buf());
    }
}
