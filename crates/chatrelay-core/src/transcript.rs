//! Append-only transcript of raw event frames.
//!
//! Useful when a chat view shows something odd: the transcript holds exactly
//! what the OpenCode server sent, one timestamped line per frame.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to a transcript file. `None` inside means disabled.
pub type TranscriptHandle = Arc<Mutex<Option<File>>>;

/// A handle that records nothing.
pub fn disabled() -> TranscriptHandle {
    Arc::new(Mutex::new(None))
}

/// Open (or create) `{dir}/{name}.log` for appending.
///
/// Any failure to create the directory or file yields a disabled handle;
/// transcripts are a debugging aid and must never stop the relay.
pub fn open_transcript(dir: Option<&Path>, name: &str) -> TranscriptHandle {
    let file = dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", name)))
            .ok()
    });
    Arc::new(Mutex::new(file))
}

/// Write `[timestamp] label: data` if the transcript is enabled.
pub fn record(handle: &TranscriptHandle, label: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            let _ = writeln!(file, "[{}] {}: {}", ts, label, data);
            let _ = file.flush();
        }
    }
}
