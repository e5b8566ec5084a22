// ABOUTME: JSONL transcript logger that appends each chat message to a log file.
// ABOUTME: Stores transcripts per working directory in ~/.local/share/streamclaw/sessions/<hash>/.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::provider::ChatMessage;

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: ChatMessage,
}

/// Deterministic hex hash of a directory path, used to group transcripts.
pub fn workspace_hash(workspace_dir: &Path) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    workspace_dir.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Appends chat messages as JSONL lines to a transcript file.
pub struct SessionLogger {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl SessionLogger {
    /// Open a new transcript for chats started from `workspace_dir`.
    pub fn new(workspace_dir: &Path) -> anyhow::Result<Self> {
        let session_dir = Config::sessions_dir().join(workspace_hash(workspace_dir));
        Self::new_in_dir(&session_dir)
    }

    /// Open a new transcript inside `session_dir`, named by the current time.
    pub fn new_in_dir(session_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(session_dir)
            .with_context(|| format!("creating {}", session_dir.display()))?;
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f").to_string();
        let path = session_dir.join(format!("{}.jsonl", timestamp));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Path of the transcript being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_message(&mut self, message: &ChatMessage) -> anyhow::Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            message: message.clone(),
        };
        let line = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Read every entry of a transcript back, in order.
pub fn read_transcript(path: &Path) -> anyhow::Result<Vec<LogEntry>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line)
            .with_context(|| format!("{} line {}", path.display(), index + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}
