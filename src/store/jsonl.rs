//! File-backed store: one JSON-lines file per thread.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

use super::{ensure_storable, ConversationStore, ThreadId};
use crate::error::{AgentryError, Result};
use crate::types::Message;

#[derive(Serialize, Deserialize)]
struct Record {
    thread_id: ThreadId,
    message: Message,
}

/// Writes each thread to `<dir>/<label>-<hash>.jsonl`.
///
/// A batch is encoded up front and written with a single append, so a crash
/// can at worst leave a truncated final line, which is skipped on read.
pub struct JsonlConversationStore {
    dir: PathBuf,
    /// Per-thread lock guarding the cached message count.
    locks: Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<Option<usize>>>>>,
}

impl JsonlConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `thread_id`.
    pub fn thread_path(&self, thread_id: &ThreadId) -> PathBuf {
        let digest = Sha256::digest(thread_id.as_str().as_bytes());
        let hash: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
        self.dir
            .join(format!("{}-{hash}.jsonl", normalize_label(thread_id.as_str())))
    }

    fn lock_for(&self, thread_id: &ThreadId) -> Result<Arc<tokio::sync::Mutex<Option<usize>>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| AgentryError::Store("thread lock map poisoned".into()))?;
        Ok(locks
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone())
    }

    async fn read_records(path: &Path) -> Result<Vec<Record>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AgentryError::Store(format!(
                    "failed to open thread file '{}': {err}",
                    path.display()
                )))
            }
        };

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "skipping malformed thread record"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn append_batch(&self, thread_id: &ThreadId, messages: Vec<Message>) -> Result<usize> {
        ensure_storable(&messages)?;
        let lock = self.lock_for(thread_id)?;
        let mut len = lock.lock().await;

        // Cleared until the write lands so a failed append forces a recount.
        let cached = len.take();
        let path = self.thread_path(thread_id);
        let first = match cached {
            Some(n) => n,
            None => Self::read_records(&path).await?.len(),
        };
        let mut buf = Vec::new();
        if ends_mid_line(&path).await? {
            buf.push(b'\n');
        }

        let count = messages.len();
        for message in messages {
            serde_json::to_writer(
                &mut buf,
                &Record {
                    thread_id: thread_id.clone(),
                    message,
                },
            )?;
            buf.push(b'\n');
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            AgentryError::Store(format!(
                "failed to create directory '{}': {err}",
                self.dir.display()
            ))
        })?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| {
                AgentryError::Store(format!(
                    "failed to open thread file '{}': {err}",
                    path.display()
                ))
            })?;
        file.write_all(&buf).await?;
        file.flush().await?;

        *len = Some(first + count);
        tracing::trace!(thread_id = %thread_id, first, count, "appended messages");
        Ok(first)
    }

    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        let lock = self.lock_for(thread_id)?;
        let _guard = lock.lock().await;
        let records = Self::read_records(&self.thread_path(thread_id)).await?;
        Ok(records.into_iter().map(|r| r.message).collect())
    }

    async fn thread_ids(&self) -> Result<Vec<ThreadId>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(file) = tokio::fs::File::open(&path).await else {
                continue;
            };
            let mut lines = BufReader::new(file).lines();
            if let Ok(Some(line)) = lines.next_line().await {
                if let Ok(record) = serde_json::from_str::<Record>(&line) {
                    ids.push(record.thread_id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Whether the file's last line is unterminated, as after a torn write.
async fn ends_mid_line(path: &Path) -> Result<bool> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

fn normalize_label(value: &str) -> String {
    let mut out: String = value
        .trim()
        .chars()
        .take(48)
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' {
                lower
            } else {
                '-'
            }
        })
        .collect();
    if out.trim_matches('-').is_empty() {
        out = "thread".to_string();
    }
    out
}
