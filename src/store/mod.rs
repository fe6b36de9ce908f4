//! Conversation threads: per-thread, append-only message history.
//!
//! Appends to one thread are serialized through a per-thread async mutex.
//! The thread map itself is guarded by a plain mutex that is only held for
//! the lookup, so unrelated threads never wait on each other's I/O.

pub mod jsonl;

pub use jsonl::JsonlConversationStore;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentryError, Result};
use crate::types::{Message, Role};

/// Opaque conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn new(id: ThreadId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for conversation threads.
///
/// Implementations never reorder or drop messages. A thread is created by its
/// first append; reading an unknown thread yields an empty history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one message and return its index in the thread.
    async fn append(&self, thread_id: &ThreadId, message: Message) -> Result<usize> {
        self.append_batch(thread_id, vec![message]).await
    }

    /// Append several messages as one unit and return the index of the first.
    /// No other append to the same thread can land between them.
    async fn append_batch(&self, thread_id: &ThreadId, messages: Vec<Message>) -> Result<usize>;

    /// Full ordered history of a thread.
    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>>;

    /// Known thread ids, sorted.
    async fn thread_ids(&self) -> Result<Vec<ThreadId>>;
}

pub(crate) fn ensure_storable(messages: &[Message]) -> Result<()> {
    if messages.iter().any(|m| m.role == Role::System) {
        return Err(AgentryError::Store(
            "system messages are supplied per request and never stored".into(),
        ));
    }
    Ok(())
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<Thread>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, thread_id: &ThreadId) -> Result<Option<Arc<tokio::sync::Mutex<Thread>>>> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| AgentryError::Store("thread map lock poisoned".into()))?;
        Ok(threads.get(thread_id).cloned())
    }

    fn get_or_create(&self, thread_id: &ThreadId) -> Result<Arc<tokio::sync::Mutex<Thread>>> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| AgentryError::Store("thread map lock poisoned".into()))?;
        Ok(threads
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Thread::new(thread_id.clone()))))
            .clone())
    }

    /// Snapshot of a whole thread, if it exists.
    pub async fn thread(&self, thread_id: &ThreadId) -> Result<Option<Thread>> {
        match self.existing(thread_id)? {
            Some(thread) => Ok(Some(thread.lock().await.clone())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_batch(&self, thread_id: &ThreadId, messages: Vec<Message>) -> Result<usize> {
        ensure_storable(&messages)?;
        let thread = self.get_or_create(thread_id)?;
        let mut thread = thread.lock().await;
        let first = thread.messages.len();
        let count = messages.len();
        thread.messages.extend(messages);
        thread.updated_at = Utc::now();
        tracing::trace!(thread_id = %thread_id, first, count, "appended messages");
        Ok(first)
    }

    async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        match self.existing(thread_id)? {
            Some(thread) => Ok(thread.lock().await.messages.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn thread_ids(&self) -> Result<Vec<ThreadId>> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| AgentryError::Store("thread map lock poisoned".into()))?;
        let mut ids: Vec<ThreadId> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
