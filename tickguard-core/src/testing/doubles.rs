//! In-memory stand-ins for the log sinks, notification transport and
//! configuration store

use crate::config::{ConfigError, ConfigSource, SymbolConfig};
use crate::journal::RecordSink;
use crate::notify::{NoteTransport, NotifyError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// Sink that keeps every line in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines whose third field (the event tag) equals `tag`
    pub fn tagged(&self, tag: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.split(',').nth(2) == Some(tag))
            .cloned()
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn append(&self, line: String) {
        self.lines.lock().push(line);
    }
}

/// Transport that records notes and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failures: Arc<Mutex<usize>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` sends fail
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock() = n;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(title, _)| title.clone()).collect()
    }
}

#[async_trait]
impl NoteTransport for RecordingTransport {
    async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(NotifyError::Transport("scripted failure".to_string()));
            }
        }
        self.sent.lock().push((title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ConfigPoll {
    Update(Vec<SymbolConfig>),
    Unreadable(String),
    Invalid(String),
}

/// Configuration source fed by the test
///
/// Each poll consumes one queued outcome; an empty queue means "unchanged".
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfigSource {
    polls: Arc<Mutex<VecDeque<ConfigPoll>>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_update(&self, configs: Vec<SymbolConfig>) {
        self.polls.lock().push_back(ConfigPoll::Update(configs));
    }

    /// A poll that cannot read the store at all
    pub fn push_error(&self, message: &str) {
        self.polls.lock().push_back(ConfigPoll::Unreadable(message.to_string()));
    }

    /// A poll that reads content which fails to parse or validate
    pub fn push_invalid(&self, message: &str) {
        self.polls.lock().push_back(ConfigPoll::Invalid(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl ConfigSource for ScriptedConfigSource {
    fn poll_for_update(&mut self) -> Result<Option<Vec<SymbolConfig>>, ConfigError> {
        *self.calls.lock() += 1;
        match self.polls.lock().pop_front() {
            None => Ok(None),
            Some(ConfigPoll::Update(configs)) => Ok(Some(configs)),
            Some(ConfigPoll::Unreadable(message)) => Err(ConfigError::Io {
                path: PathBuf::from("scripted"),
                source: std::io::Error::other(message),
            }),
            Some(ConfigPoll::Invalid(message)) => Err(ConfigError::Invalid(message)),
        }
    }
}
