use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

/// Destination for formatted log lines
pub trait RecordSink: Send + Sync {
    fn append(&self, line: String);

    /// Block until every line appended so far is durable
    fn flush(&self) {}
}

enum WriterCommand {
    Line(String),
    Flush(Sender<()>),
}

/// Append-only file written by a dedicated thread
///
/// Lines are handed over a bounded channel and never dropped: when the
/// writer thread falls behind, `append` waits for space. Dropping the writer
/// drains the channel and joins the thread.
pub struct LogWriter {
    path: PathBuf,
    sender: Option<Sender<WriterCommand>>,
    thread_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LogWriter {
    pub const CHANNEL_CAPACITY: usize = 4096;

    /// Open (or create) `path` for appending and start the writer thread
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;

        let (sender, receiver) = bounded(Self::CHANNEL_CAPACITY);
        let thread_path = path.clone();
        let handle = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || Self::writer_loop(thread_path, BufWriter::new(file), receiver))
            .context("spawning log writer thread")?;

        Ok(Self {
            path,
            sender: Some(sender),
            thread_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer_loop(path: PathBuf, mut file: BufWriter<std::fs::File>, receiver: Receiver<WriterCommand>) {
        for command in receiver {
            match command {
                WriterCommand::Line(line) => {
                    if let Err(e) = writeln!(file, "{}", line) {
                        error!(path = %path.display(), "Failed to write log line: {}", e);
                    }
                }
                WriterCommand::Flush(ack) => {
                    if let Err(e) = file.flush() {
                        error!(path = %path.display(), "Failed to flush log: {}", e);
                    }
                    let _ = ack.send(());
                }
            }
        }

        if let Err(e) = file.flush() {
            error!(path = %path.display(), "Failed to flush log: {}", e);
        }
        info!(path = %path.display(), "Log writer thread stopping");
    }
}

impl RecordSink for LogWriter {
    fn append(&self, line: String) {
        let Some(sender) = &self.sender else {
            return;
        };
        let sent = match sender.try_send(WriterCommand::Line(line)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                without_stalling_runtime(|| sender.send(command)).map_err(|_| ())
            }
            Err(TrySendError::Disconnected(_)) => Err(()),
        };
        if sent.is_err() {
            error!(path = %self.path.display(), "Log writer disconnected, record lost");
        }
    }

    fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        without_stalling_runtime(|| {
            if sender.send(WriterCommand::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        });
    }
}

/// Run a blocking channel operation from whatever thread the caller is on.
///
/// On a multi-threaded tokio worker the wait is moved off the scheduler with
/// `block_in_place`. A current-thread runtime cannot do that; there the wait
/// is bounded by the writer thread draining one buffered write.
fn without_stalling_runtime<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop
        let _ = self.sender.take();
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn append(&self, _line: String) {}
}
