//! Recorder: owns the per-thread event buffers and saves them as a trace.
//!
//! The [`Recorder`] is the piece that ties the core together. Each
//! instrumented thread registers once and receives a [`Producer`] for its own
//! [`EventBuffer`]; all threads share one [`StringTable`]. Any thread can
//! then call [`Recorder::save`] or [`Recorder::save_to_file`] at any moment,
//! without stopping the producers.
//!
//! # Save Protocol
//!
//! For every registered buffer, in registration order, the recorder writes
//! one chunk with two parts, the string table followed by the event log:
//!
//! ```text
//!   populate_header ──► start_chunk ──► write_to ──► sink
//!         ▲                                │
//!         └──── size mismatch: retry ◄─────┘
//! ```
//!
//! Each chunk is assembled in memory first. If a part reports a size
//! mismatch (a string was interned between the two phases), the chunk is
//! rebuilt from freshly computed headers, up to
//! [`RecorderConfig::max_flush_attempts`] times. Only complete chunks reach
//! the sink.
//!
//! # Examples
//!
//! ```rust
//! use std::thread;
//! use std::sync::Arc;
//! use tracciato::recorder::{Recorder, RecorderConfig};
//!
//! let recorder = Arc::new(Recorder::new(RecorderConfig::default()));
//!
//! let worker = {
//!     let recorder = Arc::clone(&recorder);
//!     thread::spawn(move || {
//!         let mut producer = recorder.register_thread("worker").unwrap();
//!         let event = producer.intern("worker#tick").unwrap();
//!         for i in 0..1000 {
//!             producer.append(&[event, i]).unwrap();
//!         }
//!     })
//! };
//! worker.join().unwrap();
//!
//! let mut trace = Vec::new();
//! let summary = recorder.save(&mut trace).unwrap();
//! assert_eq!(summary.chunks.len(), 1);
//! assert_eq!(summary.total_event_words(), 2000);
//! ```

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use atomic_time::AtomicOptionInstant;
use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{EventBuffer, Producer, DEFAULT_CHUNK_SIZE_BYTES};
use crate::output::{ChunkHeader, OutputBuffer, PartHeader};
use crate::part::{write_chunk, Part};
use crate::strings::StringTable;
use crate::summary::{ChunkSummary, FlushSummary};

/// Chunk type of the chunks written by [`Recorder::save`].
pub const CHUNK_TYPE_EVENTS: u32 = 0x2;

/// Configuration for a [`Recorder`].
///
/// # Examples
///
/// ```rust
/// use tracciato::recorder::RecorderConfig;
///
/// let config = RecorderConfig::default()
///     .with_chunk_size_bytes(16 * 1024)
///     .with_max_flush_attempts(5);
/// assert_eq!(config.chunk_size_bytes, 16 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RecorderConfig {
    /// Byte budget of every event chunk.
    pub chunk_size_bytes: usize,
    /// Chunk type written in every chunk header.
    pub chunk_type: u32,
    /// How many times a chunk is rebuilt after a size mismatch.
    pub max_flush_attempts: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            chunk_type: CHUNK_TYPE_EVENTS,
            max_flush_attempts: 3,
        }
    }
}

impl RecorderConfig {
    /// Sets the chunk byte budget.
    pub fn with_chunk_size_bytes(self, chunk_size_bytes: usize) -> Self {
        Self {
            chunk_size_bytes,
            ..self
        }
    }

    /// Sets the chunk type written in chunk headers.
    pub fn with_chunk_type(self, chunk_type: u32) -> Self {
        Self { chunk_type, ..self }
    }

    /// Sets the number of attempts per chunk.
    pub fn with_max_flush_attempts(self, max_flush_attempts: usize) -> Self {
        Self {
            max_flush_attempts,
            ..self
        }
    }
}

/// Registry of per-thread event buffers sharing one string table.
pub struct Recorder {
    config: RecorderConfig,
    strings: Arc<StringTable>,
    buffers: Mutex<Vec<Arc<EventBuffer>>>,
    epoch: Instant,
    last_save: AtomicOptionInstant,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            strings: Arc::new(StringTable::new()),
            buffers: Mutex::new(Vec::new()),
            epoch: Instant::now(),
            last_save: AtomicOptionInstant::none(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// The string table shared by every registered thread.
    pub fn string_table(&self) -> &Arc<StringTable> {
        &self.strings
    }

    /// Number of registered buffers.
    pub fn thread_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Registers a producing thread and returns its producer.
    ///
    /// `name` is interned so that it is part of every saved string table.
    pub fn register_thread(&self, name: &str) -> Result<Producer> {
        let name_id = self.strings.get_string_id(name)?;
        let producer =
            EventBuffer::new_claimed(Arc::clone(&self.strings), self.config.chunk_size_bytes);
        let mut buffers = self.buffers.lock();
        buffers.push(Arc::clone(producer.buffer()));
        debug!(thread = name, name_id, index = buffers.len() - 1, "thread registered");
        Ok(producer)
    }

    fn millis(&self, at: Instant) -> u32 {
        at.saturating_duration_since(self.epoch).as_millis() as u32
    }

    /// Writes one chunk per registered buffer to `sink`.
    ///
    /// Only words already published by each producer are included.
    pub fn save<W: Write + ?Sized>(&self, sink: &mut W) -> Result<FlushSummary> {
        let now = Instant::now();
        let start_time = self
            .last_save
            .load(Ordering::Acquire)
            .map_or(0, |at| self.millis(at));
        let end_time = self.millis(now);

        let buffers = self.buffers.lock().clone();
        let mut summary = FlushSummary::default();
        let mut bytes = Vec::new();
        for (index, buffer) in buffers.iter().enumerate() {
            let header =
                ChunkHeader::new(index as u32, self.config.chunk_type, start_time, end_time);
            let parts = self.assemble(header, buffer, &mut bytes)?;
            sink.write_all(&bytes)?;
            summary
                .chunks
                .push(ChunkSummary::new(header.id, bytes.len() as u32, &parts));
        }
        sink.flush()?;

        self.last_save.store(Some(now), Ordering::Release);
        debug!(
            chunks = summary.chunks.len(),
            bytes = summary.total_bytes(),
            "trace saved"
        );
        Ok(summary)
    }

    /// Builds one chunk into `bytes`, retrying on size mismatch.
    fn assemble(
        &self,
        header: ChunkHeader,
        buffer: &EventBuffer,
        bytes: &mut Vec<u8>,
    ) -> Result<Vec<PartHeader>> {
        let parts: [&dyn Part; 2] = [&*self.strings, buffer];
        let attempts = self.config.max_flush_attempts.max(1);
        let mut attempt = 1;
        loop {
            bytes.clear();
            let mut output = OutputBuffer::new(&mut *bytes);
            match write_chunk(&mut output, header, &parts) {
                Ok(parts) => return Ok(parts),
                Err(err) if err.is_size_mismatch() && attempt < attempts => {
                    warn!(chunk = header.id, attempt, %err, "chunk changed while saving, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(chunk = header.id, attempt, %err, "failed to save chunk");
                    return Err(err);
                }
            }
        }
    }

    /// Saves the trace to `path`, replacing it only if the save succeeds.
    ///
    /// The trace is written to a temporary file next to `path` and renamed
    /// into place once complete.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<FlushSummary> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        let summary = {
            let mut writer = BufWriter::new(file.as_file_mut());
            self.save(&mut writer)?
        };
        file.persist(path)?;
        debug!(path = %path.display(), "trace persisted");
        Ok(summary)
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("threads", &self.thread_count())
            .field("strings", &self.strings.len())
            .finish()
    }
}
