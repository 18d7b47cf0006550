//! # Tracciato - Low-Overhead Event Recording
//!
//! A Rust library for recording fixed-size event records from many threads
//! at high frequency, and saving them at any moment into a self-describing
//! binary trace, without stopping the threads that produce them.
//!
//! ## The Problem
//!
//! Instrumented code wants to record an event in a handful of instructions.
//! Taking a lock per event, or even a contended atomic read-modify-write,
//! costs far more than that once many threads record at the same time. Yet
//! some other thread must be able to snapshot everything recorded so far and
//! write it out, while recording goes on.
//!
//! ## The Solution: Chunked Single-Producer Logs
//!
//! Every recording thread owns its own [`EventBuffer`](events::EventBuffer),
//! written through a [`Producer`](events::Producer):
//!
//! 1. **No shared writes on the hot path**: words go straight into the
//!    producer's current chunk; only the producer touches its write cursor.
//!
//! 2. **Publication per chunk**: when a chunk fills, the producer publishes
//!    its final size and then links the successor, both with release
//!    ordering. Readers acquire-load the same fields, so a linked chunk is
//!    always seen with its final size.
//!
//! 3. **Append-only chain**: chunks are never unlinked or reused while the
//!    buffer lives, so readers walk the chain without locks or reference
//!    counting.
//!
//! 4. **Two-phase serialization**: each component first commits to a
//!    payload length, then writes exactly that many bytes or fails. A string
//!    table that grew in between is detected instead of corrupting the frame.
//!
//! ## Trace Format
//!
//! ```text
//! ChunkHeader: id type length start_time end_time part_count     (24 bytes)
//! PartHeader[part_count]: type offset length                     (12 bytes each)
//! payload[part_count]: each padded to a multiple of 4 bytes
//! ```
//!
//! All fields are little-endian `u32`. See [`output`] for details.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`output`] | Binary writer and chunk/part framing |
//! | [`strings`] | Interned string table |
//! | [`events`] | Lock-free chunked event log and its producer handle |
//! | [`part`] | The two-phase serialization trait and chunk assembly |
//! | [`recorder`] | Per-thread buffer registry, `save` and `save_to_file` |
//! | [`reader`] | Decoding of trace byte streams |
//! | [`summary`] | Description of what a save wrote |
//!
//! ## Quick Start
//!
//! ```rust
//! use tracciato::recorder::{Recorder, RecorderConfig};
//! use tracciato::reader::{decode_chunks, decode_words};
//! use tracciato::output::PART_TYPE_EVENTS;
//!
//! let recorder = Recorder::new(RecorderConfig::default());
//!
//! let mut producer = recorder.register_thread("main").unwrap();
//! let event = producer.intern("main#request").unwrap();
//! producer.append(&[event, 200]).unwrap();
//! producer.publish();
//!
//! let mut trace = Vec::new();
//! recorder.save(&mut trace).unwrap();
//!
//! let chunks = decode_chunks(&trace).unwrap();
//! let words = decode_words(chunks[0].part(PART_TYPE_EVENTS).unwrap().payload).unwrap();
//! assert_eq!(words, vec![event, 200]);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `Serialize`/`Deserialize` for configuration and summaries |
//! | `json` | [`FlushSummary::to_json`](summary::FlushSummary::to_json) |
//! | `full` | All optional features |
//!
//! ## Logging
//!
//! The library emits [`tracing`] events (`debug` for saves and chunk
//! framing, `trace` for chunk publication, `warn` for failed or retried
//! chunks). It never installs a subscriber.

pub mod error;
pub mod events;
pub mod output;
pub mod part;
pub mod reader;
pub mod recorder;
pub mod strings;
pub mod summary;

pub use error::{Result, TraceError};
