//! Chunk source abstraction and implementations.
//!
//! Provides a unified `LogSource` trait with implementations for:
//! - Local files (via `tail -F`)
//! - Piped standard input
//!
//! Sources deliver raw text chunks; the formatter worker turns them into
//! displayable lines, so a source never needs to know about wrapping,
//! severity tags, or group markers.

pub mod file;
pub mod stdin;

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::format::RawChunk;

/// Describes how a chunk source is configured
#[derive(Clone, Debug)]
pub enum SourceKind {
    File { path: PathBuf },
    Stdin,
}

impl SourceKind {
    pub fn name(&self) -> String {
        match self {
            SourceKind::File { path } => path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            SourceKind::Stdin => "stdin".to_string(),
        }
    }
}

/// Events emitted by chunk sources
pub enum ChunkEvent {
    Chunks(Vec<RawChunk>),
    Error(String),
    EndOfStream,
}

/// Trait for chunk sources
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    /// Start streaming chunk events
    async fn stream(&self) -> mpsc::Receiver<ChunkEvent>;

    /// Get the display name for this source
    fn name(&self) -> String;
}

/// Receive timestamp attached to each chunk
pub(crate) fn receive_stamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
