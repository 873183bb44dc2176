use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::{ChunkEvent, LogSource, receive_stamp};
use crate::config::DEFAULT_CHANNEL_BUFFER;
use crate::format::RawChunk;

/// A chunk source that reads piped standard input
pub struct StdinSource;

#[async_trait::async_trait]
impl LogSource for StdinSource {
    async fn stream(&self) -> mpsc::Receiver<ChunkEvent> {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let chunk = RawChunk {
                            message: line,
                            timestamp: Some(receive_stamp()),
                        };
                        if tx.send(ChunkEvent::Chunks(vec![chunk])).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        let _ = tx.send(ChunkEvent::EndOfStream).await;
                        break;
                    }
                    Err(e) => {
                        let _ = tx
                            .send(ChunkEvent::Error(format!("Error reading stdin: {}", e)))
                            .await;
                        let _ = tx.send(ChunkEvent::EndOfStream).await;
                        break;
                    }
                }
            }
        });

        rx
    }

    fn name(&self) -> String {
        "stdin".to_string()
    }
}
