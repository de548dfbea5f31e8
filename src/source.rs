use anyhow::{Context, Result};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::event::TaskAttemptEvent;

/// Errors produced while reading the record stream.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The underlying stream failed; not recoverable per-record.
    #[error("reading record stream: {0}")]
    Io(#[from] std::io::Error),

    /// One record line failed to decode; the stream itself is still good.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

type DynRead = Box<dyn AsyncRead + Send + Unpin>;

/// Newline-delimited JSON source of task-attempt records.
///
/// Blank lines are skipped; malformed lines surface as
/// [`RecordError::Malformed`] so the caller can count and drop them without
/// tearing the stream down.
pub struct RecordSource {
    lines: Lines<BufReader<DynRead>>,
}

impl RecordSource {
    /// Opens the configured path, with "-" standing for stdin.
    pub async fn open(path: &str) -> Result<Self> {
        let reader: DynRead = if path == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening record source {path}"))?;
            Box::new(file)
        };

        Ok(Self {
            lines: BufReader::new(reader).lines(),
        })
    }

    /// Returns the next record, a per-record error, or `None` at end of
    /// stream.
    pub async fn next(&mut self) -> Option<Result<TaskAttemptEvent, RecordError>> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(parse_record(&line));
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(RecordError::Io(e))),
            }
        }
    }
}

/// Decodes one NDJSON line into a record.
pub fn parse_record(line: &str) -> Result<TaskAttemptEvent, RecordError> {
    Ok(serde_json::from_str(line)?)
}
