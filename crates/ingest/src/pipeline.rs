//! Resumable, checkpointed log ingestion
//!
//! # Run Sequence
//!
//! ```text
//! 1. Read checkpoint (file, offset)
//! 2. For each file in FileId order:
//!    a. file < checkpoint.file  -> skip
//!    b. file == checkpoint.file -> seek to offset
//!    c. file > checkpoint.file  -> start at 0
//!    d. For each line: handler(batch, line), offset += bytes consumed
//!    e. Every `flush_every` lines and at end of file:
//!       apply(batch + checkpoint(file, offset)) as one batch
//! ```
//!
//! The checkpoint is staged after the data writes of the same flush and
//! both are applied atomically, so the stored checkpoint never points past
//! writes that were not applied.
//!
//! # Failure
//!
//! A handler, read or store error ends the run. Writes staged since the
//! last flush are dropped and the error carries the last durable
//! checkpoint; the next run re-delivers every line after it, including the
//! failing one.

use crate::error::IngestError;
use crate::source::LogSource;
use bazaar_core::{Store, WriteBatch};
use bazaar_durability::{Checkpoint, CheckpointLedger, FileId};
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of lines between flushes
pub const DEFAULT_FLUSH_EVERY: usize = 1000;

/// Tuning for a [`LogPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Lines processed between flushes (values below 1 act as 1)
    pub flush_every: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }
}

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files read to the end during this run
    pub files_processed: usize,
    /// Files skipped because the checkpoint was already past them
    pub files_skipped: usize,
    /// Lines handed to the handler
    pub lines_processed: u64,
    /// Batches applied (data plus checkpoint)
    pub flushes: u64,
    /// Checkpoint stored when the run finished
    pub checkpoint: Checkpoint,
}

/// Replays log files through a handler, resuming from the stored checkpoint
pub struct LogPipeline<S> {
    store: Arc<dyn Store>,
    ledger: CheckpointLedger,
    source: S,
    options: IngestOptions,
}

impl<S: LogSource> LogPipeline<S> {
    /// Pipeline reading `source` and writing to `store`
    pub fn new(store: Arc<dyn Store>, source: S) -> Self {
        Self {
            ledger: CheckpointLedger::new(Arc::clone(&store)),
            store,
            source,
            options: IngestOptions::default(),
        }
    }

    /// Replace the default options
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// The checkpoint ledger this pipeline writes
    pub fn ledger(&self) -> &CheckpointLedger {
        &self.ledger
    }

    /// Process every line not yet covered by the stored checkpoint
    ///
    /// `handler` receives the shared batch and one line with its terminator
    /// stripped (invalid UTF-8 replaced). It must only stage writes; the
    /// pipeline decides when they are applied.
    ///
    /// # Errors
    /// See [`IngestError`]. On error the stored checkpoint is the one
    /// reported by [`IngestError::checkpoint`] or earlier.
    pub fn run<H>(&self, mut handler: H) -> Result<IngestReport, IngestError>
    where
        H: FnMut(&mut WriteBatch, &str) -> anyhow::Result<()>,
    {
        let resume = self
            .ledger
            .read_progress()
            .map_err(IngestError::Checkpoint)?;
        let files = self
            .source
            .files()
            .map_err(|source| IngestError::List { source })?;
        info!(checkpoint = %resume, files = files.len(), "starting ingestion");

        let mut report = IngestReport {
            checkpoint: resume.clone(),
            ..IngestReport::default()
        };

        for file in files {
            let Some(start) = resume.resume_offset(&file) else {
                report.files_skipped += 1;
                continue;
            };
            self.ingest_file(&file, start, &mut handler, &mut report)?;
            report.files_processed += 1;
        }

        info!(
            files = report.files_processed,
            skipped = report.files_skipped,
            lines = report.lines_processed,
            checkpoint = %report.checkpoint,
            "ingestion complete"
        );
        Ok(report)
    }

    fn ingest_file<H>(
        &self,
        file: &FileId,
        start: u64,
        handler: &mut H,
        report: &mut IngestReport,
    ) -> Result<(), IngestError>
    where
        H: FnMut(&mut WriteBatch, &str) -> anyhow::Result<()>,
    {
        let mut reader = self.source.open(file, start).map_err(|source| IngestError::Read {
            file: file.clone(),
            checkpoint: report.checkpoint.clone(),
            source,
        })?;
        debug!(file = %file, offset = start, "opened log file");

        let flush_every = self.options.flush_every.max(1);
        let mut batch = WriteBatch::new();
        let mut offset = start;
        let mut pending = 0usize;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let consumed = match reader.read_until(b'\n', &mut raw) {
                Ok(consumed) => consumed,
                Err(source) => {
                    warn!(
                        file = %file,
                        offset,
                        checkpoint = %report.checkpoint,
                        error = %source,
                        "read failed, discarding unflushed writes"
                    );
                    return Err(IngestError::Read {
                        file: file.clone(),
                        checkpoint: report.checkpoint.clone(),
                        source,
                    });
                }
            };
            if consumed == 0 {
                break;
            }

            let line = decode_line(&raw);
            if let Err(e) = handler(&mut batch, &line) {
                warn!(
                    file = %file,
                    offset,
                    checkpoint = %report.checkpoint,
                    error = %e,
                    "line handler failed, discarding unflushed writes"
                );
                return Err(IngestError::Handler {
                    file: file.clone(),
                    offset,
                    checkpoint: report.checkpoint.clone(),
                    source: e.into(),
                });
            }

            offset += consumed as u64;
            pending += 1;
            report.lines_processed += 1;

            if pending >= flush_every {
                self.flush(&mut batch, file, offset, report)?;
                pending = 0;
            }
        }

        self.flush(&mut batch, file, offset, report)
    }

    fn flush(
        &self,
        batch: &mut WriteBatch,
        file: &FileId,
        offset: u64,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let mut staged = batch.take();
        let writes = staged.len();
        self.ledger.stage_progress(&mut staged, file, offset);
        self.store
            .apply(staged)
            .map_err(|source| IngestError::Store {
                checkpoint: report.checkpoint.clone(),
                source,
            })?;

        report.flushes += 1;
        report.checkpoint = Checkpoint::new(file.clone(), offset);
        debug!(file = %file, offset, writes, "flushed");
        Ok(())
    }
}

/// Strip one `\n` or `\r\n` terminator and decode lossily
fn decode_line(raw: &[u8]) -> std::borrow::Cow<'_, str> {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}

impl<S: std::fmt::Debug> std::fmt::Debug for LogPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogPipeline")
            .field("source", &self.source)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
