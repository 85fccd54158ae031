//! Frames complete records out of a byte stream on a single separator byte.
//!
//! Shared by the input-source descriptor reader and by each running
//! task's stdout/stderr readers — both want "read a chunk, then peel
//! off as many complete records as the buffer holds" with the same
//! partial-tail-on-EOF policy.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read per read-opportunity. Matches the original C implementation's
/// fixed growth chunk.
pub const READ_CHUNK: usize = 4096;

/// Growable-buffer line framer over a single separator byte.
pub struct LineReader {
    buf: Vec<u8>,
    separator: u8,
    eof: bool,
}

impl LineReader {
    pub fn new(separator: u8) -> Self {
        Self {
            buf: Vec::new(),
            separator,
            eof: false,
        }
    }

    pub fn with_default_separator() -> Self {
        Self::new(b'\n')
    }

    /// True once EOF has been observed and reported (no more reads should
    /// be attempted).
    pub fn is_exhausted(&self) -> bool {
        self.eof
    }

    /// True if the buffer already contains a complete record — callers
    /// should skip the next I/O opportunity.
    pub fn has_buffered_record(&self) -> bool {
        self.buf.contains(&self.separator)
    }

    /// Perform one read into a scratch chunk, appending only the bytes
    /// actually read once the read resolves. Returns the freshly-read span
    /// (for the raw-data observer callback, fired before framing) or `None`
    /// on EOF.
    ///
    /// Must not touch `self.buf` before the `.await` — this future is
    /// dropped mid-read whenever it loses a `tokio::select!` or gets
    /// discarded out of a `FuturesUnordered`, and any growth made visible
    /// before that point would leak into the buffer as garbage bytes.
    pub async fn read_chunk<R>(&mut self, reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
            Ok(None)
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
            Ok(Some(chunk[..n].to_vec()))
        }
    }

    /// Drain every complete record currently in the buffer, in order,
    /// consuming the separator and the record bytes before it.
    pub fn drain_records(&mut self) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == self.separator) else {
                break;
            };
            let record = self.buf.drain(..=pos).collect::<Vec<u8>>();
            records.push(record[..record.len() - 1].to_vec());
        }
        records
    }

    /// On EOF, take any residual partial record for the caller to warn
    /// about and discard (no line event for a terminator-less
    /// tail, only the raw-data callback saw the bytes).
    pub fn take_residual(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// One step of advancing a framed stream: either a freshly-read raw span
/// (fired to the raw-data observer before framing) or EOF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    RawData(Vec<u8>),
    Eof,
}

/// Couples a [`LineReader`] to its backing `AsyncRead` and a queue of
/// records already framed but not yet delivered, so callers can drain one
/// record per call while a single read may have produced several.
///
/// This line framer is reused by both the input-source
/// descriptor reader and each running task's stdout/stderr readers.
pub struct FramedStream<R> {
    io: R,
    reader: LineReader,
    pending: std::collections::VecDeque<Vec<u8>>,
    done: bool,
}

impl<R> FramedStream<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(io: R, separator: u8) -> Self {
        Self {
            io,
            reader: LineReader::new(separator),
            pending: std::collections::VecDeque::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Pop a record already framed from a prior read, if any, without
    /// performing I/O.
    pub fn pop_record(&mut self) -> Option<Vec<u8>> {
        self.pending.pop_front()
    }

    /// Perform one read opportunity: extend the buffer, read, and on EOF
    /// discard any residual partial record with a warning (caller supplies
    /// a label for the diagnostic). Complete records surfaced by this read
    /// (plus any carried-over buffer) are queued for `pop_record`.
    pub async fn advance(&mut self, label: &str) -> std::io::Result<Advance> {
        match self.reader.read_chunk(&mut self.io).await? {
            Some(bytes) => {
                self.pending.extend(self.reader.drain_records());
                Ok(Advance::RawData(bytes))
            }
            None => {
                self.done = true;
                if let Some(residual) = self.reader.take_residual() {
                    tracing::warn!(
                        source = %label,
                        bytes = residual.len(),
                        "partial final record discarded at EOF"
                    );
                }
                Ok(Advance::Eof)
            }
        }
    }
}
