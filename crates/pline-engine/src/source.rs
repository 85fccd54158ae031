//! Polymorphic producer of command-line records plus the concrete
//! descriptor-backed variant.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf, unix::AsyncFd};

use crate::line_reader::{Advance, FramedStream};

/// Whether a descriptor's kernel-level readiness is meaningful.
///
/// FIFO, socket, character device, and tty descriptors are pollable: the
/// kernel can tell us when they have data. Regular files are always
/// "ready" per `select`/`poll` semantics, so they are driven by reading
/// until a record appears or EOF, rather than waiting on readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollability {
    Pollable,
    NonPollable,
}

/// Classify a raw fd: stat + isatty.
pub fn classify(fd: RawFd) -> io::Result<Pollability> {
    use std::mem::MaybeUninit;
    let mut stat = MaybeUninit::<libc::stat>::uninit();
    let rc = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let stat = unsafe { stat.assume_init() };
    let mode = stat.st_mode & libc::S_IFMT;
    let is_tty = unsafe { libc::isatty(fd) } == 1;
    let pollable =
        is_tty || mode == libc::S_IFIFO || mode == libc::S_IFSOCK || mode == libc::S_IFCHR;
    Ok(if pollable {
        Pollability::Pollable
    } else {
        Pollability::NonPollable
    })
}

/// One command-line record, or the terminal end-of-source signal.
///
/// End-of-source is reported as a sentinel (a null string pointer in the
/// original C); here it is simply a distinct enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Line(String),
    Eof,
}

/// Bridges a non-blocking raw fd into `AsyncRead` via epoll/kqueue
/// readiness, for pollable descriptors (FIFO, socket, char device, tty).
struct PollableFd {
    inner: AsyncFd<OwnedFd>,
}

impl PollableFd {
    fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            inner: AsyncFd::new(fd)?,
        })
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn raw_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

impl AsyncRead for PollableFd {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            let mut guard = ready!(this.inner.poll_read_ready(cx))?;
            let fd = this.inner.get_ref().as_raw_fd();
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|_| raw_read(fd, unfilled)) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

enum Backing {
    Pollable(FramedStream<PollableFd>),
    NonPollable(FramedStream<tokio::fs::File>),
    Stdin(FramedStream<tokio::io::Stdin>),
}

impl Backing {
    async fn advance(&mut self, label: &str) -> io::Result<Advance> {
        match self {
            Backing::Pollable(s) => s.advance(label).await,
            Backing::NonPollable(s) => s.advance(label).await,
            Backing::Stdin(s) => s.advance(label).await,
        }
    }

    fn pop_record(&mut self) -> Option<Vec<u8>> {
        match self {
            Backing::Pollable(s) => s.pop_record(),
            Backing::NonPollable(s) => s.pop_record(),
            Backing::Stdin(s) => s.pop_record(),
        }
    }

    fn is_done(&self) -> bool {
        match self {
            Backing::Pollable(s) => s.is_done(),
            Backing::NonPollable(s) => s.is_done(),
            Backing::Stdin(s) => s.is_done(),
        }
    }
}

/// A descriptor-backed source: the only concrete input-source variant the
/// engine ships, wrapping a file descriptor with its pollability, a growable
/// line reader, and optional ownership (closes on destroy).
pub struct DescriptorSource {
    backing: Backing,
    pollability: Pollability,
    owns_fd: bool,
    trapped: bool,
    eof_delivered: bool,
    label: String,
}

impl DescriptorSource {
    pub fn from_stdin() -> Self {
        Self {
            backing: Backing::Stdin(FramedStream::new(tokio::io::stdin(), b'\n')),
            pollability: Pollability::Pollable,
            owns_fd: false,
            trapped: false,
            eof_delivered: false,
            label: "<stdin>".to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, pline_core::EngineError> {
        let file = std::fs::File::open(path).map_err(|e| pline_core::EngineError::Open {
            path: path.to_path_buf(),
            os_error: e.to_string(),
        })?;
        Ok(Self::from_owned_file(file, path.to_path_buf()))
    }

    fn from_owned_file(file: std::fs::File, path: PathBuf) -> Self {
        Self {
            backing: Backing::NonPollable(FramedStream::new(
                tokio::fs::File::from_std(file),
                b'\n',
            )),
            pollability: Pollability::NonPollable,
            owns_fd: true,
            trapped: false,
            eof_delivered: false,
            label: path.display().to_string(),
        }
    }

    /// Wrap an arbitrary raw fd, classifying it as pollable or not.
    ///
    /// # Safety
    /// `fd` must be a valid, open file descriptor that nothing else reads
    /// concurrently. If `should_close` is true, ownership transfers here.
    pub unsafe fn from_raw_fd(fd: RawFd, should_close: bool) -> io::Result<Self> {
        let pollability = classify(fd)?;
        let backing = match pollability {
            Pollability::Pollable => {
                let owned = unsafe { OwnedFd::from_raw_fd(fd) };
                Backing::Pollable(FramedStream::new(PollableFd::new(owned)?, b'\n'))
            }
            Pollability::NonPollable => {
                let std_file = unsafe { std::fs::File::from_raw_fd(fd) };
                Backing::NonPollable(FramedStream::new(
                    tokio::fs::File::from_std(std_file),
                    b'\n',
                ))
            }
        };
        Ok(Self {
            backing,
            pollability,
            owns_fd: should_close,
            trapped: false,
            eof_delivered: false,
            label: format!("fd:{fd}"),
        })
    }

    pub fn pollability(&self) -> Pollability {
        self.pollability
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_trapped(&self) -> bool {
        self.trapped
    }

    /// Arm the source. Trapping an already-exhausted source must
    /// synthesize EOF on the very next poll rather than requiring a read.
    pub fn trap(&mut self) {
        debug_assert!(!self.trapped, "trap on an already-trapped source");
        self.trapped = true;
    }

    pub fn untrap(&mut self) {
        debug_assert!(self.trapped, "untrap on an already-untrapped source");
        self.trapped = false;
    }

    /// Await the next record. Caller must only poll this while trapped;
    /// the engine loop enforces this by only including trapped sources in
    /// its merged future set.
    pub async fn next_record(&mut self) -> io::Result<Record> {
        loop {
            if let Some(record) = self.backing.pop_record() {
                return Ok(Record::Line(String::from_utf8_lossy(&record).into_owned()));
            }
            if self.backing.is_done() {
                self.eof_delivered = true;
                return Ok(Record::Eof);
            }
            self.backing.advance(&self.label).await?;
        }
    }
}

impl Drop for DescriptorSource {
    fn drop(&mut self) {
        // `owns_fd` only matters for the raw-fd constructor; stdin and
        // path-opened files drop their owned handles normally via Rust's
        // File/Stdin destructors regardless, so there is nothing extra to
        // close here. Kept as a documented field for parity with the
        // "optionally owns the descriptor (closes on destroy)".
        let _ = self.owns_fd;
    }
}
