//! Per-session diagnostics report.
//!
//! The report is a restartable sequence of chunks: chunk 0 is the header,
//! chunk `n` is live entry `n - 1` in allocation order. Each chunk renders
//! into a fixed [`CHUNK_SIZE`] buffer, so memory use does not grow with the
//! number of live resources. Readers address the report by byte offset and
//! the chunks are regenerated on every read. An entry whose provider fails
//! to describe itself is cut short; the entries after it are still listed.
//!
//! ```text
//! Resource list for remote endpoint 1024:\n      ← chunk 0
//! \nResource Name:omap-gptimer\nId:9\n...        ← chunk 1
//! \nResource Name:omap-sdma\nNumChannels:2\n...  ← chunk 2
//! ```
//!
//! Reading never mutates session or provider state. A read that races a
//! REQUEST or RELEASE sees the entry list as of each chunk's render.

use core::fmt;
use std::io;
use std::sync::Arc;

use heapless::String as HString;
use log::debug;

use crate::session::{ResourceId, Session};

/// Render buffer size for one report chunk.
pub const CHUNK_SIZE: usize = 512;

type Chunk = HString<CHUNK_SIZE>;

/// `fmt::Write` sink that silently drops everything past capacity.
struct Truncating<'a> {
    buf: &'a mut Chunk,
    truncated: bool,
}

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        if self.buf.push_str(s).is_ok() {
            return Ok(());
        }
        for c in s.chars() {
            if self.buf.push(c).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}

/// Which chunk an iterator renders next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Header,
    /// First live entry with an id above this one.
    After(ResourceId),
    End,
}

/// Iterator over the rendered chunks of one session's report.
pub struct Chunks<'a> {
    session: &'a Session,
    cursor: Cursor,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut buf = Chunk::new();
        let mut out = Truncating {
            buf: &mut buf,
            truncated: false,
        };

        self.cursor = match self.cursor {
            Cursor::End => return None,
            Cursor::Header => {
                if self.session.write_header(&mut out).is_err() {
                    self.cursor = Cursor::End;
                    return None;
                }
                Cursor::After(0)
            }
            Cursor::After(last) => match self.session.write_entry_after(last, &mut out) {
                Ok(Some(id)) => Cursor::After(id),
                Ok(None) | Err(_) => {
                    self.cursor = Cursor::End;
                    return None;
                }
            },
        };
        if out.truncated {
            debug!(
                "RPRM[{}]: report chunk {:?} truncated at {} bytes",
                self.session.peer(),
                self.cursor,
                CHUNK_SIZE
            );
        }
        Some(buf)
    }
}

pub fn chunks(session: &Session) -> Chunks<'_> {
    Chunks {
        session,
        cursor: Cursor::Header,
    }
}

/// Byte offset where the chunk at `cursor` starts.
#[derive(Debug, Clone, Copy)]
struct Resume {
    start: u64,
    cursor: Cursor,
}

impl Resume {
    const START: Self = Self {
        start: 0,
        cursor: Cursor::Header,
    };
}

/// Copy report bytes from `offset` on, rendering from `from` instead of the
/// header. Returns the bytes written and the chunk the next read starts in.
fn copy_from(session: &Session, from: Resume, offset: u64, buf: &mut [u8]) -> (usize, Resume) {
    let from = if offset < from.start { Resume::START } else { from };
    let mut it = Chunks {
        session,
        cursor: from.cursor,
    };
    let mut resume = from;
    let mut pos = from.start;
    let mut written = 0;

    while written < buf.len() {
        let cursor = it.cursor;
        let Some(chunk) = it.next() else {
            break;
        };
        let bytes = chunk.as_bytes();
        let end = pos + bytes.len() as u64;
        if end > offset {
            let start = offset.saturating_sub(pos) as usize;
            let n = (bytes.len() - start).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&bytes[start..start + n]);
            written += n;
        }
        resume = if offset + written as u64 >= end {
            Resume {
                start: end,
                cursor: it.cursor,
            }
        } else {
            Resume { start: pos, cursor }
        };
        pos = end;
    }
    (written, resume)
}

/// Copy report bytes starting at `offset` into `buf`.
///
/// Returns the number of bytes written; 0 means end of report.
pub fn read_at(session: &Session, offset: u64, buf: &mut [u8]) -> usize {
    copy_from(session, Resume::START, offset, buf).0
}

/// Whole report as one string.
pub fn render(session: &Session) -> String {
    chunks(session).map(|c| c.as_str().to_owned()).collect()
}

/// Sequential reader over a session report, for any `io::Read` sink.
///
/// Each read picks up at the chunk the previous one stopped in, so a
/// full read renders every chunk about once.
pub struct ReportReader {
    session: Arc<Session>,
    pos: u64,
    resume: Resume,
}

impl ReportReader {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            pos: 0,
            resume: Resume::START,
        }
    }

    /// Report name under the diagnostics namespace.
    pub fn name(&self) -> String {
        self.session.report_name()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Start over from the header; picks up any changes since the last read.
    pub fn rewind(&mut self) {
        self.pos = 0;
        self.resume = Resume::START;
    }
}

impl io::Read for ReportReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, resume) = copy_from(&self.session, self.resume, self.pos, buf);
        self.pos += n as u64;
        self.resume = resume;
        Ok(n)
    }
}
