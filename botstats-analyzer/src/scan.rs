//! Windowed log scanning.
//!
//! Without a start instant the log is read front to back. With one, it is
//! read back to front in fixed-size blocks and the scan stops at the first
//! entry older than the start instant, so only the tail of a large log is
//! touched. Both directions yield through [`WindowedEntries`].

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::mem;

use botstats_schema::{EntryError, EntryParser, LogEntry};
use chrono::{DateTime, Utc};

use crate::config::Whitelist;

/// Block size for backward reads.
pub const REVERSE_BLOCK_SIZE: usize = 8192;

/// Errors from scanning a log source.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("log source unavailable: {0}")]
    SourceUnavailable(#[source] io::Error),

    #[error("failed to read log source: {0}")]
    Read(#[source] io::Error),
}

/// Decode a raw line, replacing invalid UTF-8 and dropping a trailing `\r`.
fn decode_line(bytes: &[u8]) -> String {
    let mut line = String::from_utf8_lossy(bytes).into_owned();
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

// ===========================================
// Line readers
// ===========================================

/// Lines of a reader in file order.
pub struct ForwardLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ForwardLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for ForwardLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                Some(Ok(decode_line(&self.buf)))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Lines of a seekable reader, last line first.
///
/// Reads [`REVERSE_BLOCK_SIZE`] bytes at a time from the end. The bytes
/// before the first newline of a block may belong to a line that started in
/// the previous block, so they are carried over and joined on the next read.
pub struct ReverseLines<R> {
    reader: R,
    position: u64,
    carry: Vec<u8>,
    /// Complete lines of the current block, in file order; popped from the end.
    pending: Vec<Vec<u8>>,
    finished: bool,
}

impl<R: Read + Seek> ReverseLines<R> {
    /// Position at the end of `reader`.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let position = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            position,
            carry: Vec::new(),
            pending: Vec::new(),
            finished: false,
        })
    }

    fn read_block(&mut self) -> io::Result<()> {
        let size = self.position.min(REVERSE_BLOCK_SIZE as u64);
        self.position -= size;
        self.reader.seek(SeekFrom::Start(self.position))?;

        let mut block = vec![0u8; size as usize];
        self.reader.read_exact(&mut block)?;
        block.append(&mut self.carry);

        let mut segments = block.split(|&b| b == b'\n');
        // The head segment may continue further back.
        self.carry = segments.next().map(<[u8]>::to_vec).unwrap_or_default();
        self.pending.extend(segments.map(<[u8]>::to_vec));
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for ReverseLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop() {
                return Some(Ok(decode_line(&line)));
            }
            if self.finished {
                return None;
            }
            if self.position == 0 {
                self.finished = true;
                let first = mem::take(&mut self.carry);
                return Some(Ok(decode_line(&first)));
            }
            if let Err(e) = self.read_block() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

// ===========================================
// Windowed entries
// ===========================================

/// Counters collected while scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Non-empty lines examined.
    pub lines_read: u64,
    /// Lines skipped because they could not be parsed.
    pub malformed: u64,
    /// Entries dropped by the whitelist.
    pub whitelisted: u64,
    /// Entries yielded.
    pub emitted: u64,
    /// Whether a reverse scan stopped at an entry older than the window.
    pub stopped_early: bool,
}

enum LineSource<R> {
    Forward(ForwardLines<BufReader<R>>),
    Reverse(ReverseLines<R>),
}

impl<R: Read + Seek> Iterator for LineSource<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LineSource::Forward(lines) => lines.next(),
            LineSource::Reverse(lines) => lines.next(),
        }
    }
}

type MalformedFn<'a> = Box<dyn FnMut(&str, &EntryError) + 'a>;

/// Parsed, whitelisted-filtered entries of a log within an optional window.
pub struct WindowedEntries<'a, R, P> {
    lines: LineSource<R>,
    parser: &'a P,
    whitelist: &'a Whitelist,
    start: Option<DateTime<Utc>>,
    stats: ScanStats,
    done: bool,
    on_malformed: Option<MalformedFn<'a>>,
}

impl<'a, R: Read + Seek, P: EntryParser> WindowedEntries<'a, R, P> {
    /// Scan the whole source in file order.
    pub fn forward(reader: R, parser: &'a P, whitelist: &'a Whitelist) -> Self {
        Self::with_lines(
            LineSource::Forward(ForwardLines::new(BufReader::new(reader))),
            parser,
            whitelist,
            None,
        )
    }

    /// Scan backward from the end, stopping before the first entry older
    /// than `start`.
    pub fn reverse(
        reader: R,
        parser: &'a P,
        whitelist: &'a Whitelist,
        start: DateTime<Utc>,
    ) -> Result<Self, ScanError> {
        let lines = ReverseLines::new(reader).map_err(ScanError::SourceUnavailable)?;
        Ok(Self::with_lines(
            LineSource::Reverse(lines),
            parser,
            whitelist,
            Some(start),
        ))
    }

    /// Reverse scan when `start` is given, forward scan otherwise.
    pub fn open(
        reader: R,
        parser: &'a P,
        whitelist: &'a Whitelist,
        start: Option<DateTime<Utc>>,
    ) -> Result<Self, ScanError> {
        match start {
            Some(start) => Self::reverse(reader, parser, whitelist, start),
            None => Ok(Self::forward(reader, parser, whitelist)),
        }
    }

    fn with_lines(
        lines: LineSource<R>,
        parser: &'a P,
        whitelist: &'a Whitelist,
        start: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            lines,
            parser,
            whitelist,
            start,
            stats: ScanStats::default(),
            done: false,
            on_malformed: None,
        }
    }

    /// Called with each line that fails to parse.
    pub fn with_malformed_callback(mut self, f: impl FnMut(&str, &EntryError) + 'a) -> Self {
        self.on_malformed = Some(Box::new(f));
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

impl<'a, R: Read + Seek, P: EntryParser> Iterator for WindowedEntries<'a, R, P> {
    type Item = Result<LogEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ScanError::Read(e)));
                }
                Some(Ok(line)) => line,
            };

            if line.trim().is_empty() {
                continue;
            }
            self.stats.lines_read += 1;

            let entry = match self.parser.parse(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    self.stats.malformed += 1;
                    if let Some(f) = self.on_malformed.as_mut() {
                        f(&line, &e);
                    }
                    continue;
                }
            };

            if let Some(start) = self.start {
                if entry.timestamp < start {
                    self.stats.stopped_early = true;
                    self.done = true;
                    return None;
                }
            }

            if self.whitelist.contains(&entry.address) {
                self.stats.whitelisted += 1;
                continue;
            }

            self.stats.emitted += 1;
            return Some(Ok(entry));
        }
    }
}
