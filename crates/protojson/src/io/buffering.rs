//! A buffered window over an [`Input`].
//!
//! The window serves bytes straight out of the stream's current chunk in the
//! common case. Two things force bytes into an owned buffer:
//!
//! - [`BufferedStream::fill`] needing more contiguous lookahead than the
//!   current chunk holds, in which case the live tail is spilled into `buf`
//!   and further chunks are appended until the request is satisfied;
//! - an outstanding mark, which retains every byte consumed while it is
//!   live so that [`BufferedStream::marked`] can later return the span from
//!   the mark to the cursor.
//!
//! Marks nest LIFO; when the last one ends, the retained bytes are dropped
//! and the window reverts to direct chunk access.

use crate::error::{Error, Result};
use crate::io::Input;

pub(crate) struct BufferedStream<'a> {
    stream: &'a mut dyn Input,
    /// Spill buffer for lookahead that crossed a chunk boundary.
    buf: Vec<u8>,
    /// Cursor into `buf`; bytes before it have been consumed.
    pos: usize,
    /// Bytes consumed while at least one mark was outstanding.
    retained: Vec<u8>,
    /// Offsets into `retained` at which each live mark began.
    marks: Vec<usize>,
}

impl<'a> BufferedStream<'a> {
    pub(crate) fn new(stream: &'a mut dyn Input) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            pos: 0,
            retained: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// The currently visible window of unread bytes.
    pub(crate) fn unread(&self) -> &[u8] {
        if self.pos < self.buf.len() {
            &self.buf[self.pos..]
        } else {
            self.stream.chunk()
        }
    }

    /// First unread byte, pulling a chunk if necessary. `None` at EOF.
    pub(crate) fn peek_byte(&mut self) -> Result<Option<u8>> {
        if self.pos < self.buf.len() {
            return Ok(Some(self.buf[self.pos]));
        }
        if !self.stream.poll()? {
            return Ok(None);
        }
        Ok(self.stream.chunk().first().copied())
    }

    /// Consumes `n` visible bytes. The caller must have made them visible
    /// with [`BufferedStream::peek_byte`] or [`BufferedStream::fill`] first.
    pub(crate) fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if !self.marks.is_empty() {
            if self.pos < self.buf.len() {
                self.retained
                    .extend_from_slice(&self.buf[self.pos..self.pos + n]);
            } else {
                self.retained.extend_from_slice(&self.stream.chunk()[..n]);
            }
        }
        if self.pos < self.buf.len() {
            debug_assert!(n <= self.buf.len() - self.pos);
            self.pos += n;
            if self.pos == self.buf.len() {
                self.buf.clear();
                self.pos = 0;
            }
        } else {
            self.stream.consume(n);
        }
    }

    /// Ensures at least `n` contiguous unread bytes are visible.
    ///
    /// Fails with a data-loss error if the stream ends first.
    pub(crate) fn fill(&mut self, n: usize) -> Result<()> {
        loop {
            let have = if self.pos < self.buf.len() {
                self.buf.len() - self.pos
            } else {
                self.stream.poll()?;
                self.stream.chunk().len()
            };
            if have >= n {
                return Ok(());
            }
            if self.pos > 0 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            if !self.stream.poll()? {
                return Err(Error::data_loss("unexpected EOF"));
            }
            let len = self.stream.chunk().len();
            self.buf.extend_from_slice(self.stream.chunk());
            self.stream.consume(len);
        }
    }

    /// Consumes and returns the next `n` bytes.
    pub(crate) fn take(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n)?;
        self.begin_mark();
        self.advance(n);
        let out = self.marked(0).to_vec();
        self.end_mark();
        Ok(out)
    }

    /// Consumes bytes while `pred` holds and returns them.
    pub(crate) fn take_while(&mut self, mut pred: impl FnMut(u8) -> bool) -> Result<Vec<u8>> {
        self.begin_mark();
        loop {
            match self.peek_byte() {
                Ok(Some(b)) if pred(b) => self.advance(1),
                Ok(_) => break,
                Err(e) => {
                    self.end_mark();
                    return Err(e);
                }
            }
        }
        let out = self.marked(0).to_vec();
        self.end_mark();
        Ok(out)
    }

    /// Starts retaining consumed bytes at the current cursor.
    pub(crate) fn begin_mark(&mut self) {
        self.marks.push(self.retained.len());
    }

    /// Bytes from the innermost mark to the cursor, minus the last `clip`.
    pub(crate) fn marked(&self, clip: usize) -> &[u8] {
        let start = *self.marks.last().expect("no mark outstanding");
        &self.retained[start..self.retained.len() - clip]
    }

    /// Ends the innermost mark. Marks end strictly LIFO.
    pub(crate) fn end_mark(&mut self) {
        self.marks.pop().expect("no mark outstanding");
        if self.marks.is_empty() {
            self.retained.clear();
        }
    }
}
