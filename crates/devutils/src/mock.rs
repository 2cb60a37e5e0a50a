use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
};

use ember_mio::net::CloseWrite;

/// Scripted non-blocking socket.
///
/// Reads are served from `input` and writes collected into `output`. Would-block conditions
/// are injected at chosen byte offsets, so resumption of partial transfers can be tested
/// deterministically.
#[derive(Default)]
pub struct MockSocket {
    input: Vec<u8>,
    read_pos: usize,
    output: Vec<u8>,

    /// Input offsets at which a read reports would-block, once each.
    read_blocks: VecDeque<usize>,
    /// Output offsets at which a write reports would-block, once each.
    write_blocks: VecDeque<usize>,
    /// Maximum bytes accepted or produced per call.
    max_per_call: Option<usize>,
    /// Precede every successful call with an interrupted one.
    interrupt: bool,
    interrupt_pending: bool,
    /// Report end-of-stream once input runs out, instead of would-block.
    eof: bool,
    /// Fail all writes with a broken pipe.
    broken: bool,
    write_closed: bool,

    pub read_calls: usize,
    pub write_calls: usize,
}

impl MockSocket {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_read_blocks(mut self, offsets: impl IntoIterator<Item = usize>) -> Self {
        self.read_blocks = sorted(offsets);
        self
    }

    pub fn with_write_blocks(mut self, offsets: impl IntoIterator<Item = usize>) -> Self {
        self.write_blocks = sorted(offsets);
        self
    }

    pub fn with_max_per_call(mut self, max: usize) -> Self {
        self.max_per_call = Some(max);
        self
    }

    pub fn with_interrupts(mut self) -> Self {
        self.interrupt = true;
        self
    }

    pub fn with_eof(mut self) -> Self {
        self.eof = true;
        self
    }

    pub fn with_broken_pipe(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Append data that becomes available to subsequent reads.
    pub fn push_input(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn remaining_input(&self) -> &[u8] {
        &self.input[self.read_pos..]
    }

    /// Whether the sending half was closed through `CloseWrite`.
    pub fn is_write_closed(&self) -> bool {
        self.write_closed
    }

    fn take_interrupt(&mut self) -> bool {
        if !self.interrupt {
            return false;
        }

        self.interrupt_pending = !self.interrupt_pending;
        self.interrupt_pending
    }

    fn limit(&self, wanted: usize, position: usize, blocks: &VecDeque<usize>) -> usize {
        let mut limit = wanted;

        if let Some(max) = self.max_per_call {
            limit = limit.min(max);
        }

        // Never cross the next would-block offset
        if let Some(block) = blocks.front() {
            limit = limit.min(block - position);
        }

        limit
    }
}

impl Read for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;

        if self.take_interrupt() {
            return Err(ErrorKind::Interrupted.into());
        }

        if self.read_blocks.front() == Some(&self.read_pos) {
            self.read_blocks.pop_front();
            return Err(ErrorKind::WouldBlock.into());
        }

        let available = self.input.len() - self.read_pos;
        if available == 0 {
            if self.eof {
                return Ok(0);
            }
            return Err(ErrorKind::WouldBlock.into());
        }

        let count = self.limit(buf.len().min(available), self.read_pos, &self.read_blocks);
        buf[..count].copy_from_slice(&self.input[self.read_pos..self.read_pos + count]);
        self.read_pos += count;

        Ok(count)
    }
}

impl Write for MockSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;

        if self.broken || self.write_closed {
            return Err(ErrorKind::BrokenPipe.into());
        }

        if self.take_interrupt() {
            return Err(ErrorKind::Interrupted.into());
        }

        if self.write_blocks.front() == Some(&self.output.len()) {
            self.write_blocks.pop_front();
            return Err(ErrorKind::WouldBlock.into());
        }

        let count = self.limit(buf.len(), self.output.len(), &self.write_blocks);
        self.output.extend_from_slice(&buf[..count]);

        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CloseWrite for MockSocket {
    fn close_write(&mut self) -> io::Result<()> {
        self.write_closed = true;
        Ok(())
    }
}

fn sorted(offsets: impl IntoIterator<Item = usize>) -> VecDeque<usize> {
    let mut offsets: Vec<_> = offsets.into_iter().collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets.into()
}
