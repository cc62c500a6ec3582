//! Guest pipes.
//!
//! Pipe descriptors come from a reserved range above anything the host
//! hands out to a freshly started emulator, so reads and writes on them can
//! be told apart from host file descriptors by number alone.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{Result, VMErrorKind};

pub const PIPE_FD_START: i32 = 100;
pub const PIPE_FD_END: i32 = 200;

/// Capacity of a pipe buffer.
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// Bounded FIFO of bytes.
#[derive(Debug, Clone)]
pub struct PipeBuffer {
    data: VecDeque<u8>,
    capacity: usize,
}

impl PipeBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append as much of `bytes` as fits, returning the count taken.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.capacity - self.data.len());
        self.data.extend(&bytes[..count]);
        count
    }

    /// Remove up to `max` bytes from the front.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let count = max.min(self.data.len());
        self.data.drain(..count).collect()
    }
}

#[derive(Debug)]
struct Pipe {
    /// Read and write ends, -1 once closed.
    fds: [i32; 2],
    buffer: PipeBuffer,
}

#[derive(Debug)]
pub struct PipeTable {
    pipes: Vec<Pipe>,
    next_fd: i32,
}

impl Default for PipeTable {
    fn default() -> Self {
        Self {
            pipes: Vec::new(),
            next_fd: PIPE_FD_START,
        }
    }
}

impl PipeTable {
    pub fn is_pipe_fd(fd: i32) -> bool {
        (PIPE_FD_START..=PIPE_FD_END).contains(&fd)
    }

    /// Allocate a pipe and return its read and write descriptors.
    /// Descriptors are never reused.
    pub fn create(&mut self) -> Result<[i32; 2]> {
        if self.next_fd + 1 > PIPE_FD_END {
            return Err(VMErrorKind::PipeDescriptorsExhausted.into());
        }
        let fds = [self.next_fd, self.next_fd + 1];
        self.next_fd += 2;
        self.pipes.push(Pipe {
            fds,
            buffer: PipeBuffer::with_capacity(PIPE_BUFFER_SIZE),
        });
        trace!("pipe created: read fd {}, write fd {}", fds[0], fds[1]);
        Ok(fds)
    }

    /// Close one end; the pipe goes away once both are closed.
    pub fn close(&mut self, fd: i32) {
        for pipe in &mut self.pipes {
            for end in &mut pipe.fds {
                if *end == fd {
                    *end = -1;
                }
            }
        }
        self.pipes.retain(|pipe| pipe.fds != [-1, -1]);
    }

    fn end(&self, fd: i32, index: usize) -> Option<&Pipe> {
        self.pipes.iter().find(|pipe| pipe.fds[index] == fd)
    }

    fn end_mut(&mut self, fd: i32, index: usize) -> Option<&mut Pipe> {
        self.pipes.iter_mut().find(|pipe| pipe.fds[index] == fd)
    }

    /// Buffer behind read descriptor `fd`.
    pub fn read_buffer(&mut self, fd: i32) -> Option<&mut PipeBuffer> {
        self.end_mut(fd, 0).map(|pipe| &mut pipe.buffer)
    }

    /// Buffer behind write descriptor `fd`.
    pub fn write_buffer(&mut self, fd: i32) -> Option<&mut PipeBuffer> {
        self.end_mut(fd, 1).map(|pipe| &mut pipe.buffer)
    }

    /// Bytes waiting on read descriptor `fd`, 0 when it is not open.
    pub fn available(&self, fd: i32) -> usize {
        self.end(fd, 0).map_or(0, |pipe| pipe.buffer.len())
    }

    /// Whether the writer of read descriptor `fd` has gone away.
    pub fn writer_closed(&self, fd: i32) -> bool {
        self.end(fd, 0).map_or(true, |pipe| pipe.fds[1] == -1)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_bounded() {
        let mut buffer = PipeBuffer::with_capacity(4);
        assert_eq!(buffer.write(b"abc"), 3);
        assert_eq!(buffer.write(b"def"), 1);
        assert_eq!(buffer.read(2), b"ab");
        assert_eq!(buffer.read(10), b"cd");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pipe_lifecycle() {
        let mut pipes = PipeTable::default();
        let [rd, wr] = pipes.create().unwrap();
        assert_eq!((rd, wr), (100, 101));
        assert!(PipeTable::is_pipe_fd(rd) && PipeTable::is_pipe_fd(wr));
        assert!(!PipeTable::is_pipe_fd(3));

        assert_eq!(pipes.write_buffer(wr).unwrap().write(b"hello"), 5);
        assert!(pipes.write_buffer(rd).is_none());
        assert_eq!(pipes.available(rd), 5);
        assert_eq!(pipes.read_buffer(rd).unwrap().read(3), b"hel");

        pipes.close(wr);
        assert!(pipes.writer_closed(rd));
        assert_eq!(pipes.len(), 1);
        pipes.close(rd);
        assert!(pipes.is_empty());
        assert_eq!(pipes.available(rd), 0);
    }

    #[test]
    fn test_descriptors_exhausted() {
        let mut pipes = PipeTable::default();
        for _ in 0..50 {
            pipes.create().unwrap();
        }
        let err = pipes.create().unwrap_err();
        assert_eq!(err.source, VMErrorKind::PipeDescriptorsExhausted);
    }
}
