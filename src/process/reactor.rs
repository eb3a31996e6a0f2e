//! Readiness-based I/O multiplexer for one child process.
//!
//! The reactor owns the parent ends of a child's standard streams and blocks
//! in `poll(2)` until one of them is ready. Readable channels deliver their
//! bytes to a callback. Stdin drains a pending buffer fed by an
//! [`InputHandle`], whose wake pipe is part of the poll set so bytes sent from
//! other threads are picked up without delay. The loop ends when every output
//! channel is closed and stdin has nothing left to write, or when the
//! deadline passes.

use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::process::channel::Channel;
use crate::process::input::InputHandle;
use crate::{AppError, Result};

/// Largest number of bytes handed to a single write.
pub const WRITE_CHUNK: usize = 512;

/// Receives every non-empty chunk read from a channel, in order.
pub type DataCallback = Box<dyn FnMut(&[u8]) + Send>;

/// How [`Reactor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every channel reached end-of-file or was closed.
    Drained,
    /// The deadline passed; remaining channels were force-closed.
    TimedOut,
}

struct Reader {
    channel: Channel,
    on_data: DataCallback,
}

/// Stdin of the child. Dropping it closes the descriptor and detaches the
/// handle, so later sends fail instead of queueing forever.
struct Writer {
    channel: Channel,
    wake: Channel,
    pending: BytesMut,
    close_requested: bool,
    input: InputHandle,
}

impl Writer {
    fn pull(&mut self) {
        let drained = self.input.drain();
        self.pending.extend_from_slice(&drained.bytes);
        self.close_requested |= drained.close_requested;
    }

    /// Whether stdin should be closed now.
    fn finished(&self) -> bool {
        self.channel.write_fd().is_none() || (self.close_requested && self.pending.is_empty())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(unwritten = self.pending.len(), "closing stdin with bytes unwritten");
        }
        self.channel.close_write();
        self.input.detach();
    }
}

/// Positions of the stdin descriptors in the poll set.
#[derive(Debug, Clone, Copy, Default)]
struct WriterSlots {
    wake: Option<usize>,
    out: Option<usize>,
}

/// Event loop over the streams of one process.
#[derive(Default)]
pub struct Reactor {
    readers: Vec<Reader>,
    writer: Option<Writer>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("readers", &self.readers.len())
            .field("stdin", &self.writer.is_some())
            .finish()
    }
}

const READY: PollFlags = PollFlags::POLLIN
    .union(PollFlags::POLLOUT)
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR)
    .union(PollFlags::POLLNVAL);

impl Reactor {
    /// Empty reactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch the read side of `channel`; every chunk goes to `on_data`.
    ///
    /// A channel without a read side is ignored.
    pub fn add_reader(&mut self, channel: Channel, on_data: DataCallback) {
        if channel.read_fd().is_some() {
            self.readers.push(Reader { channel, on_data });
        }
    }

    /// Make `channel` the child's stdin, starting with `payload`.
    ///
    /// `channel` should be non-blocking. Bytes sent through `input` are
    /// written after the payload; `wake` is the read side of the handle's
    /// wake pipe. Replaces any stdin registered before.
    pub fn set_writer(
        &mut self,
        channel: Channel,
        wake: Channel,
        payload: &[u8],
        input: InputHandle,
    ) {
        self.writer = Some(Writer {
            channel,
            wake,
            pending: BytesMut::from(payload),
            close_requested: false,
            input,
        });
    }

    /// Number of channels still registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readers.len() + usize::from(self.writer.is_some())
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Service channels until all are closed or `deadline` passes.
    ///
    /// An idle stdin does not keep the loop alive: once every output channel
    /// is closed and nothing is pending, stdin is closed and the run ends.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Reactor` if `poll(2)` fails. The failure is not
    /// retried and the registered channels are left as they are.
    pub fn run(&mut self, deadline: Option<Instant>) -> Result<RunOutcome> {
        loop {
            self.readers.retain(|reader| reader.channel.read_fd().is_some());
            if let Some(writer) = self.writer.as_mut() {
                writer.pull();
                if writer.finished() || (self.readers.is_empty() && writer.pending.is_empty()) {
                    self.writer = None;
                }
            }
            if self.is_empty() {
                return Ok(RunOutcome::Drained);
            }

            let timeout = match deadline {
                None => PollTimeout::NONE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        self.force_close();
                        return Ok(RunOutcome::TimedOut);
                    }
                    poll_timeout(remaining)
                }
            };

            if let Some((ready, slots)) = self.wait(timeout)? {
                self.dispatch(&ready, slots);
            }
        }
    }

    /// Block until a channel is ready. `None` means the wait timed out.
    fn wait(&self, timeout: PollTimeout) -> Result<Option<(Vec<bool>, WriterSlots)>> {
        let mut fds: Vec<PollFd<'_>> = Vec::with_capacity(self.len() + 1);
        for reader in &self.readers {
            if let Some(fd) = reader.channel.read_fd() {
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
            }
        }

        let mut slots = WriterSlots::default();
        if let Some(writer) = &self.writer {
            if let Some(fd) = writer.wake.read_fd() {
                slots.wake = Some(fds.len());
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
            }
            if !writer.pending.is_empty() {
                if let Some(fd) = writer.channel.write_fd() {
                    slots.out = Some(fds.len());
                    fds.push(PollFd::new(fd, PollFlags::POLLOUT));
                }
            }
        }

        let count = poll(&mut fds, timeout)
            .map_err(|err| AppError::Reactor(format!("poll failed: {err}")))?;
        if count == 0 {
            return Ok(None);
        }

        let ready = fds
            .iter()
            .map(|fd| fd.revents().is_some_and(|events| events.intersects(READY)))
            .collect();
        Ok(Some((ready, slots)))
    }

    fn dispatch(&mut self, ready: &[bool], slots: WriterSlots) {
        for (reader, _) in self
            .readers
            .iter_mut()
            .zip(ready)
            .filter(|(_, ready)| **ready)
        {
            let chunk = reader.channel.read();
            if !chunk.is_empty() {
                (reader.on_data)(&chunk);
            }
        }

        let is_ready =
            |slot: Option<usize>| slot.is_some_and(|index| ready.get(index) == Some(&true));
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if is_ready(slots.wake) {
            // The bytes only signal; queued input is collected at the top of the loop.
            writer.wake.read();
        }
        if is_ready(slots.out) {
            let chunk = writer.pending.len().min(WRITE_CHUNK);
            let written = writer.channel.write(&writer.pending[..chunk]);
            writer.pending.advance(written);
            if writer.channel.write_fd().is_none() {
                tracing::debug!(
                    unwritten = writer.pending.len(),
                    "standard input closed by the child"
                );
                writer.pending.clear();
            }
        }
    }

    /// Close every channel and forget it.
    fn force_close(&mut self) {
        for reader in &mut self.readers {
            reader.channel.close_read();
        }
        self.readers.clear();
        self.writer = None;
    }
}

/// Poll timeout for `remaining`, rounded up to a whole millisecond.
///
/// Waits longer than the poll limit are capped; the loop simply polls again.
fn poll_timeout(remaining: Duration) -> PollTimeout {
    let millis = remaining.as_millis().max(1);
    PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
}
