//! Shared handle to a child's standard input.
//!
//! The reactor owns the stdin channel for the whole life of the process.
//! Callers never touch the descriptor: [`InputHandle::send`] appends to a
//! queue and pokes the reactor through a wake pipe, so it returns at once no
//! matter how slowly the child reads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::process::channel::Channel;
use crate::{AppError, Result};

#[derive(Debug, Default)]
struct InputState {
    queued: Vec<u8>,
    attached: bool,
    close_requested: bool,
    waker: Option<Channel>,
}

impl InputState {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.as_mut() {
            // A full wake pipe already has a wake-up pending.
            waker.write(&[1]);
        }
    }
}

/// Bytes handed from an [`InputHandle`] to the reactor.
#[derive(Debug, Default)]
pub(crate) struct Drained {
    pub(crate) bytes: Vec<u8>,
    pub(crate) close_requested: bool,
}

/// Cloneable, thread-safe access to a child's stdin.
#[derive(Debug, Clone)]
pub struct InputHandle {
    shared: Arc<Mutex<InputState>>,
}

impl InputHandle {
    /// Handle attached to a reactor, plus the read side of its wake pipe.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the wake pipe cannot be created.
    pub(crate) fn attached() -> Result<(Self, Channel)> {
        let (wake_read, wake_write) = Channel::pipe()?.split();
        wake_write.set_nonblocking()?;
        let handle = Self {
            shared: Arc::new(Mutex::new(InputState {
                attached: true,
                waker: Some(wake_write),
                ..InputState::default()
            })),
        };
        Ok((handle, wake_read))
    }

    /// Queue `bytes` for the child's stdin.
    ///
    /// Never blocks: the worker thread writes the bytes as the child reads
    /// them, in the order they were sent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if stdin was closed or the child
    /// stopped reading.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if state.close_requested {
            return Err(AppError::ChannelClosed("standard input was closed".into()));
        }
        if !state.attached {
            return Err(AppError::ChannelClosed("standard input is gone".into()));
        }
        if bytes.is_empty() {
            return Ok(());
        }
        state.queued.extend_from_slice(bytes);
        state.wake();
        Ok(())
    }

    /// Close stdin so the child sees end-of-file.
    ///
    /// Bytes already sent are written first. Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if !state.close_requested {
            state.close_requested = true;
            state.wake();
        }
    }

    /// Whether [`InputHandle::close`] was called or stdin is otherwise gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        let state = self.shared.lock();
        state.close_requested || !state.attached
    }

    /// Bytes waiting to be picked up by the reactor.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.lock().queued.len()
    }

    /// Called by the reactor to collect queued bytes.
    pub(crate) fn drain(&self) -> Drained {
        let mut state = self.shared.lock();
        Drained {
            bytes: std::mem::take(&mut state.queued),
            close_requested: state.close_requested,
        }
    }

    /// Called by the reactor once it closed stdin.
    pub(crate) fn detach(&self) {
        let mut state = self.shared.lock();
        state.attached = false;
        state.queued.clear();
        state.waker = None;
    }
}
