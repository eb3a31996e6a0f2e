//! Byte channels over pipes and pseudo-terminals.
//!
//! A [`Channel`] owns at most one read descriptor and one write descriptor.
//! Each side can be closed on its own (half-close); closing is idempotent.
//! Reads and writes never raise errors: an error or end-of-file closes the
//! affected side, which the caller observes through [`Channel::state`].

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use bytes::Bytes;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};

use crate::config::TerminalConfig;
use crate::process::terminal;
use crate::{AppError, Result};

/// Maximum number of bytes returned by a single [`Channel::read`].
pub const CHUNK_SIZE: usize = 1024;

/// The OS object behind a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// An anonymous pipe: read end and write end.
    Pipe,
    /// A pseudo-terminal pair: master (read) and slave (write).
    Terminal,
}

/// Half-close state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Both sides are open.
    Open,
    /// The read side is closed; the write side is open.
    ReadClosed,
    /// The write side is closed; the read side is open.
    WriteClosed,
    /// Both sides are closed.
    Closed,
}

/// An owned, half-closable byte stream endpoint.
#[derive(Debug)]
pub struct Channel {
    kind: ChannelKind,
    read: Option<File>,
    write: Option<File>,
}

impl Channel {
    /// Create an anonymous pipe. Both ends are close-on-exec.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the pipe cannot be created.
    pub fn pipe() -> Result<Self> {
        let (read, write) = nix::unistd::pipe()
            .map_err(|err| AppError::Launch(format!("failed creating pipe: {err}")))?;
        set_close_on_exec(&read)?;
        set_close_on_exec(&write)?;
        Ok(Self {
            kind: ChannelKind::Pipe,
            read: Some(File::from(read)),
            write: Some(File::from(write)),
        })
    }

    /// Create a pseudo-terminal pair configured from `config`.
    ///
    /// The master is the read side and the slave the write side, so handing
    /// the write side to a child makes its output look like a terminal's.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the pseudo-terminal cannot be opened or
    /// configured.
    pub fn terminal(config: &TerminalConfig) -> Result<Self> {
        let (master, slave) = terminal::open_pty(config)?;
        set_close_on_exec(&master)?;
        set_close_on_exec(&slave)?;
        Ok(Self {
            kind: ChannelKind::Terminal,
            read: Some(File::from(master)),
            write: Some(File::from(slave)),
        })
    }

    /// Pipe or terminal.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Current half-close state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        match (self.read.is_some(), self.write.is_some()) {
            (true, true) => ChannelState::Open,
            (false, true) => ChannelState::ReadClosed,
            (true, false) => ChannelState::WriteClosed,
            (false, false) => ChannelState::Closed,
        }
    }

    /// Whether either side is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() != ChannelState::Closed
    }

    /// Read up to [`CHUNK_SIZE`] bytes.
    ///
    /// Returns an empty buffer and closes the read side on end-of-file or
    /// error. A pseudo-terminal master reports `EIO` once the slave is gone,
    /// which counts as end-of-file. A non-blocking channel with nothing to
    /// read returns an empty buffer and stays open.
    pub fn read(&mut self) -> Bytes {
        let Some(file) = self.read.as_mut() else {
            return Bytes::new();
        };

        let mut buffer = [0u8; CHUNK_SIZE];
        let result = loop {
            match file.read(&mut buffer) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(count) if count > 0 => Bytes::copy_from_slice(&buffer[..count]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Bytes::new(),
            _ => {
                self.close_read();
                Bytes::new()
            }
        }
    }

    /// Write as much of `data` as the OS accepts and return that count.
    ///
    /// A non-blocking channel that cannot take any bytes reports 0 and stays
    /// open; any other error closes the write side and reports 0.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let Some(file) = self.write.as_mut() else {
            return 0;
        };

        let result = loop {
            match file.write(data) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(count) => count,
            Err(err) if err.kind() == ErrorKind::WouldBlock => 0,
            Err(_) => {
                self.close_write();
                0
            }
        }
    }

    /// Write all of `data`, retrying partial writes.
    ///
    /// Intended for blocking channels; on a non-blocking one this spins until
    /// the reader makes room.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ChannelClosed` if the write side is closed before
    /// everything was written.
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.write.is_none() {
                return Err(AppError::ChannelClosed(format!(
                    "{} bytes could not be written",
                    data.len()
                )));
            }
            let written = self.write(data);
            data = &data[written..];
        }
        Ok(())
    }

    /// Switch both open sides to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the descriptor flags cannot be changed.
    pub fn set_nonblocking(&self) -> Result<()> {
        for file in self.read.iter().chain(self.write.iter()) {
            set_nonblocking(file)?;
        }
        Ok(())
    }

    /// Separate the channel into a read-only and a write-only channel.
    #[must_use]
    pub fn split(self) -> (Self, Self) {
        (
            Self {
                kind: self.kind,
                read: self.read,
                write: None,
            },
            Self {
                kind: self.kind,
                read: None,
                write: self.write,
            },
        )
    }

    /// Close the read side. Does nothing if it is already closed.
    pub fn close_read(&mut self) {
        self.read = None;
    }

    /// Close the write side. Does nothing if it is already closed.
    pub fn close_write(&mut self) {
        self.write = None;
    }

    /// Take ownership of the read side, e.g. to hand it to a child process.
    pub fn take_read(&mut self) -> Option<OwnedFd> {
        self.read.take().map(OwnedFd::from)
    }

    /// Take ownership of the write side, e.g. to hand it to a child process.
    pub fn take_write(&mut self) -> Option<OwnedFd> {
        self.write.take().map(OwnedFd::from)
    }

    pub(crate) fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(AsFd::as_fd)
    }

    pub(crate) fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(AsFd::as_fd)
    }
}

fn set_close_on_exec(fd: &OwnedFd) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map_err(|err| AppError::Launch(format!("failed setting close-on-exec: {err}")))?;
    Ok(())
}

fn set_nonblocking(file: &File) -> Result<()> {
    let flags = fcntl(file.as_raw_fd(), FcntlArg::F_GETFL)
        .map_err(|err| AppError::Launch(format!("failed reading descriptor flags: {err}")))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(file.as_raw_fd(), FcntlArg::F_SETFL(flags))
        .map_err(|err| AppError::Launch(format!("failed setting non-blocking mode: {err}")))?;
    Ok(())
}
