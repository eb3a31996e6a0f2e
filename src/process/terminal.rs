//! Pseudo-terminal setup and the environment given to tools.

use std::os::fd::OwnedFd;

use nix::pty::{openpty, Winsize};
use nix::sys::termios::{
    cfsetspeed, tcgetattr, tcsetattr, BaudRate, InputFlags, LocalFlags, OutputFlags, SetArg,
    Termios,
};

use crate::config::TerminalConfig;
use crate::{AppError, Result};

/// Approximate cell size used to fill in the pixel fields of the window size.
const CELL_WIDTH_PX: u16 = 8;
const CELL_HEIGHT_PX: u16 = 10;

/// Environment variables set for every tool so that colour-capable programs
/// emit ANSI sequences.
pub const TOOL_ENVIRONMENT: &[(&str, &str)] = &[
    ("TERM", "xterm-256color"),
    ("COLORTERM", "truecolor"),
    ("COLORFGBG", "0;15"),
    (
        "LS_COLORS",
        "rs=0:di=01;34:ln=01;36:mh=00:pi=40;33:so=01;35:do=01;35:bd=40;33;01:cd=40;33;01:\
         or=40;31;01:mi=00:su=37;41:sg=30;43:ca=30;41:tw=30;42:ow=34;42:st=37;44:ex=01;32:\
         *.tar=01;31:*.tgz=01;31:*.zip=01;31:*.gz=01;31:*.xz=01;31:*.zst=01;31:*.jpg=01;35:\
         *.png=01;35:*.svg=01;35:*.mp3=00;36:*.ogg=00;36:*.wav=00;36",
    ),
];

/// Window size for `config`.
#[must_use]
pub fn window_size(config: &TerminalConfig) -> Winsize {
    Winsize {
        ws_row: config.rows,
        ws_col: config.cols,
        ws_xpixel: config.cols.saturating_mul(CELL_WIDTH_PX),
        ws_ypixel: config.rows.saturating_mul(CELL_HEIGHT_PX),
    }
}

/// Open a pseudo-terminal pair with the line discipline from `config`.
///
/// Returns `(master, slave)`.
pub(crate) fn open_pty(config: &TerminalConfig) -> Result<(OwnedFd, OwnedFd)> {
    let winsize = window_size(config);
    let pty = openpty(&winsize, None)
        .map_err(|err| AppError::Launch(format!("failed opening pseudo-terminal: {err}")))?;

    let mut termios = tcgetattr(&pty.slave)
        .map_err(|err| AppError::Launch(format!("failed reading terminal settings: {err}")))?;
    apply_discipline(&mut termios, config);
    cfsetspeed(&mut termios, BaudRate::B38400)
        .map_err(|err| AppError::Launch(format!("failed setting terminal speed: {err}")))?;
    tcsetattr(&pty.slave, SetArg::TCSANOW, &termios)
        .map_err(|err| AppError::Launch(format!("failed applying terminal settings: {err}")))?;

    Ok((pty.master, pty.slave))
}

/// Configure `termios` to behave like an interactive terminal.
fn apply_discipline(termios: &mut Termios, config: &TerminalConfig) {
    let mut input = InputFlags::ICRNL | InputFlags::IXON | InputFlags::IXOFF;
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    {
        input |= InputFlags::IUTF8;
    }
    termios.input_flags = input;

    // `\n` becomes `\r\n` on output, as on a real terminal.
    termios.output_flags = OutputFlags::OPOST | OutputFlags::ONLCR;

    let mut local = LocalFlags::empty();
    if config.canonical {
        local |= LocalFlags::ICANON | LocalFlags::IEXTEN;
    }
    if config.signals {
        local |= LocalFlags::ISIG;
    }
    if config.echo {
        local |= LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ECHOK;
    }
    termios.local_flags = local;
}
