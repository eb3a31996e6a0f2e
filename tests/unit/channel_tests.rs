//! Unit tests for pipe and pseudo-terminal channels.

use sce_toolhost::config::TerminalConfig;
use sce_toolhost::process::{Channel, ChannelKind, ChannelState};
use sce_toolhost::AppError;

#[test]
fn pipe_round_trips_bytes() {
    let mut channel = Channel::pipe().expect("pipe");
    assert_eq!(channel.kind(), ChannelKind::Pipe);
    assert_eq!(channel.state(), ChannelState::Open);

    channel.write_all(b"hello").expect("write");
    assert_eq!(&channel.read()[..], b"hello");
}

#[test]
fn read_after_writer_closed_reports_eof_and_closes_read_side() {
    let mut channel = Channel::pipe().expect("pipe");
    channel.write_all(b"x").expect("write");
    channel.close_write();
    assert_eq!(channel.state(), ChannelState::WriteClosed);

    assert_eq!(&channel.read()[..], b"x");
    assert!(channel.read().is_empty());
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(!channel.is_open());
}

#[test]
fn closing_twice_is_harmless() {
    let mut channel = Channel::pipe().expect("pipe");
    channel.close_read();
    channel.close_read();
    assert_eq!(channel.state(), ChannelState::ReadClosed);
    channel.close_write();
    channel.close_write();
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn write_after_close_is_channel_closed() {
    let mut channel = Channel::pipe().expect("pipe");
    channel.close_write();
    assert_eq!(channel.write(b"data"), 0);
    let result = channel.write_all(b"data");
    assert!(matches!(result, Err(AppError::ChannelClosed(_))));
}

#[test]
fn write_to_pipe_without_reader_closes_write_side() {
    let mut channel = Channel::pipe().expect("pipe");
    channel.close_read();
    assert!(channel.write_all(b"lost").is_err());
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn take_hands_over_descriptors() {
    let mut channel = Channel::pipe().expect("pipe");
    assert!(channel.take_write().is_some());
    assert!(channel.take_write().is_none());
    assert_eq!(channel.state(), ChannelState::WriteClosed);
    assert!(channel.take_read().is_some());
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn terminal_translates_newlines_on_output() {
    let mut channel = Channel::terminal(&TerminalConfig::default()).expect("pty");
    assert_eq!(channel.kind(), ChannelKind::Terminal);

    channel.write_all(b"line\n").expect("write to slave");
    assert_eq!(&channel.read()[..], b"line\r\n");
}
