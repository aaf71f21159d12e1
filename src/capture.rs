//! Mirroring of bus traffic to a diagnostic sink.
//!
//! Bytes handed to a sink are always the logical (un-inverted) frame layout,
//! which is what protocol dissectors expect.

use crate::protocol::format_hex;
use log::debug;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// Receives a copy of every burst read from and every frame written to the bus.
pub trait CaptureSink {
    fn capture(&mut self, direction: Direction, bytes: &[u8]);
}

impl<F> CaptureSink for F
where
    F: FnMut(Direction, &[u8]),
{
    fn capture(&mut self, direction: Direction, bytes: &[u8]) {
        self(direction, bytes)
    }
}

/// Writes captured traffic to the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCapture;

impl CaptureSink for LogCapture {
    fn capture(&mut self, direction: Direction, bytes: &[u8]) {
        debug!("{direction}: {}", format_hex(bytes));
    }
}
