//! Symbol level access to the half-duplex bus.
//!
//! Frames are not delimited on the wire. A burst of symbols ends when the
//! line stays quiet for longer than [`INTER_FRAME_GAP`]; a burst then holds
//! one or more back-to-back frames. Only the final frame of a burst may be
//! answered, anything earlier has already lost its transmit window.

use crate::capture::{CaptureSink, Direction};
use crate::protocol::{self as proto, Frame, Symbol, FRAME_SIZE};
use log::{trace, warn};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

/// Duration of one 11 bit symbol (start, 8 data, parity, stop) at 500 baud.
pub const SYMBOL_TIME: Duration = Duration::from_millis(22);

/// Line idle time after which a burst is complete.
pub const INTER_FRAME_GAP: Duration = Duration::from_millis(2 * 22);

/// Longest burst kept while the line never goes quiet; older symbols are dropped.
pub const MAX_BURST_SYMBOLS: usize = FRAME_SIZE * 8;

/// How long [`Transport::receive_frame`] sleeps between polls.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(11);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] proto::Error),

    #[error("Serial line I/O error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Bus busy, a burst is being received")]
    BusBusy,

    #[error("No frame received within {0:?}")]
    Timeout(Duration),
}

/// The physical line underneath a [`Transport`].
pub trait SerialLine {
    /// Moves already received symbols into `buffer` without blocking.
    ///
    /// Returns the number of symbols stored, `0` when the line is idle.
    fn read_symbols(&mut self, buffer: &mut [Symbol]) -> io::Result<usize>;

    fn write_symbols(&mut self, symbols: &[Symbol]) -> io::Result<()>;
}

/// A frame sized chunk of a completed burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub symbols: [Symbol; FRAME_SIZE],
    /// Set on the final frame of a burst, the only one that may be answered.
    pub last_on_wire: bool,
}

impl Received {
    pub fn decode(&self) -> Result<Frame, proto::Error> {
        Frame::decode(&self.symbols)
    }
}

pub struct Transport<L> {
    line: L,
    burst: Vec<Symbol>,
    last_symbol_at: Option<Instant>,
    frames: VecDeque<Received>,
    capture: Option<Box<dyn CaptureSink>>,
    inter_frame_gap: Duration,
}

impl<L: SerialLine> Transport<L> {
    pub fn new(line: L) -> Self {
        Self {
            line,
            burst: Vec::with_capacity(FRAME_SIZE * 4),
            last_symbol_at: None,
            frames: VecDeque::new(),
            capture: None,
            inter_frame_gap: INTER_FRAME_GAP,
        }
    }

    pub fn with_capture(mut self, sink: impl CaptureSink + 'static) -> Self {
        self.capture = Some(Box::new(sink));
        self
    }

    pub fn set_capture(&mut self, sink: Option<Box<dyn CaptureSink>>) {
        self.capture = sink;
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    pub fn into_inner(self) -> L {
        self.line
    }

    /// Whether a burst is currently being received.
    pub fn is_receiving(&self) -> bool {
        !self.burst.is_empty()
    }

    /// Reads everything the line has buffered and completes the current
    /// burst once the line has been idle for longer than the frame gap.
    ///
    /// Symbols are stamped with `now`, so the gap is only measured to the
    /// resolution of the polling tick, which must stay well below
    /// [`INTER_FRAME_GAP`].
    pub fn poll(&mut self, now: Instant) -> Result<(), Error> {
        let mut buffer = [Symbol::default(); FRAME_SIZE * 4];
        loop {
            let count = self.line.read_symbols(&mut buffer)?;
            if count == 0 {
                break;
            }
            self.burst.extend_from_slice(&buffer[..count]);
            self.last_symbol_at = Some(now);
            if self.burst.len() > MAX_BURST_SYMBOLS {
                let excess = self.burst.len() - MAX_BURST_SYMBOLS;
                warn!("No frame gap for {} symbols, dropped {excess}", self.burst.len());
                self.burst.drain(..excess);
            }
        }

        if let Some(last_symbol_at) = self.last_symbol_at {
            if now.saturating_duration_since(last_symbol_at) > self.inter_frame_gap {
                self.complete_burst();
            }
        }
        Ok(())
    }

    fn complete_burst(&mut self) {
        self.last_symbol_at = None;
        let burst = std::mem::take(&mut self.burst);

        if let Some(sink) = self.capture.as_mut() {
            let logical: Vec<u8> = burst.iter().map(|symbol| !symbol.byte()).collect();
            sink.capture(Direction::Rx, &logical);
        }

        let discard = burst.len() % FRAME_SIZE;
        if discard > 0 {
            warn!("Discarded {discard} bytes of a partial frame");
        }

        // A newer burst supersedes anything still queued
        for queued in self.frames.iter_mut() {
            queued.last_on_wire = false;
        }

        let chunks = burst[discard..].chunks_exact(FRAME_SIZE);
        let count = chunks.len();
        for (index, chunk) in chunks.enumerate() {
            let mut symbols = [Symbol::default(); FRAME_SIZE];
            symbols.copy_from_slice(chunk);
            self.frames.push_back(Received {
                symbols,
                last_on_wire: index + 1 == count,
            });
        }
    }

    /// Returns the oldest completed frame without blocking.
    pub fn poll_frame(&mut self) -> Option<Received> {
        self.frames.pop_front()
    }

    /// Blocks until a frame is received or `timeout` elapses.
    pub fn receive_frame(&mut self, timeout: Duration) -> Result<Received, Error> {
        let start = Instant::now();
        loop {
            let now = Instant::now();
            self.poll(now)?;
            if let Some(received) = self.poll_frame() {
                return Ok(received);
            }
            if now.duration_since(start) >= timeout {
                return Err(Error::Timeout(timeout));
            }
            std::thread::sleep(RECEIVE_POLL_INTERVAL);
        }
    }

    /// Encodes and transmits `frame`. Refuses to talk over a burst in progress.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        if self.is_receiving() {
            return Err(Error::BusBusy);
        }
        trace!("TX {frame}");
        if let Some(sink) = self.capture.as_mut() {
            sink.capture(Direction::Tx, &frame.to_logical());
        }
        self.line.write_symbols(&frame.encode())?;
        Ok(())
    }
}
