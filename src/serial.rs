//! [`SerialLine`] over a real serial port.
//!
//! The UART hardware checks the parity bit of every received byte, so bytes
//! handed over by the driver are paired with their computed parity.

use crate::protocol::Symbol;
use crate::transport::SerialLine;
use std::io::{self, Read, Write};

pub const BAUD_RATE: u32 = 500;
pub const PARITY: tokio_serial::Parity = tokio_serial::Parity::Even;
pub const STOP_BITS: tokio_serial::StopBits = tokio_serial::StopBits::One;
pub const DATA_BITS: tokio_serial::DataBits = tokio_serial::DataBits::Eight;

pub fn serial_port_builder(device: &str) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, BAUD_RATE)
        .parity(PARITY)
        .stop_bits(STOP_BITS)
        .data_bits(DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

pub struct SerialPortLine {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SerialPortLine {
    pub fn new(port: Box<dyn tokio_serial::SerialPort>) -> Self {
        Self { port }
    }

    pub fn open(device: &str) -> Result<Self, tokio_serial::Error> {
        serial_port_builder(device).open().map(Self::new)
    }
}

impl SerialLine for SerialPortLine {
    fn read_symbols(&mut self, buffer: &mut [Symbol]) -> io::Result<usize> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        let mut bytes = vec![0u8; available.min(buffer.len())];
        let count = self.port.read(&mut bytes)?;
        for (slot, byte) in buffer.iter_mut().zip(&bytes[..count]) {
            *slot = Symbol::from_byte(*byte);
        }
        Ok(count)
    }

    fn write_symbols(&mut self, symbols: &[Symbol]) -> io::Result<()> {
        let bytes: Vec<u8> = symbols.iter().map(|symbol| symbol.byte()).collect();
        self.port.write_all(&bytes)?;
        self.port.flush()
    }
}
