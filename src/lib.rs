//! A library for taking part in the Fujitsu Halcyon wired remote controller bus.
//!
//! Indoor units of the Fujitsu Halcyon (AirStage) range talk to their wired
//! remote controllers over a single wire, half-duplex UART at 500 baud. This
//! crate implements a controller for that bus: it decodes the traffic,
//! tracks the state of the indoor unit and writes settings back when it is
//! handed the token.
//!
//! The crate is layered:
//!
//! 1.  **Codec**: [`protocol`] holds the strongly typed frame model and the
//!     8 byte wire format with its per byte parity.
//! 2.  **Bus access**: [`transport`] frames a symbol stream into bursts and
//!     [`arbitration`] decides when this controller may transmit.
//! 3.  **Device logic**: [`controller`] runs the initialization sequence,
//!     answers the token, and queues changes in the [`scheduler`] until the
//!     indoor unit acknowledges them. The result is exposed as a
//!     [`state::ControllerState`] snapshot and as [`entities`].
//! 4.  **Loop**: [`driver::Driver`] ties a line to a controller and is polled
//!     by the host on a fixed tick.
//!
//! ## Quick Start
//!
//! ```no_run
//! use halcyon_lib::{
//!     controller::ControllerConfig, driver::Driver, serial::SerialPortLine,
//!     transport::Transport,
//! };
//! use std::time::{Duration, Instant};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let line = SerialPortLine::open("/dev/ttyUSB0")?;
//!     let mut driver = Driver::new(Transport::new(line), ControllerConfig::default());
//!     loop {
//!         driver.poll(Instant::now())?;
//!         if driver.controller().is_initialized() {
//!             println!("Setpoint: {} °C", driver.controller().state().setpoint);
//!         }
//!         std::thread::sleep(Duration::from_millis(10));
//!     }
//! }
//! ```

pub mod arbitration;
pub mod capture;
pub mod controller;
pub mod driver;
pub mod entities;
pub mod protocol;
pub mod scheduler;
pub mod state;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
#[cfg(feature = "serial")]
pub mod serial;

#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
#[cfg(feature = "serde")]
pub mod config;
