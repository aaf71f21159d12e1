//! The device loop: moves frames between the [`Transport`] and the
//! [`Controller`] and keeps time for both.

use crate::controller::{Controller, ControllerConfig};
use crate::transport::{Error, SerialLine, Transport};
use log::{debug, trace, warn};
use std::time::Instant;

pub struct Driver<L> {
    transport: Transport<L>,
    controller: Controller,
    last_activity: Option<Instant>,
    silence_reported: bool,
}

impl<L: SerialLine> Driver<L> {
    pub fn new(transport: Transport<L>, config: ControllerConfig) -> Self {
        Self {
            transport,
            controller: Controller::new(config),
            last_activity: None,
            silence_reported: false,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn transport(&self) -> &Transport<L> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<L> {
        &mut self.transport
    }

    pub fn into_inner(self) -> (Transport<L>, Controller) {
        (self.transport, self.controller)
    }

    /// Runs one iteration of the device loop.
    ///
    /// Invalid frames are logged and dropped; only line errors are returned.
    pub fn poll(&mut self, now: Instant) -> Result<(), Error> {
        self.transport.poll(now)?;

        while let Some(received) = self.transport.poll_frame() {
            self.last_activity = Some(now);
            self.silence_reported = false;

            let frame = match received.decode() {
                Ok(frame) => frame,
                Err(error) => {
                    warn!("Discarding frame: {error}");
                    continue;
                }
            };
            let Some(reply) = self
                .controller
                .process_frame(&frame, received.last_on_wire, now)
            else {
                continue;
            };
            match self.transport.send_frame(&reply) {
                Ok(()) => {}
                Err(Error::BusBusy) => debug!("Bus busy, dropped reply {reply}"),
                Err(error) => return Err(error),
            }
        }

        if let Some(failure) = self.controller.tick(now) {
            trace!("{} failed: {}", failure.command, failure.reason);
        }
        self.check_bus_silence(now);
        self.controller.publish();
        Ok(())
    }

    fn check_bus_silence(&mut self, now: Instant) {
        let last_activity = *self.last_activity.get_or_insert(now);
        let timeout = self.controller.config().timing.bus_silence_timeout;
        if !self.silence_reported && now.saturating_duration_since(last_activity) >= timeout {
            warn!("No frames received for {timeout:?}, reinitializing");
            self.silence_reported = true;
            self.controller.reinitialize();
        }
    }
}
