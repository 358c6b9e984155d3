//! The contract between the protocol engine and the UWB radio driver
//!
//! The radio itself is a black box to this crate: some driver owns the bus
//! and the register map, keeps the receiver armed, transmits at scheduled
//! instants and captures 40-bit hardware timestamps for both directions.
//! [`UwbRadio`] is the surface the event loop programs against;
//! [`RadioIrqFlags`] is the one-bit handshake between the driver's
//! interrupt handlers and the main loop.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::time::Instant;

/// The two flags the radio's interrupt handlers may touch
///
/// Interrupt handlers only ever `set_*`; the main loop snapshots and clears
/// with `take_*`. A new interrupt arriving between a `take_*` and the
/// corresponding driver read either re-sets the flag or costs one frame,
/// which the shared-buffer design already accepts.
#[derive(Debug, Default)]
pub struct RadioIrqFlags {
    received: AtomicBool,
    sent: AtomicBool,
}

impl RadioIrqFlags {
    /// Creates both flags cleared
    pub const fn new() -> Self {
        RadioIrqFlags {
            received: AtomicBool::new(false),
            sent: AtomicBool::new(false),
        }
    }

    /// Signals a completed reception; called from the receive ISR
    pub fn set_received(&self) {
        self.received.store(true, Ordering::SeqCst);
    }

    /// Signals a completed transmission; called from the send ISR
    pub fn set_sent(&self) {
        self.sent.store(true, Ordering::SeqCst);
    }

    /// Snapshots and clears the receive flag; called from the main loop
    pub fn take_received(&self) -> bool {
        self.received.swap(false, Ordering::SeqCst)
    }

    /// Snapshots and clears the send flag; called from the main loop
    pub fn take_sent(&self) -> bool {
        self.sent.swap(false, Ordering::SeqCst)
    }
}

/// A completed reception
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceivedFrame {
    /// Number of payload bytes written to the caller's buffer
    pub len: usize,
    /// When the frame arrived, as a 40-bit radio timestamp
    ///
    /// Aligned with the timestamps returned for scheduled transmissions, so
    /// the two can be subtracted.
    pub rx_time: Instant,
}

/// The driver surface the protocol engine requires
///
/// Errors are logged and otherwise ignored by the engine; the ring keeps
/// turning with degraded information rather than halting.
pub trait UwbRadio {
    /// The driver's error type
    type Error: core::fmt::Debug;

    /// Sets the network ID and device address used for filtering
    fn configure(&mut self, network_id: u16, device_id: u8) -> Result<(), Self::Error>;

    /// Puts the receiver into its permanent listening mode
    ///
    /// The radio must keep listening across frames without per-frame
    /// re-arming; receptions are signalled through [`RadioIrqFlags`].
    fn start_receiving(&mut self) -> Result<(), Self::Error>;

    /// Schedules a frame for transmission at an absolute radio time
    ///
    /// The radio starts the preamble so that the timestamp it would report
    /// for the frame equals `at`. The call returns immediately; completion
    /// is signalled through [`RadioIrqFlags`] and confirmed with
    /// [`UwbRadio::finish_transmit`]. The lead time must be large enough
    /// for frame upload to finish before the scheduled instant.
    fn schedule_transmit(&mut self, frame: &[u8], at: Instant) -> Result<(), Self::Error>;

    /// Confirms a completed transmission and returns its actual timestamp
    ///
    /// Returns `nb::Error::WouldBlock` while the transmission is still in
    /// flight.
    fn finish_transmit(&mut self) -> nb::Result<Instant, Self::Error>;

    /// Copies the most recently received frame into `buf`
    ///
    /// Returns `nb::Error::WouldBlock` when no complete frame is available,
    /// which can legitimately happen after a reception was sacrificed to an
    /// outbound frame sharing the buffer.
    fn read_frame(&mut self, buf: &mut [u8]) -> nb::Result<ReceivedFrame, Self::Error>;

    /// Reads the radio's current 40-bit system time
    fn sys_time(&mut self) -> Result<Instant, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_taken_once() {
        let flags = RadioIrqFlags::new();
        assert!(!flags.take_received());

        flags.set_received();
        assert!(flags.take_received());
        assert!(!flags.take_received());

        flags.set_sent();
        flags.set_sent();
        assert!(flags.take_sent());
        assert!(!flags.take_sent());
    }
}
