//! The single-threaded event loop of one ranging node
//!
//! [`RangingNode`] owns the peer table, the MAC, the frame buffer and the
//! reporting channel, and drives them from a non-blocking [`poll`] the
//! firmware calls from its main loop. The radio's interrupt handlers only
//! ever touch the two [`RadioIrqFlags`]; everything else runs here, in one
//! context, in a fixed order: receptions first, then send completions, then
//! the time-driven state machine.
//!
//! Nothing in this module propagates an error upward. A node with a flaky
//! radio or a wedged console keeps ranging with whatever information it
//! still gets; the only way to stop it is to cut power.
//!
//! [`poll`]: RangingNode::poll

use core::fmt;

use crate::configs::{NodeConfig, Role, DUMMY_ID};
use crate::frame::{Frame, PeerReport, MAX_FRAME_LEN};
use crate::mac::{Mac, MacStep};
use crate::peer::PeerTable;
use crate::radio::{RadioIrqFlags, UwbRadio};
use crate::ranging::{self, CounterOutcome};
use crate::report::Reporter;

/// One ranging node: radio, peer table, MAC and reporting channel
pub struct RangingNode<'a, R, W> {
    config: NodeConfig,
    radio: R,
    reporter: Reporter<W>,
    flags: &'a RadioIrqFlags,
    peers: PeerTable,
    mac: Mac,
    /// Shared between receive DMA reads and outbound frame assembly; a
    /// reception landing here mid-assembly is sacrificed, not duplicated
    buffer: [u8; MAX_FRAME_LEN],
}

impl<'a, R, W> RangingNode<'a, R, W>
where
    R: UwbRadio,
    W: fmt::Write,
{
    /// Brings up a node: configures the radio and starts listening
    ///
    /// `flags` is the flag pair the driver's interrupt handlers signal; in
    /// firmware it lives in a `static`.
    pub fn new(
        config: NodeConfig,
        mut radio: R,
        console: W,
        flags: &'a RadioIrqFlags,
        now_us: u64,
    ) -> Self {
        let mut reporter = Reporter::new(console);

        if let Err(error) = radio.configure(config.network_id, config.node_id) {
            reporter.diag(format_args!("radio configuration failed: {:?}", error));
        }
        if let Err(error) = radio.start_receiving() {
            reporter.diag(format_args!("failed to start receiving: {:?}", error));
        }

        let mac = Mac::new(config.node_id, now_us, config.startup_silence_us());

        RangingNode {
            config,
            radio,
            reporter,
            flags,
            peers: PeerTable::new(),
            mac,
            buffer: [0; MAX_FRAME_LEN],
        }
    }

    /// The node's configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The MAC state, for inspection
    pub fn mac(&self) -> &Mac {
        &self.mac
    }

    /// The peer table, for inspection
    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// The console sink, for inspection
    pub fn console(&self) -> &W {
        self.reporter.sink()
    }

    /// Runs one main-loop iteration
    ///
    /// `now_us` is a monotonic host microsecond clock; it only drives the
    /// MAC slot timing, never the ranging arithmetic.
    pub fn poll(&mut self, now_us: u64) {
        // Receptions are handled before anything else, and suppressed while
        // our own transmission holds the shared buffer.
        if self.flags.take_received() && !self.mac.took_turn() {
            self.handle_reception(now_us);
        }

        if self.flags.take_sent() {
            self.handle_send_complete(now_us);
        }

        match self.mac.advance(now_us, self.peers.len(), &self.config.timing) {
            MacStep::Idle => {}
            MacStep::Transmit => self.transmit(now_us),
            MacStep::SlotMissed(id) => self.handle_slot_miss(id),
        }
    }

    fn handle_reception(&mut self, now_us: u64) {
        // Slot accounting uses this capture: parsing time below must not be
        // charged to the next transmitter.
        let rx_poll_time_us = now_us;

        let received = match self.radio.read_frame(&mut self.buffer) {
            Ok(received) => received,
            Err(nb::Error::WouldBlock) => {
                // The reception was sacrificed to an outbound frame sharing
                // the buffer.
                self.reporter.diag(format_args!("dropped an incomplete reception"));
                return;
            }
            Err(nb::Error::Other(error)) => {
                self.reporter
                    .diag(format_args!("receive failed: {:?}", error));
                return;
            }
        };

        let frame = match Frame::decode(&self.buffer[..received.len]) {
            Ok(frame) => frame,
            Err(error) => {
                self.reporter
                    .diag(format_args!("dropping bad frame: {:?}", error));
                return;
            }
        };

        // Our own ID coming back means the frame is a loopback or was
        // clobbered in the shared buffer; either way it must not touch any
        // state. IDs outside 1..=254 cannot be ring members.
        if frame.sender_id == self.config.node_id
            || frame.sender_id == 0
            || frame.sender_id == DUMMY_ID
        {
            self.reporter
                .diag(format_args!("dropping frame from id {}", frame.sender_id));
            return;
        }

        let is_new = !self.peers.contains(frame.sender_id);
        if is_new && self.peers.insert(frame.sender_id).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("peer table full, ignoring {}", frame.sender_id);
            self.reporter
                .diag(format_args!("peer table full, ignoring {}", frame.sender_id));
            return;
        }

        let peer = match self.peers.get_mut(frame.sender_id) {
            Some(peer) => peer,
            None => return,
        };

        peer.has_replied = true;
        peer.missed_slots = 0;
        peer.peer_tx_time = frame.tx_time;
        peer.rx_time = received.rx_time;

        let mut computed_range = None;
        for report in &frame.reports {
            if report.peer_id == self.config.node_id {
                match ranging::apply_report(peer, report) {
                    CounterOutcome::Consistent { range_eligible } => {
                        if range_eligible {
                            if let Some(meters) = ranging::compute_range_m(peer) {
                                peer.last_range_m = meters;
                                computed_range = Some(meters);
                            }
                        }
                    }
                    CounterOutcome::Resynced => {
                        self.reporter.diag(format_args!(
                            "counter resync requested by {}",
                            frame.sender_id
                        ));
                    }
                    CounterOutcome::Diverged => {
                        self.reporter.diag(format_args!(
                            "counter mismatch with {}, resyncing",
                            frame.sender_id
                        ));
                    }
                }
            } else if self.config.role == Role::Tag && report.last_range_m != 0.0 {
                // Relay ranges other pairs measured, for downstream
                // positioning. The initial zero means "not measured yet".
                self.reporter
                    .range(frame.sender_id, report.peer_id, report.last_range_m);
            }
        }

        // Prime the next cycle: the current frame becomes the previous
        // exchange.
        peer.prev_peer_tx_time = peer.peer_tx_time;
        peer.prev_rx_time = peer.rx_time;

        if let Some(meters) = computed_range {
            self.reporter
                .range(self.config.node_id, frame.sender_id, meters);
        }

        if is_new {
            self.mac.note_new_member(frame.sender_id);
        } else {
            self.mac.note_frame_from_member(frame.sender_id, rx_poll_time_us);
        }
    }

    fn handle_send_complete(&mut self, now_us: u64) {
        match self.radio.finish_transmit() {
            Ok(_) | Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(error)) => {
                // The frame most likely still went out (e.g. a late delayed
                // send); the schedule must keep moving either way.
                self.reporter
                    .diag(format_args!("transmit completed with error: {:?}", error));
            }
        }
        self.mac.note_sent(now_us);
    }

    /// Assembles and schedules our frame for the current slot
    ///
    /// The outbound frame is assembled in the same buffer the receive DMA
    /// writes into. A reception completing after assembly starts would be
    /// corrupt, so the pending receive flag is cleared after scheduling:
    /// one lost frame instead of a second buffer.
    fn transmit(&mut self, now_us: u64) {
        let tx_time = match self.radio.sys_time() {
            Ok(now) => now + self.config.timing.tx_lead(),
            Err(error) => {
                self.reporter
                    .diag(format_args!("failed to read radio time: {:?}", error));
                return;
            }
        };

        let mut frame = Frame::new(self.config.node_id, tx_time);
        for peer in self.peers.iter() {
            let report = PeerReport {
                peer_id: peer.id,
                tx_count: peer.tx_count,
                last_rx_time: peer.rx_time,
                last_range_m: peer.last_range_m,
            };
            // The report list and the peer table have the same capacity.
            if frame.push_report(report).is_err() {
                break;
            }
        }

        let len = match frame.encode(&mut self.buffer) {
            Ok(len) => len,
            Err(error) => {
                self.reporter
                    .diag(format_args!("failed to encode frame: {:?}", error));
                return;
            }
        };

        self.mac.begin_turn();
        if let Err(error) = self.radio.schedule_transmit(&self.buffer[..len], tx_time) {
            self.reporter
                .diag(format_args!("failed to schedule transmit: {:?}", error));
            self.mac.cancel_turn(now_us);
            return;
        }

        // The frame is on its way out with the counters it carries; commit
        // to them. Only peers we actually heard from since our last frame
        // advance, which is how a dropped frame surfaces as a mismatch.
        for peer in self.peers.iter_mut() {
            peer.tx_time = tx_time;
            if peer.has_replied {
                peer.tx_count = peer.tx_count.wrapping_add(1);
                peer.has_replied = false;
            }
        }

        // Shared-buffer mitigation: anything received while we were
        // assembling is void.
        let _ = self.flags.take_received();

        if self.config.role == Role::Tag {
            self.reporter.id(self.config.node_id);
        }
    }

    fn handle_slot_miss(&mut self, id: u8) {
        if id == DUMMY_ID {
            // The round-boundary gap elapsed; the round restarts.
            self.mac.skip_slot();
            return;
        }

        let missed = match self.peers.get_mut(id) {
            Some(peer) => {
                peer.missed_slots += 1;
                peer.missed_slots
            }
            None => {
                self.reporter
                    .diag(format_args!("expected transmitter {} is unknown", id));
                self.mac.skip_slot();
                return;
            }
        };

        if missed > self.config.eviction_threshold {
            #[cfg(feature = "defmt")]
            defmt::info!("evicting silent peer {}", id);
            self.peers.remove(id);
            self.mac.remove(id);
            self.reporter.removed(id);
        } else {
            self.mac.skip_slot();
        }
    }
}

impl<'a, R, W> fmt::Debug for RangingNode<'a, R, W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RangingNode {{ id: {}, state: {:?}, peers: {}, .. }}",
            self.config.node_id,
            self.mac.state(),
            self.peers.len(),
        )
    }
}
