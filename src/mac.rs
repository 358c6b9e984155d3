//! The token-passing TDMA layer
//!
//! All live nodes take turns transmitting exactly once per round, in
//! strictly ascending ID order, with the sentinel [`DUMMY_ID`] marking the
//! round boundary. There is no explicit token: every node tracks whose turn
//! it is by watching the air, advances past silent members by timeout, and
//! uses the sentinel slot as the join window for newcomers.
//!
//! The state machine here is deliberately free of radio and clock
//! dependencies: the caller feeds in host microseconds and reception
//! events, and acts on the [`MacStep`] it gets back.

use heapless::Vec;

use crate::configs::{MacTiming, DUMMY_ID, TX_ORDER_CAP};

/// The lifecycle of the local node within the ring
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingState {
    /// Freshly booted; stay silent to avoid jamming an ongoing round
    StartUp,
    /// Listening for the round boundary before the first transmission
    EnteringNetwork,
    /// Steady state: transmitting once per round
    InTheRound,
}

/// What the event loop should do after advancing the MAC
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacStep {
    /// Nothing to do
    Idle,
    /// It is our slot: assemble and schedule a frame now
    Transmit,
    /// The expected transmitter failed its slot
    ///
    /// Carries the ID the ring expected. The caller decides between
    /// skipping the slot and evicting the peer, then calls [`Mac::skip_slot`]
    /// or [`Mac::remove`] accordingly.
    SlotMissed(u8),
}

/// The transmission-order ring and slot bookkeeping of one node
#[derive(Debug)]
pub struct Mac {
    node_id: u8,
    state: RingState,
    tx_order: Vec<u8, TX_ORDER_CAP>,
    expected_idx: usize,
    took_turn: bool,
    slot_timer_start_us: u64,
    silence_until_us: u64,
}

impl Mac {
    /// Creates the MAC for a freshly booted node
    ///
    /// The node observes the air for `startup_silence_us` before it takes
    /// part in the round.
    pub fn new(node_id: u8, now_us: u64, startup_silence_us: u64) -> Self {
        let mut tx_order = Vec::new();
        // The ring always holds the sentinel; capacity is at least one.
        tx_order.push(DUMMY_ID).unwrap();

        Mac {
            node_id,
            state: RingState::StartUp,
            tx_order,
            expected_idx: 0,
            took_turn: false,
            slot_timer_start_us: now_us,
            silence_until_us: now_us + startup_silence_us,
        }
    }

    /// The node's current lifecycle state
    pub fn state(&self) -> RingState {
        self.state
    }

    /// The transmission order, ascending, ending in the sentinel
    pub fn tx_order(&self) -> &[u8] {
        &self.tx_order
    }

    /// Index of the expected next transmitter within `tx_order`
    pub fn expected_idx(&self) -> usize {
        self.expected_idx
    }

    /// ID of the expected next transmitter
    pub fn expected_id(&self) -> u8 {
        self.tx_order[self.expected_idx]
    }

    /// Whether our own transmission for the current slot is in flight
    pub fn took_turn(&self) -> bool {
        self.took_turn
    }

    /// Runs the time-driven part of the state machine
    ///
    /// `num_peers` is the current peer-table occupancy; it scales the slot
    /// timeout with the ring size.
    pub fn advance(&mut self, now_us: u64, num_peers: usize, timing: &MacTiming) -> MacStep {
        match self.state {
            RingState::StartUp => {
                if now_us >= self.silence_until_us {
                    self.state = RingState::EnteringNetwork;
                    self.slot_timer_start_us = now_us;
                }
                return MacStep::Idle;
            }
            RingState::EnteringNetwork => {
                // The sentinel coming up means the round just ended; that
                // gap is the join window.
                if !self.took_turn && self.expected_id() == DUMMY_ID {
                    return MacStep::Transmit;
                }
            }
            RingState::InTheRound => {
                if !self.took_turn && self.expected_id() == self.node_id {
                    return MacStep::Transmit;
                }
            }
        }

        if !self.took_turn
            && now_us - self.slot_timer_start_us > timing.slot_timeout_us(num_peers)
        {
            self.slot_timer_start_us = now_us;
            let missed = self.expected_id();
            return MacStep::SlotMissed(missed);
        }

        MacStep::Idle
    }

    /// Marks the start of our own transmission for this slot
    ///
    /// While set, inbound processing is suppressed and no slot timeouts
    /// fire; [`Mac::note_sent`] clears it.
    pub fn begin_turn(&mut self) {
        self.took_turn = true;
    }

    /// Releases a turn whose transmission could not be started
    ///
    /// The slot stays ours, so the next `advance` retries the transmission.
    pub fn cancel_turn(&mut self, now_us: u64) {
        self.took_turn = false;
        self.slot_timer_start_us = now_us;
    }

    /// Handles our own send-complete event
    pub fn note_sent(&mut self, now_us: u64) {
        self.took_turn = false;
        self.slot_timer_start_us = now_us;

        match self.state {
            RingState::EnteringNetwork => {
                // The frame that just went out was our join announcement,
                // sent in the round-boundary gap. Enter the ring; the next
                // round starts at the top of the order.
                self.insert(self.node_id);
                self.state = RingState::InTheRound;
                self.expected_idx = 0;
            }
            RingState::InTheRound => {
                if self.expected_id() == self.node_id {
                    self.skip_slot();
                }
            }
            RingState::StartUp => {}
        }
    }

    /// Handles a frame from a node that is already part of the ring
    ///
    /// `rx_poll_time_us` must be captured before frame parsing begins, so
    /// that parsing time is not charged to the next transmitter's slot.
    pub fn note_frame_from_member(&mut self, sender: u8, rx_poll_time_us: u64) {
        if let Some(pos) = self.position(sender) {
            self.expected_idx = (pos + 1) % self.tx_order.len();
            self.slot_timer_start_us = rx_poll_time_us;
        }
    }

    /// Handles the first frame from a previously unknown node
    ///
    /// Inserts the newcomer into the ring and expects it to have used the
    /// round-boundary slot; the timer deliberately keeps running.
    pub fn note_new_member(&mut self, sender: u8) {
        self.insert(sender);
        self.expected_idx = self.tx_order.len() - 1;
    }

    /// Advances the expected-transmitter pointer by one slot
    pub fn skip_slot(&mut self) {
        self.expected_idx = (self.expected_idx + 1) % self.tx_order.len();
    }

    /// Inserts an ID into the ring at its sorted position
    ///
    /// Returns whether the ring changed. The sentinel compares greater than
    /// every valid ID, so it stays last.
    pub fn insert(&mut self, id: u8) -> bool {
        if self.position(id).is_some() {
            return false;
        }

        // Position of the first larger entry; the sentinel guarantees one
        // exists.
        let pos = match self.tx_order.iter().position(|&entry| entry > id) {
            Some(pos) => pos,
            None => return false,
        };

        if self.tx_order.push(id).is_err() {
            return false;
        }
        self.tx_order[pos..].rotate_right(1);

        if pos <= self.expected_idx {
            self.expected_idx += 1;
        }
        true
    }

    /// Removes an ID from the ring, keeping the pointer on the successor
    ///
    /// The sentinel cannot be removed. Returns whether the ID was present.
    pub fn remove(&mut self, id: u8) -> bool {
        if id == DUMMY_ID {
            return false;
        }
        let pos = match self.position(id) {
            Some(pos) => pos,
            None => return false,
        };

        self.tx_order[pos..].rotate_left(1);
        self.tx_order.pop();

        if self.expected_idx > pos {
            self.expected_idx -= 1;
        }
        self.expected_idx %= self.tx_order.len();
        true
    }

    fn position(&self, id: u8) -> Option<usize> {
        self.tx_order.iter().position(|&entry| entry == id)
    }
}
