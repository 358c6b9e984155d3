//! Per-peer ranging state and the fixed-capacity peer table

use heapless::Vec;

use crate::configs::MAX_NODES;
use crate::time::Instant;

/// Everything a node tracks about one neighbor
///
/// The six timestamps cover one paired exchange: the `prev_*` pair comes
/// from the peer's previous frame, the other four from the current frame
/// and our own transmission in between. Timestamps prefixed `peer_` were
/// captured on the peer's clock and reported over the air; the rest are
/// local captures.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Peer {
    /// The peer's identifier
    pub id: u8,
    /// Shared monotone exchange counter (see the `ranging` module)
    pub tx_count: u8,
    /// Consecutive slot timeouts attributed to this peer
    pub missed_slots: u8,
    /// Whether the peer has transmitted since our last transmission
    pub has_replied: bool,
    /// When the peer sent its previous frame (peer's clock)
    pub prev_peer_tx_time: Instant,
    /// When we received the peer's previous frame (our clock)
    pub prev_rx_time: Instant,
    /// When our last frame left our antenna (our clock)
    pub tx_time: Instant,
    /// When the peer received our last frame (peer's clock)
    pub peer_rx_time: Instant,
    /// When the peer sent its current frame (peer's clock)
    pub peer_tx_time: Instant,
    /// When we received the peer's current frame (our clock)
    pub rx_time: Instant,
    /// The last range we computed to this peer, in meters
    pub last_range_m: f32,
}

impl Peer {
    /// Creates the state for a freshly discovered peer
    pub fn new(id: u8) -> Self {
        Peer {
            id,
            tx_count: 1,
            missed_slots: 0,
            has_replied: false,
            prev_peer_tx_time: Instant::default(),
            prev_rx_time: Instant::default(),
            tx_time: Instant::default(),
            peer_rx_time: Instant::default(),
            peer_tx_time: Instant::default(),
            rx_time: Instant::default(),
            last_range_m: 0.0,
        }
    }
}

/// The peer table is at capacity
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableFull;

/// Fixed-capacity mapping from peer ID to ranging state
///
/// Backed by an array of [`MAX_NODES`] records and an occupancy counter.
/// Removal compacts by swapping the last entry into the vacated slot, so
/// iteration order is unspecified; the transmission order lives in the MAC,
/// not here.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Vec<Peer, MAX_NODES>,
}

impl PeerTable {
    /// Creates an empty table
    pub fn new() -> Self {
        PeerTable { peers: Vec::new() }
    }

    /// Number of peers currently tracked
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table holds no peers
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether a peer with this ID is tracked
    pub fn contains(&self, id: u8) -> bool {
        self.get(id).is_some()
    }

    /// Looks up a peer by ID
    pub fn get(&self, id: u8) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    /// Looks up a peer by ID, mutably
    pub fn get_mut(&mut self, id: u8) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|peer| peer.id == id)
    }

    /// Adds a record for a new peer
    ///
    /// The caller must ensure the ID is not already present. Fails when the
    /// table is at capacity.
    pub fn insert(&mut self, id: u8) -> Result<&mut Peer, TableFull> {
        debug_assert!(!self.contains(id));

        self.peers.push(Peer::new(id)).map_err(|_| TableFull)?;

        // We just pushed, so the table can't be empty.
        Ok(self.peers.last_mut().unwrap())
    }

    /// Removes a peer, compacting the storage
    ///
    /// Returns whether the peer was present.
    pub fn remove(&mut self, id: u8) -> bool {
        match self.peers.iter().position(|peer| peer.id == id) {
            Some(index) => {
                self.peers.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Iterates over all tracked peers
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Iterates over all tracked peers, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.iter_mut()
    }
}
