//! Configuration for a ranging node
//!
//! This module houses the constants and datastructures that control how a
//! node behaves in the ring: its identity, its role, and the MAC timing
//! derived from the declared radio mode.

use crate::time::Duration;

/// Maximum number of peers a node keeps state for
///
/// This governs all storage in the crate: the peer table, the transmission
/// ring and the per-frame report list are all sized from it.
pub const MAX_NODES: usize = 6;

/// The reserved ring sentinel
///
/// `DUMMY_ID` marks the end-of-round boundary in the transmission order. It
/// is never assigned to a node; valid node IDs are 1 to 254.
pub const DUMMY_ID: u8 = 255;

/// Capacity of the transmission ring: all peers, ourselves, the sentinel
pub const TX_ORDER_CAP: usize = MAX_NODES + 2;

/// The role of a node in the ranging network
///
/// Tags are the nodes whose position interests us; anchors are placed in
/// known locations. The role is derived from the node ID and affects only
/// the antenna-delay calibration and whether ranges relayed by peers are
/// re-emitted over the serial channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Fixed infrastructure node (IDs 1 to 4)
    Anchor,
    /// Mobile node (IDs 5 and up)
    Tag,
}

impl Role {
    /// Derives the role from a node ID
    pub fn from_id(id: u8) -> Self {
        if id < 5 {
            Role::Anchor
        } else {
            Role::Tag
        }
    }

    /// Returns the recommended (RX, TX) antenna delay for this role
    ///
    /// These are hardcoded calibration values in the style of the
    /// dwm1001-examples repository. Ideally they would be determined using
    /// the proper calibration procedure, but they are good enough to get
    /// meter-level results.
    pub fn recommended_antenna_delay(&self) -> (u16, u16) {
        match self {
            Role::Anchor => (16456, 16300),
            Role::Tag => (16496, 16340),
        }
    }
}

/// The bitrate at which frames are transmitted
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitRate {
    /// 110 kilobits per second
    Kbps110,
    /// 850 kilobits per second
    Kbps850,
    /// 6.8 megabits per second
    Kbps6800,
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::Kbps110
    }
}

impl BitRate {
    /// Bits per second
    pub fn bits_per_second(&self) -> u32 {
        match self {
            BitRate::Kbps110 => 110_000,
            BitRate::Kbps850 => 850_000,
            BitRate::Kbps6800 => 6_800_000,
        }
    }

    /// Approximate airtime of the PHY header at this bitrate, in µs
    pub fn phy_header_us(&self) -> u32 {
        // The PHY header is 21 symbols; at 110 kbps it is sent at the data
        // rate, at the higher rates at 850 kbps.
        match self {
            BitRate::Kbps110 => 191,
            BitRate::Kbps850 | BitRate::Kbps6800 => 25,
        }
    }
}

/// The length of the preamble
///
/// Longer preambles improve the reception quality and thus range. This
/// comes at the cost of longer transmission times and thus power
/// consumption and bandwidth use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PreambleLength {
    /// 64 symbols of preamble
    Symbols64,
    /// 128 symbols of preamble
    Symbols128,
    /// 256 symbols of preamble
    Symbols256,
    /// 512 symbols of preamble
    Symbols512,
    /// 1024 symbols of preamble
    Symbols1024,
    /// 2048 symbols of preamble
    Symbols2048,
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength::Symbols2048
    }
}

impl PreambleLength {
    /// Number of preamble symbols
    pub fn symbols(&self) -> u32 {
        match self {
            PreambleLength::Symbols64 => 64,
            PreambleLength::Symbols128 => 128,
            PreambleLength::Symbols256 => 256,
            PreambleLength::Symbols512 => 512,
            PreambleLength::Symbols1024 => 1024,
            PreambleLength::Symbols2048 => 2048,
        }
    }

    /// Approximate preamble airtime in µs
    ///
    /// One preamble symbol takes just under a microsecond on the air.
    pub fn airtime_us(&self) -> u32 {
        self.symbols()
    }
}

/// MAC timing derived from the declared radio mode
///
/// Computed from the preamble length and bitrate rather than hardcoded, so
/// changing the radio mode keeps the MAC consistent.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacTiming {
    /// Lead time between scheduling a transmission and its scheduled instant
    pub tx_lead_us: u32,
    /// Base slot timeout before the expected transmitter is assumed lost
    pub slot_timeout_base_us: u32,
    /// Additional slot timeout per device currently in the ring
    pub slot_timeout_per_device_us: u32,
}

/// Margin for assembling the frame and programming the radio over the host
/// bus, before the scheduled transmit instant
const HOST_MARGIN_US: u32 = 1_500;

impl MacTiming {
    /// Derives the MAC timing for a radio mode
    pub fn for_mode(preamble: PreambleLength, bitrate: BitRate) -> Self {
        // Worst-case frame: full header plus a report per peer, plus the
        // two-octet CRC the radio appends.
        let frame_bits = (crate::frame::HEADER_LEN
            + MAX_NODES * crate::frame::REPORT_LEN
            + 2) as u32
            * 8;
        let payload_us = frame_bits * 1_000_000 / bitrate.bits_per_second();
        let airtime_us = preamble.airtime_us() + bitrate.phy_header_us() + payload_us;

        let tx_lead_us = airtime_us + HOST_MARGIN_US;
        MacTiming {
            tx_lead_us,
            // A missed slot is only declared once a full scheduled
            // transmission plus its airtime could have happened.
            slot_timeout_base_us: 2 * tx_lead_us,
            slot_timeout_per_device_us: airtime_us / 2,
        }
    }

    /// The scheduled-transmit lead time as a radio-tick duration
    pub fn tx_lead(&self) -> Duration {
        // The lead is a few ms at most, far below the 40-bit limit.
        Duration::from_micros(self.tx_lead_us).unwrap()
    }

    /// The slot timeout for a ring currently holding `num_devices` peers
    pub fn slot_timeout_us(&self, num_devices: usize) -> u64 {
        self.slot_timeout_base_us as u64
            + num_devices as u64 * self.slot_timeout_per_device_us as u64
    }
}

impl Default for MacTiming {
    fn default() -> Self {
        MacTiming::for_mode(PreambleLength::default(), BitRate::default())
    }
}

/// Static configuration of one ranging node
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// This node's identifier (1 to 254)
    pub node_id: u8,
    /// The network identifier shared by all ring members
    pub network_id: u16,
    /// The node's role, normally derived from the ID
    pub role: Role,
    /// Consecutive missed slots after which a peer is dropped
    pub eviction_threshold: u8,
    /// MAC timing for the radio mode in use
    pub timing: MacTiming,
}

impl NodeConfig {
    /// Creates a configuration with the default network id, role derived
    /// from the node id, and timing for the default radio mode
    pub fn new(node_id: u8) -> Self {
        NodeConfig {
            node_id,
            network_id: 0x0d57,
            role: Role::from_id(node_id),
            eviction_threshold: 5,
            timing: MacTiming::default(),
        }
    }

    /// How long a node stays silent after boot, in µs
    ///
    /// Long enough for every possible ring member to take a turn, so a
    /// booting node can observe a full round before speaking.
    pub fn startup_silence_us(&self) -> u64 {
        MAX_NODES as u64 * 100_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_is_derived_from_id() {
        assert_eq!(Role::from_id(1), Role::Anchor);
        assert_eq!(Role::from_id(4), Role::Anchor);
        assert_eq!(Role::from_id(5), Role::Tag);
        assert_eq!(Role::from_id(254), Role::Tag);
    }

    #[test]
    fn longer_preamble_needs_longer_lead() {
        let short = MacTiming::for_mode(PreambleLength::Symbols64, BitRate::Kbps6800);
        let long = MacTiming::for_mode(PreambleLength::Symbols2048, BitRate::Kbps110);
        assert!(long.tx_lead_us > short.tx_lead_us);
        assert!(long.slot_timeout_base_us > short.slot_timeout_base_us);
    }

    #[test]
    fn slot_timeout_grows_with_ring() {
        let timing = MacTiming::default();
        assert!(timing.slot_timeout_us(4) > timing.slot_timeout_us(1));
    }
}
