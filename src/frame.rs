//! The broadcast ranging frame and its wire codec
//!
//! Every transmission in the ring is one [`Frame`]: the sender's ID, the
//! timestamp the frame leaves the antenna, and one report per peer the
//! sender currently knows. Parsing and serialization are pure functions
//! over caller-owned byte buffers; nothing here allocates.
//!
//! Wire layout:
//!
//! ```text
//! offset  size  field
//!  0      1     sender_id
//!  1      5     sender send timestamp (little-endian 40-bit, radio ticks)
//!  6..    -     zero or more 11-byte per-peer reports:
//!                 + 0  1  peer_id
//!                 + 1  1  tx_count
//!                 + 2  5  timestamp of last receive from peer_id
//!                 + 7  4  last computed range in meters (IEEE-754 single)
//! ```

use heapless::Vec;

use crate::configs::MAX_NODES;
use crate::time::Instant;

/// Maximum frame length the radio can carry
pub const MAX_FRAME_LEN: usize = 256;

/// Length of the fixed frame header
pub const HEADER_LEN: usize = 6;

/// Length of one per-peer report
pub const REPORT_LEN: usize = 11;

/// An error that can occur while encoding or decoding a frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The buffer is shorter than the 6-byte frame header
    TooShort,
    /// The bytes after the header are not a whole number of reports
    ///
    /// This is what a reception that was clobbered by outbound frame
    /// assembly typically looks like.
    Truncated,
    /// The frame carries more reports than this build can store
    TooManyReports,
    /// The output buffer is too small for the encoded frame
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },
}

/// What one ring member tells another about their shared exchange
///
/// A report is addressed to `peer_id`; every other receiver relays or
/// ignores it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerReport {
    /// The peer this report is addressed to
    pub peer_id: u8,
    /// The sender's exchange counter for this peer
    pub tx_count: u8,
    /// When the sender last received a frame from `peer_id` (sender's clock)
    pub last_rx_time: Instant,
    /// The last range the sender computed to `peer_id`, in meters
    ///
    /// Zero until the first successful computation.
    pub last_range_m: f32,
}

/// One broadcast ranging frame
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// The transmitting node
    pub sender_id: u8,
    /// When the frame leaves the sender's antenna (sender's clock)
    pub tx_time: Instant,
    /// One report per peer the sender knows
    pub reports: Vec<PeerReport, MAX_NODES>,
}

impl Frame {
    /// Creates a frame with no reports
    pub fn new(sender_id: u8, tx_time: Instant) -> Self {
        Frame {
            sender_id,
            tx_time,
            reports: Vec::new(),
        }
    }

    /// Appends a report to the frame
    pub fn push_report(&mut self, report: PeerReport) -> Result<(), FrameError> {
        self.reports
            .push(report)
            .map_err(|_| FrameError::TooManyReports)
    }

    /// The number of bytes `encode` will write
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.reports.len() * REPORT_LEN
    }

    /// Parses a frame from a received buffer
    ///
    /// Rejects buffers shorter than the header and buffers whose tail is not
    /// a whole number of reports. Does not allocate.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::TooShort);
        }

        let body = &buf[HEADER_LEN..];
        if body.len() % REPORT_LEN != 0 {
            return Err(FrameError::Truncated);
        }

        let mut frame = Frame::new(buf[0], read_timestamp(&buf[1..6]));
        for chunk in body.chunks_exact(REPORT_LEN) {
            let mut range_bytes = [0; 4];
            range_bytes.copy_from_slice(&chunk[7..11]);

            frame.push_report(PeerReport {
                peer_id: chunk[0],
                tx_count: chunk[1],
                last_rx_time: read_timestamp(&chunk[2..7]),
                // Host byte order; all ring members run on the same board
                // family.
                last_range_m: f32::from_ne_bytes(range_bytes),
            })?;
        }

        Ok(frame)
    }

    /// Serializes the frame into a caller-owned buffer
    ///
    /// Returns the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(FrameError::BufferTooSmall { required_len: len });
        }

        buf[0] = self.sender_id;
        buf[1..6].copy_from_slice(&self.tx_time.to_le_bytes());

        for (report, chunk) in self
            .reports
            .iter()
            .zip(buf[HEADER_LEN..len].chunks_exact_mut(REPORT_LEN))
        {
            chunk[0] = report.peer_id;
            chunk[1] = report.tx_count;
            chunk[2..7].copy_from_slice(&report.last_rx_time.to_le_bytes());
            chunk[7..11].copy_from_slice(&report.last_range_m.to_ne_bytes());
        }

        Ok(len)
    }
}

fn read_timestamp(bytes: &[u8]) -> Instant {
    let mut raw = [0; 5];
    raw.copy_from_slice(bytes);
    Instant::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(peer_id: u8) -> PeerReport {
        PeerReport {
            peer_id,
            tx_count: 3,
            last_rx_time: Instant::new(0x12_3456_7890).unwrap(),
            last_range_m: 2.5,
        }
    }

    #[test]
    fn round_trip() {
        let mut frame = Frame::new(7, Instant::new(0xab_cdef_0123).unwrap());
        frame.push_report(report(1)).unwrap();
        frame.push_report(report(2)).unwrap();

        let mut buf = [0; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf).unwrap();
        assert_eq!(len, HEADER_LEN + 2 * REPORT_LEN);

        let decoded = Frame::decode(&buf[..len]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_frame_is_just_the_header() {
        let frame = Frame::new(3, Instant::default());
        let mut buf = [0; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf).unwrap();
        assert_eq!(len, HEADER_LEN);
        assert_eq!(Frame::decode(&buf[..len]).unwrap(), frame);
    }

    #[test]
    fn rejects_short_buffers() {
        assert_eq!(Frame::decode(&[1, 2, 3, 4, 5]), Err(FrameError::TooShort));
    }

    #[test]
    fn rejects_partial_reports() {
        let frame = Frame::new(3, Instant::default());
        let mut buf = [0; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf).unwrap();
        assert_eq!(
            Frame::decode(&buf[..len + 5]),
            Err(FrameError::Truncated),
        );
    }

    #[test]
    fn rejects_oversized_report_lists() {
        let buf = [0; MAX_FRAME_LEN];
        let len = HEADER_LEN + (MAX_NODES + 1) * REPORT_LEN;
        assert_eq!(
            Frame::decode(&buf[..len]),
            Err(FrameError::TooManyReports),
        );
    }

    #[test]
    fn encode_needs_a_large_enough_buffer() {
        let mut frame = Frame::new(9, Instant::default());
        frame.push_report(report(1)).unwrap();

        let mut buf = [0; HEADER_LEN];
        assert_eq!(
            frame.encode(&mut buf),
            Err(FrameError::BufferTooSmall {
                required_len: HEADER_LEN + REPORT_LEN,
            }),
        );
    }

    #[test]
    fn max_occupancy_frame_fits_the_radio() {
        let mut frame = Frame::new(1, Instant::default());
        for id in 0..MAX_NODES as u8 {
            frame.push_report(report(id + 2)).unwrap();
        }
        assert!(frame.encoded_len() <= MAX_FRAME_LEN);
    }
}
