//! Exchange accounting and the double-sided two-way ranging computation
//!
//! Two ring members never acknowledge each other's frames directly. Instead
//! both sides advance a shared 8-bit counter on every successful exchange;
//! a dropped frame shows up as a counter mismatch on the next reception and
//! the pair resynchronizes without outside help.
//!
//! Once two consecutive exchanges are on file, the four reply/round-trip
//! durations they span feed the asymmetric DS-TWR formula, which cancels
//! first-order clock offset between the two nodes.

use crate::frame::PeerReport;
use crate::peer::Peer;
use crate::time::Duration;

/// Lower bound of the plausible range window, in meters
const MIN_PLAUSIBLE_M: f32 = -10.0;

/// Upper bound of the plausible range window, in meters
const MAX_PLAUSIBLE_M: f32 = 1000.0;

/// The result of running the counter protocol for one received report
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterOutcome {
    /// The peer signalled a desync; our counter was reset to 1
    Resynced,
    /// Both counters agree and have advanced
    Consistent {
        /// Whether a previous exchange is on file, making this exchange
        /// eligible for a range computation
        range_eligible: bool,
    },
    /// The counters diverged; our next transmission will carry the desync
    /// signal (a zero counter)
    Diverged,
}

/// Runs the counter protocol for a report addressed to us
///
/// Also records the peer-side receive timestamp the report carries, which
/// is one of the four current-exchange timestamps.
pub fn apply_report(peer: &mut Peer, report: &PeerReport) -> CounterOutcome {
    peer.peer_rx_time = report.last_rx_time;

    if report.tx_count == 0 {
        peer.tx_count = 1;
        return CounterOutcome::Resynced;
    }

    if report.tx_count == peer.tx_count {
        let range_eligible = peer.tx_count > 1;
        // An increment past 255 lands on the desync signal; the pair then
        // resynchronizes one exchange later and continues.
        peer.tx_count = peer.tx_count.wrapping_add(1);
        return CounterOutcome::Consistent { range_eligible };
    }

    peer.tx_count = 0;
    CounterOutcome::Diverged
}

/// Computes the time of flight from the four exchange durations
///
/// This is the formula from the DW1000 user manual, section 12.3.2, with
/// all products and the quotient in 64-bit space. Returns `None` when the
/// sanity gate rejects the inputs: each round trip must exceed its
/// embedded reply time, and the intermediate products must not overflow.
pub fn time_of_flight(
    round1: Duration,
    reply1: Duration,
    round2: Duration,
    reply2: Duration,
) -> Option<Duration> {
    if round1.value() <= reply1.value() || round2.value() <= reply2.value() {
        return None;
    }

    let rtt_product = round1.value().checked_mul(round2.value())?;
    let reply_product = reply1.value().checked_mul(reply2.value())?;

    // Four 40-bit values sum well within 64 bits. The gate above makes the
    // numerator non-negative and the denominator nonzero.
    let sum = round1.value() + round2.value() + reply1.value() + reply2.value();
    let tof = (rtt_product - reply_product) / sum;

    Duration::new(tof)
}

/// Computes the range to a peer from its current paired exchange, in meters
///
/// Returns `None` when the sanity gate rejects the timestamps or the result
/// falls outside the physically plausible window. Only accepted values are
/// ever reported.
pub fn compute_range_m(peer: &Peer) -> Option<f32> {
    let round1 = peer.peer_rx_time.duration_since(peer.prev_peer_tx_time);
    let reply1 = peer.tx_time.duration_since(peer.prev_rx_time);
    let round2 = peer.rx_time.duration_since(peer.tx_time);
    let reply2 = peer.peer_tx_time.duration_since(peer.peer_rx_time);

    let range = time_of_flight(round1, reply1, round2, reply2)?.as_meters();

    if !(MIN_PLAUSIBLE_M..MAX_PLAUSIBLE_M).contains(&range) {
        return None;
    }

    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PeerReport;
    use crate::time::{Instant, TIME_MAX};

    fn report(tx_count: u8) -> PeerReport {
        PeerReport {
            peer_id: 1,
            tx_count,
            last_rx_time: Instant::new(1_000).unwrap(),
            last_range_m: 0.0,
        }
    }

    #[test]
    fn zero_counter_resets_ours() {
        let mut peer = Peer::new(2);
        peer.tx_count = 7;
        assert_eq!(apply_report(&mut peer, &report(0)), CounterOutcome::Resynced);
        assert_eq!(peer.tx_count, 1);
    }

    #[test]
    fn matching_counters_advance() {
        let mut peer = Peer::new(2);
        assert_eq!(
            apply_report(&mut peer, &report(1)),
            CounterOutcome::Consistent {
                range_eligible: false,
            },
        );
        assert_eq!(peer.tx_count, 2);

        assert_eq!(
            apply_report(&mut peer, &report(2)),
            CounterOutcome::Consistent {
                range_eligible: true,
            },
        );
        assert_eq!(peer.tx_count, 3);
    }

    #[test]
    fn diverged_counters_zero_ours() {
        let mut peer = Peer::new(2);
        peer.tx_count = 4;
        assert_eq!(apply_report(&mut peer, &report(9)), CounterOutcome::Diverged);
        assert_eq!(peer.tx_count, 0);
    }

    #[test]
    fn report_timestamp_is_recorded() {
        let mut peer = Peer::new(2);
        apply_report(&mut peer, &report(1));
        assert_eq!(peer.peer_rx_time, Instant::new(1_000).unwrap());
    }

    /// Builds a peer whose timestamps encode an exchange with the given
    /// true time of flight, reply times, and per-clock start offsets.
    fn synthetic_exchange(tof: u64, reply1: u64, reply2: u64, ours: u64, theirs: u64) -> Peer {
        let at = |base: u64, offset: u64| {
            Instant::new((base + offset) % (TIME_MAX + 1)).unwrap()
        };

        let mut peer = Peer::new(2);
        // The peer transmitted at local time 0 (plus its clock offset); we
        // heard it one flight later, replied after `reply1`, and so on.
        peer.prev_peer_tx_time = at(0, theirs);
        peer.prev_rx_time = at(tof, ours);
        peer.tx_time = at(tof + reply1, ours);
        peer.peer_rx_time = at(2 * tof + reply1, theirs);
        peer.peer_tx_time = at(2 * tof + reply1 + reply2, theirs);
        peer.rx_time = at(3 * tof + reply1 + reply2, ours);
        peer
    }

    #[test]
    fn noise_free_exchange_recovers_the_true_tof() {
        // Asymmetric replies and wildly different clock phases.
        let peer = synthetic_exchange(4_266, 120_000, 743_000, 17, TIME_MAX - 3);

        let round1 = peer.peer_rx_time.duration_since(peer.prev_peer_tx_time);
        let reply1 = peer.tx_time.duration_since(peer.prev_rx_time);
        let round2 = peer.rx_time.duration_since(peer.tx_time);
        let reply2 = peer.peer_tx_time.duration_since(peer.peer_rx_time);

        let tof = time_of_flight(round1, reply1, round2, reply2).unwrap();
        assert_eq!(tof.value(), 4_266);
    }

    #[test]
    fn twenty_meters_is_twenty_meters() {
        // 20 m is roughly 4263 ticks of flight.
        let peer = synthetic_exchange(4_263, 80_000, 95_000, 0, 0);
        let range = compute_range_m(&peer).unwrap();
        assert!((range - 20.0).abs() < 0.05);
    }

    #[test]
    fn gate_rejects_reply_longer_than_round() {
        let mut peer = synthetic_exchange(4_263, 80_000, 95_000, 0, 0);
        // A reply that claims to be longer than its round trip is garbage.
        peer.tx_time = peer.rx_time + Duration::new(1).unwrap();
        assert_eq!(compute_range_m(&peer), None);
    }

    #[test]
    fn clamp_rejects_implausible_ranges() {
        // Nearly 5 km of flight computes fine but is not plausible.
        let peer = synthetic_exchange(1_000_000, 80_000, 95_000, 0, 0);
        assert_eq!(compute_range_m(&peer), None);
    }
}
