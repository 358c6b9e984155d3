//! Property tests for the arithmetic core: timestamp algebra, the wire
//! codec, and the DS-TWR formula.

use proptest::collection::vec;
use proptest::prelude::*;

use twr_ring::frame::{Frame, PeerReport, MAX_FRAME_LEN};
use twr_ring::ranging;
use twr_ring::time::{Duration, Instant, TIME_MAX};

fn instant() -> impl Strategy<Value = Instant> {
    (0..=TIME_MAX).prop_map(|value| Instant::new(value).unwrap())
}

fn peer_report() -> impl Strategy<Value = PeerReport> {
    (1u8..=254, any::<u8>(), instant(), -100.0f32..1000.0).prop_map(
        |(peer_id, tx_count, last_rx_time, last_range_m)| PeerReport {
            peer_id,
            tx_count,
            last_rx_time,
            last_range_m,
        },
    )
}

fn frame() -> impl Strategy<Value = Frame> {
    (
        1u8..=254,
        instant(),
        vec(peer_report(), 0..=twr_ring::MAX_NODES),
    )
        .prop_map(|(sender_id, tx_time, reports)| {
            let mut frame = Frame::new(sender_id, tx_time);
            for report in reports {
                frame.push_report(report).unwrap();
            }
            frame
        })
}

/// Interprets `base + offset` as a reading of a clock whose phase is
/// `offset`, wrapped to 40 bits.
fn at(base: u64, offset: u64) -> Instant {
    Instant::new((base + offset) % (TIME_MAX + 1)).unwrap()
}

proptest! {
    #[test]
    fn timestamp_round_trips_through_its_wire_encoding(t in instant()) {
        prop_assert_eq!(Instant::from_le_bytes(t.to_le_bytes()), t);
    }

    #[test]
    fn duration_since_is_the_modular_difference(a in 0..=TIME_MAX, b in 0..=TIME_MAX) {
        let later = Instant::new(a).unwrap();
        let earlier = Instant::new(b).unwrap();

        let expected = (a + TIME_MAX + 1 - b) % (TIME_MAX + 1);
        prop_assert_eq!(later.duration_since(earlier).value(), expected);
    }

    #[test]
    fn codec_is_idempotent(f in frame()) {
        let mut buf = [0; MAX_FRAME_LEN];
        let len = f.encode(&mut buf).unwrap();
        prop_assert_eq!(Frame::decode(&buf[..len]).unwrap(), f);
    }

    /// With ideal clocks the formula recovers the true time of flight
    /// exactly, whatever the reply times and clock phases are.
    #[test]
    fn ds_twr_is_exact_without_skew(
        tof in 1u64..213_000,
        reply1 in 1u64..50_000_000,
        reply2 in 1u64..50_000_000,
        ours in 0..=TIME_MAX,
        theirs in 0..=TIME_MAX,
    ) {
        // Reconstruct the six timestamps of a paired exchange: the peer
        // transmitted at its local 0, we heard it one flight later, replied
        // after `reply1`, and so on. `ours`/`theirs` are arbitrary clock
        // phases, exercising the 40-bit wrap.
        let prev_peer_tx = at(0, theirs);
        let prev_rx = at(tof, ours);
        let tx = at(tof + reply1, ours);
        let peer_rx = at(2 * tof + reply1, theirs);
        let peer_tx = at(2 * tof + reply1 + reply2, theirs);
        let rx = at(3 * tof + reply1 + reply2, ours);

        let estimate = ranging::time_of_flight(
            peer_rx.duration_since(prev_peer_tx),
            tx.duration_since(prev_rx),
            rx.duration_since(tx),
            peer_tx.duration_since(peer_rx),
        );

        prop_assert_eq!(estimate.map(|d| d.value()), Some(tof));
    }

    /// A relative frequency error ε between the two clocks perturbs the
    /// estimate by O(ε·τ), independent of the (much larger) reply times.
    #[test]
    fn ds_twr_error_is_first_order_in_skew(
        tof in 10_000u64..213_000,
        reply1 in 1u64..50_000_000,
        reply2 in 1u64..50_000_000,
        skew_ppm in -50i64..=50,
    ) {
        // True durations on an ideal clock.
        let round1 = reply1 + 2 * tof;
        let round2 = reply2 + 2 * tof;

        // The peer's clock runs fast or slow by `skew_ppm`; the durations it
        // measured and reported are scaled accordingly.
        let scaled = |d: u64| (d as i64 + d as i64 * skew_ppm / 1_000_000) as u64;

        let estimate = ranging::time_of_flight(
            Duration::new(scaled(round1)).unwrap(),
            Duration::new(reply1).unwrap(),
            Duration::new(round2).unwrap(),
            Duration::new(scaled(reply2)).unwrap(),
        )
        .unwrap();

        let error = (estimate.value() as i64 - tof as i64).abs();
        let bound = tof as i64 * skew_ppm.abs() / 1_000_000 + 8;
        prop_assert!(
            error <= bound,
            "error {} exceeds bound {} (tof {}, skew {} ppm, replies {}/{})",
            error, bound, tof, skew_ppm, reply1, reply2,
        );
    }
}
