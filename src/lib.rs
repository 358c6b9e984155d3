//! Decentralized two-way ranging over UWB
//!
//! This crate implements a self-organizing ring of UWB nodes that
//! continuously measure the distance to every peer in radio range, using
//! asymmetric double-sided two-way ranging (DS-TWR). Every node is both
//! initiator and responder: members take turns broadcasting in ascending-ID
//! order, newcomers join at the round boundary, and nodes that fall silent
//! are evicted by timeout. There is no central coordinator.
//!
//! The radio itself is out of scope: any driver that can timestamp
//! transmissions and receptions with the 40-bit system clock and transmit
//! at a scheduled instant can sit behind the [`radio::UwbRadio`] trait. The
//! [`dw1000`] driver crate is the natural companion.
//!
//! The typical firmware main loop is:
//!
//! 1. Hook the driver's send-complete and receive-complete interrupts up to
//!    a `static` [`radio::RadioIrqFlags`].
//! 2. Build a [`node::RangingNode`] from a [`configs::NodeConfig`], the
//!    driver, and a serial console.
//! 3. Call [`node::RangingNode::poll`] forever with a monotonic
//!    microsecond clock.
//!
//! Measured ranges come out over the serial console as `!range` lines; see
//! the [`report`] module for the line grammar.
//!
//! [`dw1000`]: https://crates.io/crates/dw1000

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

pub mod configs;
pub mod frame;
pub mod mac;
pub mod node;
pub mod peer;
pub mod radio;
pub mod ranging;
pub mod report;
pub mod time;

pub use crate::configs::{NodeConfig, Role, DUMMY_ID, MAX_NODES};
pub use crate::mac::RingState;
pub use crate::node::RangingNode;
pub use crate::radio::{RadioIrqFlags, UwbRadio};
pub use crate::time::{Duration, Instant, TIME_MAX};
