//! The line-oriented reporting channel
//!
//! Downstream tooling reads the serial output of a node and picks out the
//! machine-readable lines, which all start with `!`:
//!
//! ```text
//! !range <from_id> <to_id> <meters>
//! !id <our_id>
//! !remove <peer_id>
//! ```
//!
//! Everything else on the channel is diagnostic and may change freely.

use core::fmt::{self, Write};

/// Emits protocol lines over any `fmt::Write` sink
///
/// Write errors are swallowed: a wedged console must not stall the ring.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl<W> Reporter<W>
where
    W: Write,
{
    /// Wraps a serial sink
    pub fn new(out: W) -> Self {
        Reporter { out }
    }

    /// One observed pairwise range, locally computed or relayed
    pub fn range(&mut self, from_id: u8, to_id: u8, meters: f32) {
        let _ = writeln!(self.out, "!range {} {} {}", from_id, to_id, meters);
    }

    /// Announces our own ID; tags emit this once per transmission
    pub fn id(&mut self, our_id: u8) {
        let _ = writeln!(self.out, "!id {}", our_id);
    }

    /// Announces the eviction of a silent peer
    pub fn removed(&mut self, peer_id: u8) {
        let _ = writeln!(self.out, "!remove {}", peer_id);
    }

    /// Free-form diagnostic line
    pub fn diag(&mut self, args: fmt::Arguments) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.write_char('\n');
    }

    /// Gives access to the underlying sink
    pub fn sink(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_lines() {
        let mut reporter = Reporter::new(heapless::String::<128>::new());
        reporter.range(1, 2, 3.75);
        reporter.id(5);
        reporter.removed(3);
        reporter.diag(format_args!("peer table full, ignoring {}", 9));

        assert_eq!(
            reporter.sink().as_str(),
            "!range 1 2 3.75\n!id 5\n!remove 3\npeer table full, ignoring 9\n",
        );
    }
}
