//! Queueing discipline handles.
//!
//! Handles are `major:minor` pairs. A qdisc is addressed by its major number alone
//! (`5:`), a class within it by both (`5:1`).

use std::fmt;

/// Handle of the bandwidth-limiting qdisc.
pub const BANDWIDTH: TcHandle = TcHandle::new(5, 0);
/// The bandwidth stage's class (or, for tbf, its single queue) that later stages attach to.
pub const BANDWIDTH_CLASS: TcHandle = TcHandle::new(5, 1);
/// Handle of the RED qdisc.
pub const AQM: TcHandle = TcHandle::new(6, 0);
/// Handle of the netem qdisc.
pub const NETEM: TcHandle = TcHandle::new(10, 0);
/// Where a qdisc below netem would attach.
pub const NETEM_CLASS: TcHandle = TcHandle::new(10, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcHandle {
    pub major: u16,
    pub minor: u16,
}

impl TcHandle {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// The 32-bit form used by netlink, major in the upper half.
    pub const fn as_u32(&self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }
}

impl fmt::Display for TcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}:", self.major)
        } else {
            write!(f, "{}:{}", self.major, self.minor)
        }
    }
}

/// Where the next qdisc in a chain attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Parent {
    #[default]
    Root,
    Handle(TcHandle),
}

impl Parent {
    pub const fn handle(&self) -> Option<TcHandle> {
        match self {
            Self::Root => None,
            Self::Handle(handle) => Some(*handle),
        }
    }
}

/// Renders the `tc` selector: `root` or `parent 5:1`.
impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Handle(handle) => write!(f, "parent {handle}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(BANDWIDTH.to_string(), "5:");
        assert_eq!(BANDWIDTH_CLASS.to_string(), "5:1");
        assert_eq!(Parent::Handle(NETEM_CLASS).to_string(), "parent 10:1");
        assert_eq!(Parent::Root.to_string(), "root");
        assert_eq!(NETEM_CLASS.as_u32(), 0x000A_0001);
    }
}
