// server type definitions

pub type ConnId = u64;

/// Lifecycle of a single client session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Active,
    Closed,
}

impl ConnState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnState::Connecting,
            1 => ConnState::Active,
            _ => ConnState::Closed,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConnState::Connecting => 0,
            ConnState::Active => 1,
            ConnState::Closed => 2,
        }
    }
}
