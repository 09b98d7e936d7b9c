use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use machine_learning::MlErr;

/// The distributed module's result type.
pub type Result<T> = std::result::Result<T, DistErr>;

/// Failures of the process group, its collectives and its launcher.
#[derive(Debug)]
pub enum DistErr {
    Io(io::Error),
    Connect {
        addr: String,
        source: io::Error,
    },
    Handshake(String),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    UnexpectedMessage {
        op: &'static str,
        got: &'static str,
    },
    /// The coordinator rejected a collective, the detail is its own error.
    Remote(String),
    InvalidLaunch(String),
    /// A distributed invariant does not hold, e.g. a wrong rank sum.
    Inconsistent {
        what: &'static str,
        got: String,
        expected: String,
    },
    /// A participant of an in process group left before the collective.
    PeerLeft,
    Join(tokio::task::JoinError),
    Ml(MlErr),
}

impl Display for DistErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistErr::Io(_) => write!(f, "io error"),
            DistErr::Connect { addr, .. } => write!(f, "could not connect to {addr}"),
            DistErr::Handshake(detail) => write!(f, "handshake failed: {detail}"),
            DistErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            DistErr::UnexpectedMessage { op, got } => {
                write!(f, "unexpected message during {op}: got {got}")
            }
            DistErr::Remote(detail) => write!(f, "the coordinator failed: {detail}"),
            DistErr::InvalidLaunch(detail) => write!(f, "invalid launch: {detail}"),
            DistErr::Inconsistent {
                what,
                got,
                expected,
            } => write!(f, "inconsistent {what}: got {got}, expected {expected}"),
            DistErr::PeerLeft => write!(f, "a participant left the group"),
            DistErr::Join(_) => write!(f, "participant task failed"),
            DistErr::Ml(_) => write!(f, "a model or data operation failed"),
        }
    }
}

impl Error for DistErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DistErr::Io(e) => Some(e),
            DistErr::Connect { source, .. } => Some(source),
            DistErr::Join(e) => Some(e),
            DistErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DistErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<tokio::task::JoinError> for DistErr {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Join(value)
    }
}

impl From<MlErr> for DistErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<DistErr> for io::Error {
    fn from(value: DistErr) -> Self {
        match value {
            DistErr::Io(e) => e,
            e => io::Error::other(e),
        }
    }
}
