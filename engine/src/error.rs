use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use distributed::DistErr;
use machine_learning::MlErr;

/// The engine module's result type.
pub type Result<T> = std::result::Result<T, EngineErr>;

#[derive(Debug)]
pub enum EngineErr {
    Ml(MlErr),
    Dist(DistErr),
    Io(io::Error),
    Json(serde_json::Error),
    MissingCheckpoint(PathBuf),
    MissingComponent(String),
    DuplicateComponent(String),
    EmptyLoader,
}

impl Display for EngineErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErr::Ml(_) => write!(f, "a model or data operation failed"),
            EngineErr::Dist(_) => write!(f, "a collective operation failed"),
            EngineErr::Io(_) => write!(f, "io error"),
            EngineErr::Json(_) => write!(f, "json error"),
            EngineErr::MissingCheckpoint(path) => {
                write!(f, "checkpoint {} is not found", path.display())
            }
            EngineErr::MissingComponent(name) => {
                write!(f, "the checkpoint has no component named {name:?}")
            }
            EngineErr::DuplicateComponent(name) => {
                write!(f, "component {name:?} is already in the checkpoint")
            }
            EngineErr::EmptyLoader => write!(f, "the loader yields no batches"),
        }
    }
}

impl Error for EngineErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineErr::Ml(e) => Some(e),
            EngineErr::Dist(e) => Some(e),
            EngineErr::Io(e) => Some(e),
            EngineErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for EngineErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<DistErr> for EngineErr {
    fn from(value: DistErr) -> Self {
        Self::Dist(value)
    }
}

impl From<io::Error> for EngineErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EngineErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(err: &dyn Error) -> Vec<String> {
        let mut out = vec![err.to_string()];
        let mut source = err.source();
        while let Some(e) = source {
            out.push(e.to_string());
            source = e.source();
        }
        out
    }

    #[test]
    fn wrapped_errors_are_printed_once() {
        let err = EngineErr::Io(io::Error::other("Is a directory"));
        assert_eq!(chain(&err), ["io error", "Is a directory"]);

        let err = EngineErr::Dist(DistErr::Io(io::Error::other("broken pipe")));
        let chain = chain(&err);
        assert_eq!(chain.iter().filter(|m| m.contains("broken pipe")).count(), 1);
        assert_eq!(chain.last().map(String::as_str), Some("broken pipe"));
    }
}
