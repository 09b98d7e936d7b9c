use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use distributed::DistErr;
use engine::EngineErr;
use machine_learning::MlErr;

/// The classifier module's result type.
pub type Result<T> = std::result::Result<T, ClassifierErr>;

#[derive(Debug)]
pub enum ClassifierErr {
    InvalidConfig(String),
    Engine(EngineErr),
    Dist(DistErr),
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl ClassifierErr {
    /// Formats the error followed by every error in its source chain.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();

        while let Some(e) = source {
            out.push_str(&format!("\n  caused by: {e}"));
            source = e.source();
        }

        out
    }
}

impl Display for ClassifierErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierErr::InvalidConfig(detail) => write!(f, "invalid configuration: {detail}"),
            ClassifierErr::Engine(_) => write!(f, "the training engine failed"),
            ClassifierErr::Dist(_) => write!(f, "the process group failed"),
            ClassifierErr::Ml(_) => write!(f, "a model or data operation failed"),
            ClassifierErr::Io(_) => write!(f, "an io operation failed"),
            ClassifierErr::Json(_) => write!(f, "a json operation failed"),
        }
    }
}

impl Error for ClassifierErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClassifierErr::InvalidConfig(_) => None,
            ClassifierErr::Engine(e) => Some(e),
            ClassifierErr::Dist(e) => Some(e),
            ClassifierErr::Ml(e) => Some(e),
            ClassifierErr::Io(e) => Some(e),
            ClassifierErr::Json(e) => Some(e),
        }
    }
}

impl From<EngineErr> for ClassifierErr {
    fn from(value: EngineErr) -> Self {
        Self::Engine(value)
    }
}

impl From<DistErr> for ClassifierErr {
    fn from(value: DistErr) -> Self {
        Self::Dist(value)
    }
}

impl From<MlErr> for ClassifierErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for ClassifierErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ClassifierErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ClassifierErr> for io::Error {
    fn from(value: ClassifierErr) -> Self {
        match value {
            ClassifierErr::Io(e) => e,
            e => io::Error::other(e.report()),
        }
    }
}
