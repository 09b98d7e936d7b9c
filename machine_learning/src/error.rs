use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ndarray::ShapeError),
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    EmptyDataset,
    InvalidBatchSize(usize),
    InvalidMilestones(String),
    InvalidDistribution(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(_) => write!(f, "invalid array shape"),
            MlErr::LabelOutOfRange { label, classes } => {
                write!(f, "label {label} is out of range for {classes} classes")
            }
            MlErr::EmptyDataset => write!(f, "the dataset has no samples"),
            MlErr::InvalidBatchSize(size) => write!(f, "invalid batch size {size}"),
            MlErr::InvalidMilestones(detail) => write!(f, "invalid milestones: {detail}"),
            MlErr::InvalidDistribution(detail) => write!(f, "invalid distribution: {detail}"),
            MlErr::Io(_) => write!(f, "io error"),
            MlErr::Json(_) => write!(f, "json error"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ndarray::ShapeError> for MlErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
