use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// A labeled classification dataset held in memory, one sample per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    x: Array2<f32>,
    y: Vec<usize>,
    classes: usize,
}

/// An owned batch of samples and their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array2<f32>,
    pub y: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `x` - The samples, one per row.
    /// * `y` - The class of each sample.
    /// * `classes` - The amount of classes.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the rows and labels disagree.
    pub fn new(x: Array2<f32>, y: Vec<usize>, classes: usize) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                what: "dataset labels",
                got: y.len(),
                expected: x.nrows(),
            });
        }

        if let Some(&label) = y.iter().find(|&&label| label >= classes) {
            return Err(MlErr::LabelOutOfRange { label, classes });
        }

        Ok(Self { x, y, classes })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn features(&self) -> usize {
        self.x.ncols()
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn x(&self) -> ArrayView2<'_, f32> {
        self.x.view()
    }

    pub fn y(&self) -> &[usize] {
        &self.y
    }

    /// Gathers the samples at `indices` into an owned batch.
    pub fn batch(&self, indices: &[usize]) -> Batch {
        Batch {
            x: self.x.select(Axis(0), indices),
            y: indices.iter().map(|&i| self.y[i]).collect(),
        }
    }

    /// Writes the dataset as json into `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a dataset previously written with `save`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let Self { x, y, classes } = serde_json::from_reader(reader)?;
        Self::new(x, y, classes)
    }
}
