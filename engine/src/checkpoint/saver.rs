use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;

use super::Bundle;
use crate::Result;

/// Writes checkpoints into a directory. Only the leader touches the disk.
#[derive(Debug, Clone)]
pub struct DiskSaver {
    dirname: PathBuf,
    is_leader: bool,
}

impl DiskSaver {
    /// Creates a new `DiskSaver`, the leader creates `dirname` if needed.
    pub fn new<P: AsRef<Path>>(dirname: P, is_leader: bool) -> Result<Self> {
        let dirname = dirname.as_ref().to_path_buf();
        if is_leader {
            fs::create_dir_all(&dirname)?;
        }

        Ok(Self { dirname, is_leader })
    }

    pub fn dirname(&self) -> &Path {
        &self.dirname
    }

    /// Writes `bundle` as `filename`, renaming a temporary file into place.
    pub fn save(&self, bundle: &Bundle, filename: &str) -> Result<()> {
        if !self.is_leader {
            return Ok(());
        }

        let path = self.dirname.join(filename);
        let tmp = self.dirname.join(format!(".{filename}.tmp"));

        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, bundle)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &path)?;
        debug!("saved checkpoint {}", path.display());
        Ok(())
    }

    pub fn remove(&self, filename: &str) -> Result<()> {
        if !self.is_leader {
            return Ok(());
        }

        fs::remove_file(self.dirname.join(filename))?;
        Ok(())
    }
}
