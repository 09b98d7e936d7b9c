use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DistErr;

/// How participants talk to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A single participant, collectives are the identity.
    #[default]
    #[serde(rename = "none")]
    Serial,
    /// Tasks of the same process.
    Local,
    /// Tcp streams relayed through rank 0.
    Tcp,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Serial => "none",
            Backend::Local => "local",
            Backend::Tcp => "tcp",
        }
    }

    pub fn is_distributed(&self) -> bool {
        !matches!(self, Backend::Serial)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = DistErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "serial" => Ok(Backend::Serial),
            "local" => Ok(Backend::Local),
            "tcp" => Ok(Backend::Tcp),
            other => Err(DistErr::InvalidLaunch(format!(
                "unknown backend {other:?}, expected one of none, local, tcp"
            ))),
        }
    }
}

/// Where tensors live. Only the host is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}
