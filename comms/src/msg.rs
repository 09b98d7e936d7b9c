use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const DATA_H: Header = 2;

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// First message a participant sends to the coordinator.
    Hello { rank: usize, world_size: usize },
    /// The coordinator's answer once every participant said hello.
    Ready,
    /// Arrival at, and release from, a barrier.
    Barrier,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(&'a [f32]),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name for the message kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Hello { .. }) => "control/hello",
            Msg::Control(Command::Ready) => "control/ready",
            Msg::Control(Command::Barrier) => "control/barrier",
            Msg::Data(_) => "data",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                Ok(Some(e.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(nums) => {
                buf.extend_from_slice(&DATA_H.to_be_bytes());
                Ok(Some(bytemuck::cast_slice(nums)))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);
        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(kind_buf);
        let rest: &'a [u8] = rest;

        match Header::from_be_bytes(header) {
            ERR_H => {
                let detail = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(detail)))
            }
            CONTROL_H => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            DATA_H => {
                let nums = bytemuck::try_cast_slice(rest).map_err(|err| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("bad data payload: {err}"))
                })?;

                Ok(Self::Data(nums))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
