use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const LABEL_SIZE: usize = size_of::<u32>();

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    InitMlParams { sample_size: usize },
    Train,
    Predict,
    Test,
}

/// The status code carried by `Status` and `Predictions` responses.
///
/// Recoverable conditions travel as a code; fatal precondition violations
/// travel as a `Msg::Err` frame instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NoError,
    NoOutData,
}

impl Status {
    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Self::NoError),
            1 => Ok(Self::NoOutData),
            byte => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received an invalid status byte {byte}"),
            )),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::NoOutData => 1,
        }
    }
}

/// The application layer message for the entire system.
///
/// Pixel data and prediction bytes are borrowed so they can travel as the
/// zero-copy tail of a frame.
#[derive(Debug, PartialEq)]
pub enum Msg<'a> {
    Err(Cow<'a, str>),
    Control(Command),
    TrainSample { label: u32, pixels: &'a [u8] },
    PredictSample(&'a [u8]),
    Ack,
    Status(Status),
    Predictions { scores: &'a [u8], status: Status },
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: u8) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = (0 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                let header = (1 as Header).to_be_bytes();
                buf.extend_from_slice(&header);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::TrainSample { label, pixels } => {
                let header = (2 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                buf.extend_from_slice(&label.to_be_bytes());
                Some(pixels)
            }
            Msg::PredictSample(pixels) => {
                let header = (3 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(pixels)
            }
            Msg::Ack => {
                let header = (4 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                None
            }
            Msg::Status(status) => {
                let header = (5 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                buf.push(status.as_byte());
                None
            }
            Msg::Predictions { scores, status } => {
                let header = (6 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                buf.push(status.as_byte());
                Some(scores)
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap()) as u8;

        match kind {
            0 => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => {
                if rest.len() < LABEL_SIZE {
                    return Self::buf_is_too_small(buf.len());
                }

                let (label_buf, pixels) = rest.split_at(LABEL_SIZE);

                // SAFETY: We splitted the buffer to be of size `LABEL_SIZE` just above.
                let label = u32::from_be_bytes(label_buf.try_into().unwrap());

                Ok(Self::TrainSample { label, pixels })
            }
            3 => Ok(Self::PredictSample(rest)),
            4 => Ok(Self::Ack),
            5 => {
                let &[byte] = rest else {
                    return Self::buf_is_too_small(buf.len());
                };

                Ok(Self::Status(Status::from_byte(byte)?))
            }
            6 => {
                let [byte, scores @ ..] = rest else {
                    return Self::buf_is_too_small(buf.len());
                };

                Ok(Self::Predictions {
                    scores,
                    status: Status::from_byte(*byte)?,
                })
            }
            byte => Self::invalid_kind_byte(byte),
        }
    }
}
