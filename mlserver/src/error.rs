use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use machine_learning::MlErr;

/// The result type used in the entire server module.
pub type Result<T> = std::result::Result<T, ServerErr>;

/// All errors that can occur while serving requests.
#[derive(Debug)]
pub enum ServerErr {
    /// A buffering or lifecycle call arrived before `InitMlParams`.
    NotConfigured,
    /// A decoding, buffering or training error from the compute crate.
    Ml(MlErr),
    /// A weight artifact could not be encoded or decoded.
    Store { path: PathBuf, detail: String },
    /// A client sent a frame kind only the server is allowed to send.
    UnexpectedMessage { got: &'static str },
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl Display for ServerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => {
                write!(f, "no sample parameters set, call InitMlParams first")
            }
            Self::Ml(e) => write!(f, "{e}"),
            Self::Store { path, detail } => {
                write!(f, "weight artifact {} is unusable: {detail}", path.display())
            }
            Self::UnexpectedMessage { got } => {
                write!(f, "unexpected message kind: {got}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ServerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for ServerErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<io::Error> for ServerErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
