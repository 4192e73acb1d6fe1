//! Errors raised by the panel driver and the frame encoder

use std::fmt;
use std::time::Duration;

pub use display_interface::DisplayError;

/// Boxed error coming from the host platform (GPIO chip, spidev, sysfs)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong between an image and the physical panel.
#[derive(Debug)]
pub enum Error {
    /// Image, geometry or buffer sizes do not line up. Detected before any I/O.
    Dimensions(String),
    /// `display`/`clear` was called while the panel is not initialized.
    NotReady,
    /// Host resources could not be acquired during init.
    Acquire {
        stage: &'static str,
        source: BoxError,
    },
    /// A bus transaction or line change failed.
    Transport {
        stage: &'static str,
        source: DisplayError,
    },
    /// The busy line did not report idle within the configured timeout.
    BusyTimeout {
        stage: &'static str,
        waited: Duration,
    },
    /// The bus could not be released.
    Release { source: BoxError },
}

impl Error {
    pub(crate) fn dimensions(msg: impl Into<String>) -> Self {
        Error::Dimensions(msg.into())
    }

    pub(crate) fn acquire(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Error::Acquire {
            stage,
            source: source.into(),
        }
    }

    /// Stage name attached to a hardware error, if any.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Error::Acquire { stage, .. }
            | Error::Transport { stage, .. }
            | Error::BusyTimeout { stage, .. } => Some(stage),
            Error::Dimensions(_) | Error::NotReady | Error::Release { .. } => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Dimensions(msg) => write!(f, "invalid image dimensions: {}", msg),
            Error::NotReady => write!(f, "display is not initialized"),
            Error::Acquire { stage, source } => write!(f, "{}: {}", stage, source),
            Error::Transport { stage, source } => write!(f, "{}: {:?}", stage, source),
            Error::BusyTimeout { stage, waited } => {
                write!(f, "{}: display still busy after {:?}", stage, waited)
            }
            Error::Release { source } => write!(f, "could not close the bus: {}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Acquire { source, .. } | Error::Release { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Attach a stage name to a low-level interface failure.
pub(crate) trait Stage<T> {
    fn stage(self, stage: &'static str) -> Result<T, Error>;
}

impl<T> Stage<T> for Result<T, DisplayError> {
    fn stage(self, stage: &'static str) -> Result<T, Error> {
        self.map_err(|source| Error::Transport { stage, source })
    }
}

impl<T> Stage<T> for Result<T, Error> {
    /// Re-label a transport error raised deeper down with the outer stage,
    /// keeping the original cause.
    fn stage(self, stage: &'static str) -> Result<T, Error> {
        self.map_err(|e| match e {
            Error::Transport { source, .. } => Error::Transport { stage, source },
            Error::BusyTimeout { waited, .. } => Error::BusyTimeout { stage, waited },
            other => other,
        })
    }
}
