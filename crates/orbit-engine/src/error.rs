use thiserror::Error;

use crate::device::FramebufferStatus;

/// Errors raised by the simulation and rendering core.
///
/// Every variant except [`Error::Capacity`] is a fatal configuration error for the
/// component that produced it: the component logs the failure and stays unusable
/// for the rest of the session. Capacity errors are returned to the caller, which
/// must recreate the buffer at a larger size.
#[derive(Debug, Error)]
pub enum Error {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("gpu resource creation failed: {0}")]
    GpuResource(String),

    #[error("failed to build shader program `{label}`: {reason}")]
    Program { label: String, reason: String },

    #[error("incomplete framebuffer: {status:?} (status 0x{code:04X})")]
    IncompleteFramebuffer { status: FramebufferStatus, code: u32 },

    #[error(
        "sub-range {index} holds {capacity} elements, update requested {requested}; recreate the buffer first"
    )]
    Capacity {
        index: usize,
        requested: usize,
        capacity: usize,
    },

    #[error("sub-range index {index} out of range (buffer has {len})")]
    SubrangeIndex { index: usize, len: usize },

    #[error("update of {bytes} bytes is not a whole number of {stride}-byte elements")]
    Misaligned { bytes: usize, stride: usize },

    #[error("unknown {kind} handle")]
    UnknownHandle { kind: &'static str },
}

impl Error {
    pub(crate) fn incomplete(status: FramebufferStatus) -> Self {
        Self::IncompleteFramebuffer {
            status,
            code: status.code(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
