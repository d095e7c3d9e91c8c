//! Error types shared by the library and its C-callable surface.
//!
//! Internally everything is `Result`-based; at the ABI the error is flattened
//! into the process-wide last-error channel (see `api`). Lane exhaustion is
//! not an error: it is reported through per-lane result flags only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown volume kind `{0}`")]
    UnknownVolumeKind(String),

    #[error("unknown driver `{0}`")]
    UnknownDriver(String),

    #[error("voxel buffer holds {actual} voxels but the dimensions require {expected}")]
    VoxelCountMismatch { expected: usize, actual: usize },

    #[error("value selector needs at least one range")]
    EmptySelectorRanges,

    #[error("value selector range [{lower}, {upper}] is inverted")]
    InvertedRange { lower: f32, upper: f32 },

    #[error("unsupported lane width {0}; supported widths are 1, 4, 8, and 16")]
    UnsupportedWidth(u32),

    #[error("object has not been committed")]
    NotCommitted,

    #[error("invalid or already released handle")]
    InvalidHandle,

    #[error("handle refers to an object of the wrong type")]
    WrongObjectType,

    #[error("no current driver is set")]
    NoCurrentDriver,
}

impl KernelError {
    /// Stable numeric code for the last-error channel.
    pub fn code(&self) -> i32 {
        match self {
            Self::MissingParameter(_) => 1,
            Self::InvalidParameter { .. } => 2,
            Self::UnknownVolumeKind(_) => 3,
            Self::UnknownDriver(_) => 4,
            Self::VoxelCountMismatch { .. } => 5,
            Self::EmptySelectorRanges => 6,
            Self::InvertedRange { .. } => 7,
            Self::UnsupportedWidth(_) => 8,
            Self::NotCommitted => 9,
            Self::InvalidHandle => 10,
            Self::WrongObjectType => 11,
            Self::NoCurrentDriver => 12,
        }
    }
}
