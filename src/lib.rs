#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[cfg(feature = "board")]
pub mod board;
pub mod error;
#[cfg(feature = "board")]
pub(crate) mod serde_helpers;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Timestamp in milliseconds since [`std::time::UNIX_EPOCH`]
pub type Timestamp = i64;
