//! The inter-node wire message and its adaptive-compression codec.

mod codec;
mod message;
mod pack;

pub use codec::{decode, encode, CompressionLimit, Error};
pub use message::{Envelope, MessageType, TrackingEntry};
pub use pack::{pack, unpack, UnpackError};

/// Threshold (and, absent a bus-reported override, ceiling) for compression: 1 MiB.
pub const DEFAULT_SIZE_LIMIT: usize = 1024 * 1024;

/// Magic bytes that identify a gzip-compressed payload on the wire.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
