//! Core protocol types for plexrpc, shared between the client engine and
//! transport implementations.
//!
//! This crate defines the vocabulary every RPC speaks:
//!
//! - [`Code`]: the closed set of terminal status codes
//! - [`Status`]: a terminal outcome (code, optional message, trailing metadata)
//! - [`Metadata`]: the string-to-bytes mapping attached to calls, with support
//!   for binary values under `-bin` keys
//!
//! The client engine lives in the `plexrpc-client` crate; transports depend
//! only on this crate to produce statuses and read metadata.

mod code;
mod metadata;
mod status;

pub use code::{Code, ParseCodeError};
pub use metadata::{Metadata, MetadataError};
pub use status::Status;
