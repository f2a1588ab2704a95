//! # marque-core
//!
//! Foundation types for the marque correlation layer.
//!
//! This crate provides the shared vocabulary the other marque crates depend on:
//!
//! - **Branded IDs**: [`MessageId`] and [`SessionId`] as newtypes for type safety
//! - **Wire frames**: [`Frame`] and [`FrameMetadata`], the exact JSON encoding
//!   exchanged between peers
//! - **Errors**: [`ProtocolError`], [`TransactionError`], and [`RequestError`]
//!   via `thiserror`, each with machine-readable codes

#![deny(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod ids;

pub use errors::{ProtocolError, RequestError, TransactionError};
pub use frame::{Frame, FrameMetadata};
pub use ids::{MessageId, SessionId};
