//! Shoal Core - slot primitives and limits shared across the proxy.
//!
//! This crate is the foundation of the Shoal workspace. It holds the hash
//! slot vocabulary of the cluster protocol and the explicit resource limits
//! every other crate works within.
//!
//! # Design principles
//!
//! - **Explicit limits**: every queue, pool, and timeout has a bounded,
//!   named maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use types::{SlotId, SLOT_COUNT, SLOT_MAX};
