// Licensed under the Apache-2.0 license

//! FIQ vector plumbing.
//!
//! The SoC has exactly one FIQ line, reserved for a single real-time
//! consumer. [`owner`] arbitrates who that consumer is and installs code
//! into the live vector slot; [`trampoline`] turns the raw vector entry into
//! a call to a plain callback on a private stack.
//!
//! Wiring order for the I2C engine: claim the vector through
//! [`owner::FiqOwnership::claim`], point a [`trampoline::Trampoline`] at the
//! tick callback, then install its stub with [`owner::VectorTable::install`].

pub mod owner;
pub mod trampoline;

pub use owner::{FiqOp, FiqOwnership, VectorOwner, VectorTable};
pub use trampoline::Trampoline;
