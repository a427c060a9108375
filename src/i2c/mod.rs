// Licensed under the Apache-2.0 license

//! Software I2C engine module.
//!
//! Provides the per-port bit-bang state machine driven from FIQ context and
//! the port lifecycle API consumed by the higher-level bus adapter.

pub mod common;
pub mod engine;
pub mod ports;

pub use common::{Dir, Error, Message, PortId, XFER_NO_ACK, XFER_OK};
pub use engine::{Engine, EngineConfig, EngineConfigBuilder, TransferState};
