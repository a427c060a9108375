// Licensed under the Apache-2.0 license

//! End-to-end tests: the engine clocked tick by tick against the simulated
//! bus. Every test drives [`crate::i2c::Engine::handle_tick`] in a loop and
//! polls a [`crate::sim::SimSlave`] after each tick, the same interleaving
//! the FIQ timer produces on hardware.

pub mod transfer_test;

use core::cell::RefCell;

use crate::i2c::{Engine, EngineConfigBuilder, PortId, TransferState};
use crate::sim::{SimGpio, SimIntc, SimSlave};

pub const TIMER_IRQ: u32 = 21;
pub const STATUS_IRQ: u32 = 28;
pub const STATUS_PIN: u8 = 0x23;
pub const SDA_PIN: u8 = 0x02;
pub const SCL_PIN: u8 = 0x0F;

pub type SimEngine<'a> = Engine<&'a RefCell<SimGpio>, &'a RefCell<SimIntc>>;

pub fn init_engine<'a>(
    gpio: &'a RefCell<SimGpio>,
    intc: &'a RefCell<SimIntc>,
) -> SimEngine<'a> {
    let mut engine = Engine::new(gpio, intc);
    engine.init(
        &EngineConfigBuilder::new()
            .timer_irq(TIMER_IRQ)
            .status_pin(STATUS_PIN)
            .status_irq(STATUS_IRQ)
            .build(),
    );
    engine
}

/// Tick the engine until the port reaches COMPLETE, returning the sequence
/// of distinct states it passed through.
pub fn run_to_complete(
    engine: &mut SimEngine<'_>,
    gpio: &RefCell<SimGpio>,
    slave: &mut SimSlave,
    id: PortId,
) -> Vec<TransferState> {
    let mut trace = Vec::new();
    for _ in 0..4096 {
        engine.handle_tick();
        slave.poll(&mut gpio.borrow_mut());
        let state = engine.port_state(id);
        if trace.last() != Some(&state) {
            trace.push(state);
        }
        if state == TransferState::Complete {
            return trace;
        }
    }
    panic!("transfer did not complete; trace: {trace:?}");
}
