// Licensed under the Apache-2.0 license

//! Per-port bit-bang state machine and tick dispatch.
//!
//! The engine synthesizes I2C on plain GPIO because the SoC has fewer
//! hardware controllers than sensor ports, and one ultrasonic sensor needs
//! timing no ordinary interrupt path can hold. Every timer tick, delivered
//! through the FIQ trampoline, advances each requested non-idle port by
//! exactly one step; the SCL phase flips once per tick, so the bus clock is
//! half the tick rate.
//!
//! Execution contexts (strictly ordered by priority):
//! - normal context: lifecycle API in [`super::ports`], may block;
//! - ordinary-interrupt context: [`Engine::service_status_irq`], no blocking;
//! - FIQ-equivalent context: [`Engine::handle_tick`], no blocking, no host
//!   API, no access to memory that could be unmapped mid-instruction.
//!
//! The tick handler touches GPIO and interrupt-controller registers without
//! locking; nothing else the engine touches can preempt it. Port `state` is
//! the one field read from lower-priority contexts while FIQ writes it, so it
//! lives in an `AtomicU8` with acquire/release ordering.

use core::sync::atomic::{AtomicU8, Ordering};

use fugit::{HertzU32, RateExtU32};

use crate::common::{Logger, NoOpLogger};
use crate::gpio::GpioPin;
use crate::i2c::common::{
    CompleteFn, Dir, MsgSlot, PortId, MAX_MSGS, PORT_COUNT, XFER_NO_ACK, XFER_OK,
};
use crate::intc::IrqController;
use crate::mmio::Mmio;

/// Margin ticks between a write byte's ACK and the next byte.
pub(crate) const WRITE_ACK_MARGIN: u8 = 4;
/// Margin ticks between a read byte's ACK and the next byte.
pub(crate) const READ_ACK_MARGIN: u8 = 2;

/// Transfer phases of one port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferState {
    Idle = 0,
    Start,
    Start2,
    Addr,
    Write,
    Read,
    WBit,
    RBit,
    WAck,
    RAck,
    Stop,
    Stop2,
    Stop3,
    Restart,
    Wait,
    Complete,
}

impl TransferState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => TransferState::Start,
            2 => TransferState::Start2,
            3 => TransferState::Addr,
            4 => TransferState::Write,
            5 => TransferState::Read,
            6 => TransferState::WBit,
            7 => TransferState::RBit,
            8 => TransferState::WAck,
            9 => TransferState::RAck,
            10 => TransferState::Stop,
            11 => TransferState::Stop2,
            12 => TransferState::Stop3,
            13 => TransferState::Restart,
            14 => TransferState::Wait,
            15 => TransferState::Complete,
            _ => TransferState::Idle,
        }
    }
}

/// Engine configuration.
#[derive(Copy, Clone, Debug)]
pub struct EngineConfig {
    /// System interrupt index of the tick timer.
    pub timer_irq: u32,
    /// Logical pin number of the shared completion status line.
    pub status_pin: u8,
    /// System interrupt index of the status-pin edge interrupt.
    pub status_irq: u32,
    /// Rate the platform timer is programmed to; the bus runs at half this.
    pub tick_rate: HertzU32,
}

pub struct EngineConfigBuilder {
    timer_irq: u32,
    status_pin: u8,
    status_irq: u32,
    tick_rate: HertzU32,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timer_irq: 0,
            status_pin: 0,
            status_irq: 0,
            tick_rate: 20_000u32.Hz(),
        }
    }

    #[must_use]
    pub fn timer_irq(mut self, irq: u32) -> Self {
        self.timer_irq = irq;
        self
    }

    #[must_use]
    pub fn status_pin(mut self, pin: u8) -> Self {
        self.status_pin = pin;
        self
    }

    #[must_use]
    pub fn status_irq(mut self, irq: u32) -> Self {
        self.status_irq = irq;
        self
    }

    #[must_use]
    pub fn tick_rate(mut self, rate: HertzU32) -> Self {
        self.tick_rate = rate;
        self
    }

    #[must_use]
    pub fn build(self) -> EngineConfig {
        EngineConfig {
            timer_irq: self.timer_irq,
            status_pin: self.status_pin,
            status_irq: self.status_irq,
            tick_rate: self.tick_rate,
        }
    }
}

/// State of one physical input port.
pub(crate) struct PortState {
    pub sda: GpioPin,
    pub scl: GpioPin,
    state: AtomicU8,
    pub msg_index: usize,
    pub msg_count: usize,
    pub byte_index: usize,
    /// Shift-out bit mask, MSB first.
    pub bit_mask: u8,
    /// Shift-in bits remaining.
    pub bits_left: u8,
    /// Byte currently on the wire.
    pub shift: u8,
    /// Level the master currently holds SCL at.
    pub scl_high: bool,
    /// True while the byte in flight is the address byte.
    pub in_addr: bool,
    pub wait: u8,
    pub nacked: bool,
    pub result: i32,
    pub msgs: [MsgSlot; MAX_MSGS],
    pub complete: Option<CompleteFn>,
    pub token: usize,
    pub requested: bool,
}

impl PortState {
    fn new() -> Self {
        Self {
            sda: GpioPin::new(0),
            scl: GpioPin::new(0),
            state: AtomicU8::new(TransferState::Idle as u8),
            msg_index: 0,
            msg_count: 0,
            byte_index: 0,
            bit_mask: 0,
            bits_left: 0,
            shift: 0,
            scl_high: true,
            in_addr: false,
            wait: 0,
            nacked: false,
            result: XFER_OK,
            msgs: [MsgSlot::empty(), MsgSlot::empty()],
            complete: None,
            token: 0,
            requested: false,
        }
    }

    pub fn state(&self) -> TransferState {
        TransferState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TransferState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// The software I2C engine: one instance per system, owned by the platform
/// glue and injected at the few call sites that need it.
pub struct Engine<G: Mmio, I: Mmio, L: Logger = NoOpLogger> {
    pub(crate) gpio: G,
    pub(crate) intc: IrqController<I>,
    pub(crate) config: EngineConfig,
    pub(crate) status_pin: GpioPin,
    pub(crate) ports: [PortState; PORT_COUNT],
    pub(crate) requested: u32,
    pub(crate) initialized: bool,
    pub logger: L,
}

impl<G: Mmio, I: Mmio> Engine<G, I, NoOpLogger> {
    pub fn new(gpio: G, intc_regs: I) -> Self {
        Self::with_logger(gpio, intc_regs, NoOpLogger)
    }
}

impl<G: Mmio, I: Mmio, L: Logger> Engine<G, I, L> {
    pub fn with_logger(gpio: G, intc_regs: I, logger: L) -> Self {
        Self {
            gpio,
            intc: IrqController::new(intc_regs),
            config: EngineConfigBuilder::new().build(),
            status_pin: GpioPin::new(0),
            ports: core::array::from_fn(|_| PortState::new()),
            requested: 0,
            initialized: false,
            logger,
        }
    }

    /// Initialize the engine with its platform configuration.
    ///
    /// Until this runs, `request_port` fails with `NotReady`.
    pub fn init(&mut self, config: &EngineConfig) {
        self.config = *config;
        self.status_pin = GpioPin::new(config.status_pin);
        self.status_pin.drive_low(&mut self.gpio);
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Bitmask of currently requested ports.
    pub fn requested_mask(&self) -> u32 {
        self.requested
    }

    /// Current transfer state of a port. Safe from any context.
    pub fn port_state(&self, id: PortId) -> TransferState {
        self.ports
            .get(id.index())
            .map_or(TransferState::Idle, PortState::state)
    }

    /// One timer tick: advance every requested non-idle port by one step.
    ///
    /// Runs in FIQ-equivalent context. Must not block, must not call any
    /// host API, must not touch memory that could be unmapped.
    pub fn handle_tick(&mut self) {
        let mut active = false;
        let gpio = &mut self.gpio;
        let status = &self.status_pin;
        for port in self.ports.iter_mut() {
            if !port.requested || port.state() == TransferState::Idle {
                continue;
            }
            Self::step(port, gpio, status);
            if port.state() != TransferState::Idle {
                active = true;
            }
        }
        // Nothing left to clock: stop the tick source, it is cheap to
        // re-enable on the next start_xfer.
        if !active {
            self.intc.disable(self.config.timer_irq);
        }
        self.intc.ack(self.config.timer_irq);
    }

    /// Shared shift-out entry: both ADDR and WRITE feed bytes through here.
    fn begin_write_bits(port: &mut PortState, byte: u8) {
        port.shift = byte;
        port.bit_mask = 0x80;
        port.set_state(TransferState::WBit);
    }

    /// Shared shift-in entry used when a read message resumes.
    fn begin_read_bits<M: Mmio>(port: &mut PortState, gpio: &mut M) {
        port.sda.release(gpio);
        port.shift = 0;
        port.bits_left = 8;
        port.set_state(TransferState::RBit);
    }

    fn step(port: &mut PortState, gpio: &mut G, status: &GpioPin) {
        use TransferState as S;
        match port.state() {
            S::Idle => {}
            S::Complete => {
                // FIQ context cannot notify anyone directly; keep edges
                // arriving on the status pin until the companion interrupt
                // services this port.
                status.toggle(gpio);
            }
            S::Start => {
                port.msg_index = 0;
                port.byte_index = 0;
                port.result = XFER_OK;
                port.set_state(S::Start2);
            }
            S::Start2 => {
                // Start condition: SDA falls while SCL is high.
                port.sda.drive_low(gpio);
                port.scl_high = true;
                port.nacked = false;
                port.set_state(S::Addr);
            }
            S::Addr => {
                let (addr, dir) = match port.msgs.get(port.msg_index) {
                    Some(slot) => (slot.addr, slot.dir),
                    None => (0, Dir::Write),
                };
                let byte = (addr << 1) | u8::from(dir == Dir::Read);
                port.in_addr = true;
                Self::begin_write_bits(port, byte);
            }
            S::Write => {
                let byte = port
                    .msgs
                    .get(port.msg_index)
                    .and_then(|slot| slot.data.get(port.byte_index))
                    .copied()
                    .unwrap_or(0);
                port.in_addr = false;
                Self::begin_write_bits(port, byte);
            }
            S::WBit => {
                if port.scl_high {
                    port.scl.drive_low(gpio);
                    port.scl_high = false;
                    if port.bit_mask == 0 {
                        port.set_state(S::RAck);
                    }
                } else {
                    // Data may only change while SCL is low.
                    if port.shift & port.bit_mask != 0 {
                        port.sda.release(gpio);
                    } else {
                        port.sda.drive_low(gpio);
                    }
                    port.bit_mask >>= 1;
                    port.scl.release(gpio);
                    port.scl_high = true;
                }
            }
            S::RAck => {
                if port.scl_high {
                    // Sample only while SCL is high: low means ACK.
                    let acked = !port.sda.is_high(gpio);
                    port.scl.drive_low(gpio);
                    port.scl_high = false;
                    Self::after_write_ack(port, acked);
                } else {
                    // Hand SDA to the slave for the ack bit.
                    port.sda.release(gpio);
                    port.scl.release(gpio);
                    port.scl_high = true;
                }
            }
            S::Read => {
                Self::begin_read_bits(port, gpio);
            }
            S::RBit => {
                if port.scl_high {
                    // Sample only while SCL is high.
                    let bit = u8::from(port.sda.is_high(gpio));
                    port.shift = (port.shift << 1) | bit;
                    port.scl.drive_low(gpio);
                    port.scl_high = false;
                    port.bits_left -= 1;
                    if port.bits_left == 0 {
                        if let Some(byte) = port
                            .msgs
                            .get_mut(port.msg_index)
                            .and_then(|slot| slot.data.get_mut(port.byte_index))
                        {
                            *byte = port.shift;
                        }
                        port.set_state(S::WAck);
                    }
                } else {
                    port.scl.release(gpio);
                    port.scl_high = true;
                }
            }
            S::WAck => {
                if port.scl_high {
                    port.scl.drive_low(gpio);
                    port.scl_high = false;
                    port.byte_index += 1;
                    let len = port
                        .msgs
                        .get(port.msg_index)
                        .map_or(0, |slot| slot.data.len());
                    if port.byte_index < len {
                        port.wait = READ_ACK_MARGIN;
                        port.set_state(S::Wait);
                    } else {
                        port.set_state(S::Stop);
                    }
                } else {
                    // Master acks, except on the last byte of the message
                    // where protocol wants a nack.
                    let len = port
                        .msgs
                        .get(port.msg_index)
                        .map_or(0, |slot| slot.data.len());
                    if port.byte_index + 1 < len {
                        port.sda.drive_low(gpio);
                    } else {
                        port.sda.release(gpio);
                    }
                    port.scl.release(gpio);
                    port.scl_high = true;
                }
            }
            S::Wait => {
                port.wait -= 1;
                if port.wait == 0 {
                    let dir = port.msgs.get(port.msg_index).map_or(Dir::Write, |s| s.dir);
                    match dir {
                        Dir::Write => port.set_state(S::Write),
                        Dir::Read => port.set_state(S::Read),
                    }
                }
            }
            S::Stop => {
                port.sda.drive_low(gpio);
                port.scl.release(gpio);
                port.scl_high = true;
                // Wait for SCL actually observed high before the stop edge.
                if port.scl.is_high(gpio) {
                    port.set_state(S::Stop2);
                }
            }
            S::Stop2 => {
                if port.msg_index + 1 < port.msg_count && !port.nacked {
                    // Device quirk, preserved bit-for-bit: a full stop, one
                    // extra clock pulse, then a fresh start. NOT a standard
                    // repeated start; the ultrasonic sensor requires this
                    // exact sequence between its two messages.
                    port.sda.release(gpio);
                    port.scl.drive_low(gpio);
                    port.scl.release(gpio);
                    port.scl_high = true;
                    port.set_state(S::Restart);
                } else {
                    port.set_state(S::Stop3);
                }
            }
            S::Restart => {
                port.msg_index += 1;
                port.byte_index = 0;
                port.set_state(S::Start2);
            }
            S::Stop3 => {
                // Releasing SDA raises the stop edge and lets the port's
                // disconnect detection see the line again.
                port.sda.release(gpio);
                port.set_state(S::Complete);
            }
        }
    }

    fn after_write_ack(port: &mut PortState, acked: bool) {
        use TransferState as S;
        if !acked {
            // Abort the whole transfer regardless of remaining data.
            port.nacked = true;
            port.result = XFER_NO_ACK;
            port.set_state(S::Stop);
            return;
        }
        let len = port
            .msgs
            .get(port.msg_index)
            .map_or(0, |slot| slot.data.len());
        if port.in_addr {
            port.in_addr = false;
        } else {
            port.byte_index += 1;
        }
        if port.byte_index < len {
            port.wait = WRITE_ACK_MARGIN;
            port.set_state(S::Wait);
        } else {
            port.set_state(S::Stop);
        }
    }
}
