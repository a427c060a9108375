// Licensed under the Apache-2.0 license

//! Software models of the peripherals the engine touches, for host-side
//! tests.
//!
//! Everything here implements [`Mmio`] over plain arrays, so the engine can
//! be driven tick by tick on the host with no target hardware. [`SimSlave`]
//! models an I2C slave at the same sampling granularity as the engine: it is
//! polled once after every engine tick, detects start/stop and clock edges
//! from consecutive samples, and pulls SDA through the GPIO model's
//! external-drive plane.

use crate::gpio::{GPIO_BLOCK_STRIDE, GPIO_CLR_DATA, GPIO_DIR, GPIO_IN_DATA, GPIO_SET_DATA};
use crate::i2c::common::Error;
use crate::intc::{IrqServices, INTC_EICR, INTC_EISR, INTC_SICR};
use crate::mmio::Mmio;

/// A small word-addressed RAM standing in for an exception-vector page.
pub struct SimMem {
    words: [u32; 64],
}

impl SimMem {
    #[must_use]
    pub fn new() -> Self {
        Self { words: [0; 64] }
    }

    /// Word at a byte offset, zero if out of range.
    #[must_use]
    pub fn word(&self, offset: usize) -> u32 {
        self.words.get(offset / 4).copied().unwrap_or(0)
    }
}

impl Default for SimMem {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmio for SimMem {
    fn read(&self, offset: usize) -> u32 {
        self.word(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        if let Some(word) = self.words.get_mut(offset / 4) {
            *word = value;
        }
    }
}

/// Interrupt-controller model with index-written registers.
///
/// Tracks enable state per line plus counters the tests assert on.
pub struct SimIntc {
    enabled: u128,
    acks: [u32; 128],
    enable_writes: u32,
}

impl SimIntc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: 0,
            acks: [0; 128],
            enable_writes: 0,
        }
    }

    #[must_use]
    pub fn is_enabled(&self, irq: u32) -> bool {
        self.enabled & (1u128 << (irq & 0x7F)) != 0
    }

    /// How many times this line was acknowledged.
    #[must_use]
    pub fn ack_count(&self, irq: u32) -> u32 {
        self.acks.get((irq & 0x7F) as usize).copied().unwrap_or(0)
    }

    /// Total writes to the enable-set register, any line.
    #[must_use]
    pub fn enable_writes(&self) -> u32 {
        self.enable_writes
    }
}

impl Default for SimIntc {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmio for SimIntc {
    fn read(&self, _offset: usize) -> u32 {
        0
    }

    fn write(&mut self, offset: usize, value: u32) {
        let idx = value & 0x7F;
        match offset {
            INTC_EISR => {
                self.enabled |= 1u128 << idx;
                self.enable_writes += 1;
            }
            INTC_EICR => {
                self.enabled &= !(1u128 << idx);
            }
            INTC_SICR => {
                if let Some(count) = self.acks.get_mut(idx as usize) {
                    *count += 1;
                }
            }
            _ => {}
        }
    }
}

const SIM_GPIO_BLOCKS: usize = 8;

/// One paired-bank register block of the GPIO model.
///
/// `ext_low` is the external-drive plane: a set bit means something on the
/// board side (a slave, in these tests) is pulling the open-drain line low.
#[derive(Copy, Clone)]
struct PairedBank {
    dir: u32,
    out: u32,
    ext_low: u32,
}

/// GPIO model with open-drain line resolution.
///
/// A line reads high unless the controller drives its latched 0 out or an
/// external party pulls it low; all other combinations float to the pull-up.
/// Direction resets to all-inputs, matching the released bus of an idle
/// port.
pub struct SimGpio {
    blocks: [PairedBank; SIM_GPIO_BLOCKS],
}

impl SimGpio {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: [PairedBank {
                dir: !0,
                out: 0,
                ext_low: 0,
            }; SIM_GPIO_BLOCKS],
        }
    }

    fn split(pin: u8) -> (usize, u32) {
        let bank = u32::from(pin >> 4);
        let mask = 1u32 << (u32::from(pin & 0xF) + (bank & 1) * 16);
        ((bank >> 1) as usize, mask)
    }

    fn in_word(bank: &PairedBank) -> u32 {
        // Driven low when configured as output with a 0 latch, or pulled
        // low externally; everything else floats high.
        !((!bank.dir & !bank.out) | bank.ext_low)
    }

    /// Resolved level of one line.
    #[must_use]
    pub fn pin_is_high(&self, pin: u8) -> bool {
        let (block, mask) = Self::split(pin);
        self.blocks
            .get(block)
            .is_some_and(|bank| Self::in_word(bank) & mask != 0)
    }

    /// External open-drain pull on one line (the slave side of the bus).
    pub fn set_ext_low(&mut self, pin: u8, low: bool) {
        let (block, mask) = Self::split(pin);
        if let Some(bank) = self.blocks.get_mut(block) {
            if low {
                bank.ext_low |= mask;
            } else {
                bank.ext_low &= !mask;
            }
        }
    }

    /// True while the controller has the line configured as output.
    #[must_use]
    pub fn is_driven(&self, pin: u8) -> bool {
        let (block, mask) = Self::split(pin);
        self.blocks
            .get(block)
            .is_some_and(|bank| bank.dir & mask == 0)
    }
}

impl Default for SimGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmio for SimGpio {
    fn read(&self, offset: usize) -> u32 {
        let Some(bank) = self.blocks.get(offset / GPIO_BLOCK_STRIDE) else {
            return 0;
        };
        match offset % GPIO_BLOCK_STRIDE {
            GPIO_DIR => bank.dir,
            GPIO_IN_DATA => Self::in_word(bank),
            _ => 0,
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        let Some(bank) = self.blocks.get_mut(offset / GPIO_BLOCK_STRIDE) else {
            return;
        };
        match offset % GPIO_BLOCK_STRIDE {
            GPIO_DIR => bank.dir = value,
            GPIO_SET_DATA => bank.out |= value,
            GPIO_CLR_DATA => bank.out &= !value,
            _ => {}
        }
    }
}

/// Registration model for the platform IRQ services seam.
#[derive(Default)]
pub struct SimIrqServices {
    pub active: heapless::Vec<(u32, usize), 8>,
    /// Make the next `request_irq` fail, for error-path tests.
    pub fail_next: bool,
}

impl SimIrqServices {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IrqServices for SimIrqServices {
    fn request_irq(&mut self, irq: u32, port: usize) -> Result<(), Error> {
        if self.fail_next {
            self.fail_next = false;
            return Err(Error::Busy);
        }
        self.active.push((irq, port)).map_err(|_| Error::Busy)
    }

    fn free_irq(&mut self, irq: u32, port: usize) {
        if let Some(pos) = self
            .active
            .iter()
            .position(|&(i, p)| i == irq && p == port)
        {
            self.active.swap_remove(pos);
        }
    }
}

/// Whether the slave model acknowledges bytes addressed to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AckPolicy {
    Always,
    Never,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SlavePhase {
    Idle,
    Addr,
    AckAddr { read: bool },
    Rx,
    AckRx,
    Tx,
    AckTx,
}

/// Sampled I2C slave model.
///
/// Poll once after each engine tick. Levels are sampled at poll time, so
/// edges are detected between consecutive polls; that matches the engine,
/// which changes at most one line level per tick on each of SCL and SDA.
/// Received bytes shift in on rising SCL edges, driven bits change on
/// falling edges, exactly as a hardware slave would clock them.
pub struct SimSlave {
    sda: u8,
    scl: u8,
    pub address: u8,
    pub policy: AckPolicy,
    /// Bytes returned for read messages, in order.
    pub response: heapless::Vec<u8, 64>,
    /// Bytes received from write messages.
    pub written: heapless::Vec<u8, 64>,
    pub starts: u32,
    pub stops: u32,
    phase: SlavePhase,
    shift: u8,
    nbits: u8,
    tx_pos: usize,
    master_acked: bool,
    prev_scl: bool,
    prev_sda: bool,
}

impl SimSlave {
    #[must_use]
    pub fn new(sda: u8, scl: u8, address: u8) -> Self {
        Self {
            sda,
            scl,
            address,
            policy: AckPolicy::Always,
            response: heapless::Vec::new(),
            written: heapless::Vec::new(),
            starts: 0,
            stops: 0,
            phase: SlavePhase::Idle,
            shift: 0,
            nbits: 0,
            tx_pos: 0,
            master_acked: false,
            // Idle bus floats high.
            prev_scl: true,
            prev_sda: true,
        }
    }

    /// Sample the bus once and advance the slave.
    pub fn poll(&mut self, gpio: &mut SimGpio) {
        let scl = gpio.pin_is_high(self.scl);
        let sda = gpio.pin_is_high(self.sda);

        // SDA edge with SCL held high is a start (falling) or stop (rising).
        if scl && self.prev_scl {
            if self.prev_sda && !sda {
                self.starts += 1;
                gpio.set_ext_low(self.sda, false);
                self.phase = SlavePhase::Addr;
                self.shift = 0;
                self.nbits = 0;
            } else if !self.prev_sda && sda {
                self.stops += 1;
                gpio.set_ext_low(self.sda, false);
                self.phase = SlavePhase::Idle;
            }
        }

        if scl && !self.prev_scl {
            self.on_scl_rise(sda);
        } else if !scl && self.prev_scl {
            self.on_scl_fall(gpio);
        }

        self.prev_scl = scl;
        // Re-sample SDA: a falling-edge handler may have changed the line.
        self.prev_sda = gpio.pin_is_high(self.sda);
    }

    fn on_scl_rise(&mut self, sda: bool) {
        match self.phase {
            SlavePhase::Addr | SlavePhase::Rx => {
                self.shift = (self.shift << 1) | u8::from(sda);
                self.nbits += 1;
            }
            SlavePhase::AckTx => {
                self.master_acked = !sda;
            }
            _ => {}
        }
    }

    fn on_scl_fall(&mut self, gpio: &mut SimGpio) {
        match self.phase {
            SlavePhase::Addr if self.nbits == 8 => {
                let read = self.shift & 1 != 0;
                let matched = (self.shift >> 1) == self.address;
                if matched && self.policy == AckPolicy::Always {
                    gpio.set_ext_low(self.sda, true);
                    self.phase = SlavePhase::AckAddr { read };
                } else {
                    // Staying silent reads back as a nack.
                    self.phase = SlavePhase::Idle;
                }
            }
            SlavePhase::AckAddr { read } => {
                gpio.set_ext_low(self.sda, false);
                self.nbits = 0;
                if read {
                    self.tx_pos = 0;
                    self.phase = SlavePhase::Tx;
                    self.drive_tx_bit(gpio);
                } else {
                    self.shift = 0;
                    self.phase = SlavePhase::Rx;
                }
            }
            SlavePhase::Rx if self.nbits == 8 => {
                let _ = self.written.push(self.shift);
                if self.policy == AckPolicy::Always {
                    gpio.set_ext_low(self.sda, true);
                    self.phase = SlavePhase::AckRx;
                } else {
                    self.phase = SlavePhase::Idle;
                }
            }
            SlavePhase::AckRx => {
                gpio.set_ext_low(self.sda, false);
                self.shift = 0;
                self.nbits = 0;
                self.phase = SlavePhase::Rx;
            }
            SlavePhase::Tx => {
                if self.nbits < 8 {
                    self.drive_tx_bit(gpio);
                } else {
                    // Byte shifted out; hand SDA back for the master's ack.
                    gpio.set_ext_low(self.sda, false);
                    self.master_acked = false;
                    self.phase = SlavePhase::AckTx;
                }
            }
            SlavePhase::AckTx => {
                if self.master_acked && self.tx_pos < self.response.len() {
                    self.nbits = 0;
                    self.phase = SlavePhase::Tx;
                    self.drive_tx_bit(gpio);
                } else {
                    gpio.set_ext_low(self.sda, false);
                    self.phase = SlavePhase::Idle;
                }
            }
            _ => {}
        }
    }

    fn drive_tx_bit(&mut self, gpio: &mut SimGpio) {
        let byte = self.response.get(self.tx_pos).copied().unwrap_or(0xFF);
        let bit = byte & (0x80 >> self.nbits) != 0;
        gpio.set_ext_low(self.sda, !bit);
        self.nbits += 1;
        if self.nbits == 8 {
            self.tx_pos += 1;
        }
    }
}
