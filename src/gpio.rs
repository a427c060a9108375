// Licensed under the Apache-2.0 license

//! GPIO pin encoding and open-drain line operations.
//!
//! The SoC groups GPIO banks in pairs sharing one 32-bit register block:
//! logical pin `bank*16 + index` lives in block `(bank >> 1) * 0x28` at bit
//! `index + (bank & 1) * 16`. Within a block the registers used here are
//! direction (+0x10, bit set = input), set-data (+0x18), clear-data (+0x1C)
//! and input-data (+0x20). The set/clear registers are write-one strobes, so
//! a single line can be flipped without read-modify-write from FIQ context.
//!
//! I2C lines are treated as open drain: "high" releases the pin to input and
//! lets the external pull-up raise it, "low" drives the latched 0 out.

use crate::mmio::Mmio;

/// Byte offset of the direction register within a paired-bank block.
pub const GPIO_DIR: usize = 0x10;
/// Byte offset of the set-data strobe register.
pub const GPIO_SET_DATA: usize = 0x18;
/// Byte offset of the clear-data strobe register.
pub const GPIO_CLR_DATA: usize = 0x1C;
/// Byte offset of the input-data register.
pub const GPIO_IN_DATA: usize = 0x20;
/// Stride of one paired-bank register block.
pub const GPIO_BLOCK_STRIDE: usize = 0x28;

/// One GPIO line with its register offsets resolved up front.
///
/// Computed once at port request time so the tick handler only performs
/// straight-line strobe writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpioPin {
    dir: usize,
    set: usize,
    clear: usize,
    input: usize,
    mask: u32,
}

impl GpioPin {
    /// Resolve a logical pin number (`bank*16 + index`) into register
    /// offsets and a bit mask.
    #[must_use]
    pub fn new(pin: u8) -> Self {
        let bank = usize::from(pin >> 4);
        let index = u32::from(pin & 0xF);
        let block = (bank >> 1) * GPIO_BLOCK_STRIDE;
        let mask = 1u32 << (index + ((bank as u32) & 1) * 16);
        Self {
            dir: block + GPIO_DIR,
            set: block + GPIO_SET_DATA,
            clear: block + GPIO_CLR_DATA,
            input: block + GPIO_IN_DATA,
            mask,
        }
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn dir_offset(&self) -> usize {
        self.dir
    }

    pub fn input_offset(&self) -> usize {
        self.input
    }

    /// Latch 0 and switch the line to output: actively pull it low.
    pub fn drive_low<M: Mmio>(&self, gpio: &mut M) {
        gpio.write(self.clear, self.mask);
        gpio.modify(self.dir, 0, self.mask);
    }

    /// Latch 1 and switch the line to output.
    ///
    /// Used only where the protocol really wants a driven high (the status
    /// pin and the stop-condition edge); data bits release instead.
    pub fn drive_high<M: Mmio>(&self, gpio: &mut M) {
        gpio.write(self.set, self.mask);
        gpio.modify(self.dir, 0, self.mask);
    }

    /// Switch the line back to input and let the pull-up take it high.
    pub fn release<M: Mmio>(&self, gpio: &mut M) {
        gpio.modify(self.dir, self.mask, 0);
    }

    /// Sample the line level.
    pub fn is_high<M: Mmio>(&self, gpio: &M) -> bool {
        gpio.read(self.input) & self.mask != 0
    }

    /// Drive the opposite of the current latched level.
    ///
    /// COMPLETE uses this to keep edges arriving on the status pin; FIQ
    /// context cannot call any notification API, so the edge itself is the
    /// notification.
    pub fn toggle<M: Mmio>(&self, gpio: &mut M) {
        if self.is_high(gpio) {
            self.drive_low(gpio);
        } else {
            self.drive_high(gpio);
        }
    }
}
