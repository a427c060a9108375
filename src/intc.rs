// Licensed under the Apache-2.0 license

//! Interrupt-controller access for the shared timer line, plus the seam to
//! the platform's generic IRQ services.
//!
//! The controller exposes index-written registers: writing an interrupt
//! number to the status-clear register acknowledges that line, writing it to
//! enable-set/enable-clear gates it. Cheap single-word writes, callable from
//! the tick handler.

use crate::i2c::common::Error;
use crate::mmio::Mmio;

/// System interrupt status clear (acknowledge) register offset.
pub const INTC_SICR: usize = 0x24;
/// System interrupt enable set register offset.
pub const INTC_EISR: usize = 0x28;
/// System interrupt enable clear register offset.
pub const INTC_EICR: usize = 0x2C;

/// Valid system-interrupt index range is 7 bits.
const IRQ_INDEX_MASK: u32 = 0x7F;

/// Thin driver over the interrupt-controller block.
#[derive(Copy, Clone, Debug)]
pub struct IrqController<M: Mmio> {
    regs: M,
}

impl<M: Mmio> IrqController<M> {
    pub fn new(regs: M) -> Self {
        Self { regs }
    }

    /// Acknowledge a system interrupt line.
    pub fn ack(&mut self, irq: u32) {
        self.regs.write(INTC_SICR, irq & IRQ_INDEX_MASK);
    }

    /// Unmask a system interrupt line.
    pub fn enable(&mut self, irq: u32) {
        self.regs.write(INTC_EISR, irq & IRQ_INDEX_MASK);
    }

    /// Mask a system interrupt line. Re-enabling later is equally cheap.
    pub fn disable(&mut self, irq: u32) {
        self.regs.write(INTC_EICR, irq & IRQ_INDEX_MASK);
    }
}

/// Platform IRQ registration services (external collaborator boundary).
///
/// The engine uses this to bind the shared status-pin interrupt to the
/// companion handler while a port is requested. The handler registered here
/// runs in ordinary-interrupt context: it must not block, and it must mask
/// the FIQ-equivalent context around any mutation of shared port state.
pub trait IrqServices {
    /// Associate `irq` with the requesting port. The same line may be
    /// requested once per port; the platform keeps the association shared.
    fn request_irq(&mut self, irq: u32, port: usize) -> Result<(), Error>;

    /// Drop this port's association with `irq`.
    fn free_irq(&mut self, irq: u32, port: usize);
}
