// Licensed under the Apache-2.0 license

//! Typed access to memory-mapped register blocks.
//!
//! Every peripheral touched by the engine (GPIO banks, interrupt controller,
//! exception-vector pages) is addressed as a base pointer plus a fixed offset
//! table. The [`Mmio`] trait is the seam between that offset arithmetic and
//! the actual bus access: production code uses [`RegisterBlock`], which
//! performs one volatile access per call, while the models in [`crate::sim`]
//! substitute software register files for host-side tests.

/// Word-granular access to a register block.
///
/// `offset` is a byte offset from the block base and must be 4-byte aligned.
pub trait Mmio {
    fn read(&self, offset: usize) -> u32;
    fn write(&mut self, offset: usize, value: u32);

    fn modify(&mut self, offset: usize, set: u32, clear: u32) {
        let value = self.read(offset);
        self.write(offset, (value & !clear) | set);
    }
}

/// Shared access to a software register model, used by the sim harness so
/// both the engine and the test's device model can reach the same block.
impl<T: Mmio> Mmio for &core::cell::RefCell<T> {
    fn read(&self, offset: usize) -> u32 {
        self.borrow().read(offset)
    }

    fn write(&mut self, offset: usize, value: u32) {
        self.borrow_mut().write(offset, value)
    }
}

/// A live memory-mapped register block.
///
/// Each `read`/`write` is exactly one volatile access; nothing is cached or
/// merged, which the bit-bang timing relies on.
#[derive(Copy, Clone, Debug)]
pub struct RegisterBlock {
    base: *mut u8,
}

impl RegisterBlock {
    /// Wrap a mapped peripheral base address.
    ///
    /// # Safety
    ///
    /// `base` must point to a mapped, device-type region that stays valid for
    /// the lifetime of the block, and every offset later passed in must lie
    /// within that region. The engine accesses blocks from FIQ context, so
    /// the mapping must never be torn down while a transfer is active.
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        debug_assert!(offset % 4 == 0);
        self.base.wrapping_add(offset).cast::<u32>()
    }
}

impl Mmio for RegisterBlock {
    fn read(&self, offset: usize) -> u32 {
        // Validity is guaranteed by the `new` contract.
        unsafe { self.reg(offset).read_volatile() }
    }

    fn write(&mut self, offset: usize, value: u32) {
        unsafe { self.reg(offset).write_volatile(value) }
    }
}

// The block is only ever moved between contexts as part of the engine, whose
// cross-context discipline is documented in the engine module.
unsafe impl Send for RegisterBlock {}
