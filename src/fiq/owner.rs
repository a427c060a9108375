// Licensed under the Apache-2.0 license

//! Ownership of the single FIQ vector, and installation of vector code.
//!
//! Owners form a stack: claiming asks the current holder to yield, releasing
//! re-offers the vector down the stack. A default owner that always accepts
//! sits at the bottom, so a release can always land somewhere.

use core::cell::RefCell;

use crate::common::Logger;
use crate::i2c::common::Error;
use crate::mmio::Mmio;

/// Byte offset of the FIQ slot within the exception table. The FIQ vector
/// is the last entry, so handler code can run in place from here.
pub const FIQ_VECTOR_OFFSET: usize = 0x1C;
/// Virtual base of the high-vector alias of the exception table.
pub const HIGH_VECTOR_BASE: usize = 0xFFFF_0000;

/// Maximum nesting depth of vector owners, default owner included.
pub const MAX_OWNERS: usize = 8;

/// Operation requested of an owner's callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FiqOp {
    /// A newcomer wants the vector; return `true` to yield it.
    Relinquish,
    /// The vector is being offered back; return `true` to take it.
    Reacquire,
}

/// Owner callback. `token` is the opaque context registered with the owner.
/// Runs in normal context.
pub type OwnerOp = fn(op: FiqOp, token: usize) -> bool;

/// One registrant for the FIQ vector.
#[derive(Copy, Clone, Debug)]
pub struct VectorOwner {
    pub name: &'static str,
    pub op: OwnerOp,
    pub token: usize,
}

fn default_owner_op(_op: FiqOp, _token: usize) -> bool {
    // The bottom of the stack never declines.
    true
}

/// Claim/release arbiter for the FIQ vector.
pub struct FiqOwnership<L: Logger> {
    stack: heapless::Vec<VectorOwner, MAX_OWNERS>,
    pub logger: L,
}

impl<L: Logger> FiqOwnership<L> {
    pub fn new(logger: L) -> Self {
        let mut stack = heapless::Vec::new();
        // Capacity is non-zero, the push cannot fail.
        let _ = stack.push(VectorOwner {
            name: "default",
            op: default_owner_op,
            token: 0,
        });
        Self { stack, logger }
    }

    /// Name of the owner currently holding the vector.
    pub fn current(&self) -> Option<&'static str> {
        self.stack.last().map(|o| o.name)
    }

    /// Try to take the vector.
    ///
    /// The current holder's callback is asked to relinquish; only if it
    /// agrees does `owner` become current. A decline leaves the stack
    /// untouched and returns `Busy`.
    pub fn claim(&mut self, owner: VectorOwner) -> Result<(), Error> {
        if self.stack.is_full() {
            return Err(Error::Busy);
        }
        if let Some(head) = self.stack.last() {
            if !(head.op)(FiqOp::Relinquish, head.token) {
                return Err(Error::Busy);
            }
        }
        self.stack.push(owner).map_err(|_| Error::Busy)?;
        Ok(())
    }

    /// Give the vector back.
    ///
    /// Only the current holder may release. A mismatched release is a
    /// caller bug: it is logged and reported as `Misuse` with no state
    /// change. After a valid release the vector is offered back down the
    /// stack; owners that decline to reacquire are dropped, and the default
    /// owner at the bottom always accepts.
    pub fn release(&mut self, owner: &VectorOwner) -> Result<(), Error> {
        let is_head = self
            .stack
            .last()
            .is_some_and(|head| head.name == owner.name && head.token == owner.token);
        if !is_head {
            self.logger.error("fiq: release by non-owner ignored");
            return Err(Error::Misuse);
        }
        self.stack.pop();
        while let Some(head) = self.stack.last() {
            if (head.op)(FiqOp::Reacquire, head.token) {
                break;
            }
            self.stack.pop();
        }
        Ok(())
    }
}

/// Cache-flush hook: `(start, len)` in the address space of the range that
/// was just written. Must behave exactly like the platform's
/// flush-icache-range primitive.
pub type IcacheFlushFn = fn(start: usize, len: usize);

/// The live exception table and its high-vector alias.
pub struct VectorTable<M: Mmio> {
    low: M,
    high: M,
    low_base: usize,
    high_base: usize,
    flush: IcacheFlushFn,
}

impl<M: Mmio> VectorTable<M> {
    pub fn new(low: M, low_base: usize, high: M, high_base: usize, flush: IcacheFlushFn) -> Self {
        Self {
            low,
            high,
            low_base,
            high_base,
            flush,
        }
    }

    /// Copy handler code into the live FIQ slot and its high-vector alias,
    /// then flush instruction caches over both ranges. The copy is
    /// bit-exact; no caching shortcuts.
    pub fn install(&mut self, code: &[u32]) {
        for (i, word) in code.iter().enumerate() {
            self.low.write(FIQ_VECTOR_OFFSET + 4 * i, *word);
            self.high.write(FIQ_VECTOR_OFFSET + 4 * i, *word);
        }
        let len = code.len() * 4;
        (self.flush)(self.low_base + FIQ_VECTOR_OFFSET, len);
        (self.flush)(self.high_base + FIQ_VECTOR_OFFSET, len);
    }
}

impl<'a> VectorTable<&'a RefCell<crate::sim::SimMem>> {
    /// Table over simulated vector pages, for host-side tests.
    pub fn simulated(
        low: &'a RefCell<crate::sim::SimMem>,
        high: &'a RefCell<crate::sim::SimMem>,
        flush: IcacheFlushFn,
    ) -> Self {
        Self::new(low, 0, high, HIGH_VECTOR_BASE, flush)
    }
}
