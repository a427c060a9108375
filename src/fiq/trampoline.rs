// Licensed under the Apache-2.0 license

//! The FIQ trampoline: raw vector entry to plain callback.
//!
//! The stub installed at the vector saves every caller-visible register to a
//! private stack, calls the registered callback with no arguments, restores,
//! and returns with the vector's native `subs pc, lr, #4` retry sequence.
//! FIQ mode banks r8–r14, so only r0–r7, lr and SPSR need saving; they go to
//! a reserved region sized for one worst-case frame rather than the normal
//! per-mode stack, because this code may fire while any other stack is
//! mid-update.
//!
//! Callback contract (not enforced by types): it must not block, must not
//! call any non-reentrant host API, and must not touch memory that could be
//! unmapped mid-instruction; the FIQ can fire at any point, including
//! during page-table maintenance.

use crate::i2c::common::Error;

/// Words reserved for the private FIQ stack. One frame is ten words
/// (r0–r7, lr, SPSR); the rest is headroom for the callback itself.
pub const FIQ_STACK_WORDS: usize = 64;

/// Number of words in the generated stub, literal pool included.
pub const STUB_WORDS: usize = 12;

// ARM opcodes of the stub, assembled by hand so the image can be built and
// patched without a target toolchain. Literal offsets are PC-relative
// (PC reads as instruction address + 8).
const OP_LDR_SP_LIT: u32 = 0xE59F_D020; // ldr   sp, [pc, #32]  -> word 10
const OP_STM_REGS: u32 = 0xE92D_40FF; //   stmfd sp!, {r0-r7, lr}
const OP_MRS_SPSR: u32 = 0xE14F_0000; //   mrs   r0, spsr
const OP_STM_SPSR: u32 = 0xE92D_0001; //   stmfd sp!, {r0}
const OP_LDR_R0_LIT: u32 = 0xE59F_0014; // ldr   r0, [pc, #20]  -> word 11
const OP_BLX_R0: u32 = 0xE12F_FF30; //     blx   r0
const OP_LDM_SPSR: u32 = 0xE8BD_0001; //   ldmfd sp!, {r0}
const OP_MSR_SPSR: u32 = 0xE16F_F000; //   msr   spsr_cxsf, r0
const OP_LDM_REGS: u32 = 0xE8BD_40FF; //   ldmfd sp!, {r0-r7, lr}
const OP_SUBS_PC: u32 = 0xE25E_F004; //    subs  pc, lr, #4

/// Index of the stack-top literal in the stub image.
const LIT_STACK_TOP: usize = 10;
/// Index of the callback literal in the stub image.
const LIT_CALLBACK: usize = 11;

/// The tick callback invoked from the stub.
pub type FiqCallback = extern "C" fn();

/// Trampoline state: the private stack plus the registered callback.
///
/// The instance must live at a fixed address for as long as its stub is
/// installed, because the stub's literal pool holds the stack-top address.
/// That is why [`Trampoline::stub_image`] requires `&'static self`.
#[repr(C, align(8))]
pub struct Trampoline {
    stack: [u32; FIQ_STACK_WORDS],
    callback: Option<FiqCallback>,
}

impl Trampoline {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stack: [0; FIQ_STACK_WORDS],
            callback: None,
        }
    }

    /// Register the callback the stub will invoke.
    ///
    /// This is the FIQ-context registration surface: the callback inherits
    /// the full contract in the module docs.
    pub fn set_callback(&mut self, callback: FiqCallback) {
        self.callback = Some(callback);
    }

    /// Address just past the private stack; the stub loads this into sp.
    pub fn stack_top(&'static self) -> usize {
        self.stack.as_ptr() as usize + core::mem::size_of_val(&self.stack)
    }

    /// Build the stub image with this trampoline's stack and callback
    /// patched into the literal pool. Fails `NotReady` before
    /// [`Trampoline::set_callback`].
    pub fn stub_image(&'static self) -> Result<[u32; STUB_WORDS], Error> {
        let callback = self.callback.ok_or(Error::NotReady)?;
        let mut image = [
            OP_LDR_SP_LIT,
            OP_STM_REGS,
            OP_MRS_SPSR,
            OP_STM_SPSR,
            OP_LDR_R0_LIT,
            OP_BLX_R0,
            OP_LDM_SPSR,
            OP_MSR_SPSR,
            OP_LDM_REGS,
            OP_SUBS_PC,
            0,
            0,
        ];
        image[LIT_STACK_TOP] = self.stack_top() as u32;
        image[LIT_CALLBACK] = callback as usize as u32;
        Ok(image)
    }
}

impl Default for Trampoline {
    fn default() -> Self {
        Self::new()
    }
}
