// Licensed under the Apache-2.0 license

//! Port lifecycle API and the status-interrupt companion service.
//!
//! This is the surface the higher-level bus adapter calls: request a port,
//! start a transfer, get the completion callback, release the port. The
//! companion service bridges the FIQ-side COMPLETE state back to ordinary
//! interrupt context, where callbacks are allowed again.

use core::sync::atomic::{compiler_fence, Ordering};

use crate::common::Logger;
use crate::i2c::common::{
    CompleteFn, Dir, Error, Message, PortId, MAX_MSGS, MAX_MSG_LEN,
};
use crate::i2c::engine::{Engine, TransferState};
use crate::intc::IrqServices;
use crate::mmio::Mmio;
use crate::gpio::GpioPin;

impl<G: Mmio, I: Mmio, L: Logger> Engine<G, I, L> {
    /// Claim a port and bind its SDA/SCL pins.
    ///
    /// Fails `NotReady` before [`Engine::init`], `Busy` if the port is
    /// already requested. On any failure nothing is modified. The caller
    /// owns both pins exclusively for the lifetime of the request; that
    /// exclusivity is a platform convention, not enforced here.
    pub fn request_port(
        &mut self,
        id: PortId,
        sda: u8,
        scl: u8,
        irqs: &mut dyn IrqServices,
    ) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.requested & id.mask() != 0 {
            return Err(Error::Busy);
        }
        // The status line is shared: every requested port holds its own
        // association with the same interrupt.
        irqs.request_irq(self.config.status_irq, id.index())?;

        let Some(port) = self.ports.get_mut(id.index()) else {
            irqs.free_irq(self.config.status_irq, id.index());
            return Err(Error::InvalidArgument);
        };
        port.sda = GpioPin::new(sda);
        port.scl = GpioPin::new(scl);
        port.sda.release(&mut self.gpio);
        port.scl.release(&mut self.gpio);
        port.requested = true;
        self.requested |= id.mask();
        Ok(())
    }

    /// Release a previously requested port.
    ///
    /// Spins until the port has drained to IDLE. The spin is unbounded by
    /// design: if the state machine ever wedged mid-transfer this would
    /// never return. There is no bus-hang timeout beyond the fixed margin
    /// delays, so a wedge cannot happen from protocol stalls alone, but the
    /// risk is accepted and documented rather than papered over.
    pub fn release_port(&mut self, id: PortId, irqs: &mut dyn IrqServices) -> Result<(), Error> {
        if self.requested & id.mask() == 0 {
            return Err(Error::InvalidArgument);
        }
        while self.port_state(id) != TransferState::Idle {
            core::hint::spin_loop();
        }
        irqs.free_irq(self.config.status_irq, id.index());
        if let Some(port) = self.ports.get_mut(id.index()) {
            port.requested = false;
        }
        self.requested &= !id.mask();
        Ok(())
    }

    /// Start a transfer of one or two chained messages on a requested port.
    ///
    /// Message payloads are copied into engine-owned storage before the
    /// timer is enabled; the tick handler never reads caller memory. The
    /// original buffer pointers are retained so read data can be copied back
    /// at completion.
    ///
    /// Fails `InvalidArgument` on an unrequested port, an empty or oversized
    /// message list, or an over-long payload; `Busy` while a transfer is in
    /// flight. Nothing is modified on failure.
    ///
    /// # Safety
    ///
    /// Every message buffer must stay live and otherwise untouched until the
    /// completion callback has run: the companion service writes read data
    /// back through the retained raw pointers.
    pub unsafe fn start_xfer(
        &mut self,
        id: PortId,
        msgs: &mut [Message<'_>],
        complete: CompleteFn,
        token: usize,
    ) -> Result<(), Error> {
        if self.requested & id.mask() == 0 {
            return Err(Error::InvalidArgument);
        }
        if msgs.is_empty() || msgs.len() > MAX_MSGS {
            return Err(Error::InvalidArgument);
        }
        if msgs.iter().any(|m| m.data.len() > MAX_MSG_LEN) {
            return Err(Error::InvalidArgument);
        }
        let Some(port) = self.ports.get_mut(id.index()) else {
            return Err(Error::InvalidArgument);
        };
        if port.state() != TransferState::Idle {
            return Err(Error::Busy);
        }

        for (slot, msg) in port.msgs.iter_mut().zip(msgs.iter_mut()) {
            slot.addr = msg.addr & 0x7F;
            slot.dir = msg.dir;
            slot.data.clear();
            // Length was validated above.
            match msg.dir {
                Dir::Write => {
                    let _ = slot.data.extend_from_slice(msg.data);
                }
                Dir::Read => {
                    let _ = slot.data.resize(msg.data.len(), 0);
                }
            }
            slot.user = msg.data.as_mut_ptr();
        }
        port.msg_count = msgs.len();
        port.byte_index = 0;
        port.complete = Some(complete);
        port.token = token;
        // Publish every field before the state flips to START; the tick
        // handler keys off the state alone.
        compiler_fence(Ordering::Release);
        port.set_state(TransferState::Start);
        self.intc.enable(self.config.timer_irq);
        Ok(())
    }

    /// Companion handler body for the shared status-pin interrupt.
    ///
    /// Scans *all* requested ports for COMPLETE: the status line is one
    /// pin for the whole engine, so an edge says "some port finished", not
    /// which. For each finished port: copy read data back, reset to IDLE,
    /// then invoke the completion callback.
    ///
    /// Runs in ordinary-interrupt context. The caller must mask the
    /// FIQ-equivalent context around this call so an in-flight tick cannot
    /// interleave with the port reset. Returns the number of ports serviced.
    pub fn service_status_irq(&mut self) -> usize {
        let mut serviced = 0;
        for port in self.ports.iter_mut() {
            if !port.requested || port.state() != TransferState::Complete {
                continue;
            }
            for slot in port.msgs.iter().take(port.msg_count) {
                if slot.dir == Dir::Read && !slot.user.is_null() {
                    // Contract from start_xfer: the caller's buffer outlives
                    // the transfer and nothing else writes it meanwhile.
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            slot.data.as_ptr(),
                            slot.user,
                            slot.data.len(),
                        );
                    }
                }
            }
            let result = port.result;
            let token = port.token;
            let complete = port.complete.take();
            port.set_state(TransferState::Idle);
            if let Some(cb) = complete {
                cb(result, token);
            }
            serviced += 1;
        }
        if serviced == 0 {
            self.logger
                .warn("softi2c: status edge with no completed port");
        }
        serviced
    }
}
