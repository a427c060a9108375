// Licensed under the Apache-2.0 license

//! Full transfers against the simulated slave, including the chained
//! stop-pulse-start sequence between two messages.

use core::cell::RefCell;
use core::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use super::{init_engine, run_to_complete, SCL_PIN, SDA_PIN, STATUS_IRQ, STATUS_PIN, TIMER_IRQ};
use crate::common::{LogLevel, WriterLogger};
use crate::i2c::{
    Dir, Engine, EngineConfigBuilder, Error, Message, PortId, TransferState, XFER_NO_ACK, XFER_OK,
};
use crate::sim::{AckPolicy, SimGpio, SimIntc, SimIrqServices, SimSlave};

#[test]
fn single_write_completes_and_calls_back() {
    static RESULT: AtomicI32 = AtomicI32::new(i32::MIN);
    static TOKEN: AtomicUsize = AtomicUsize::new(0);
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    fn on_complete(result: i32, token: usize) {
        RESULT.store(result, Ordering::SeqCst);
        TOKEN.store(token, Ordering::SeqCst);
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let mut engine = init_engine(&gpio, &intc);
    let mut irqs = SimIrqServices::new();
    let mut slave = SimSlave::new(SDA_PIN, SCL_PIN, 0x50);

    engine
        .request_port(PortId::In1, SDA_PIN, SCL_PIN, &mut irqs)
        .unwrap();
    let mut data = [0x01u8, 0x02, 0x03];
    let mut msgs = [Message {
        addr: 0x50,
        dir: Dir::Write,
        data: &mut data,
    }];
    unsafe {
        engine
            .start_xfer(PortId::In1, &mut msgs, on_complete, 0x1234)
            .unwrap();
    }
    assert!(intc.borrow().is_enabled(TIMER_IRQ));

    run_to_complete(&mut engine, &gpio, &mut slave, PortId::In1);
    assert_eq!(slave.written.as_slice(), &[0x01, 0x02, 0x03]);
    assert_eq!(slave.starts, 1);
    assert_eq!(slave.stops, 1);
    // The callback waits for the companion interrupt.
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);

    assert_eq!(engine.service_status_irq(), 1);
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(RESULT.load(Ordering::SeqCst), XFER_OK);
    assert_eq!(TOKEN.load(Ordering::SeqCst), 0x1234);
    assert_eq!(engine.port_state(PortId::In1), TransferState::Idle);

    // With the port idle the next tick parks the timer, and release
    // returns without spinning.
    engine.handle_tick();
    assert!(!intc.borrow().is_enabled(TIMER_IRQ));
    engine.release_port(PortId::In1, &mut irqs).unwrap();
}

#[test]
fn unacknowledged_address_aborts_with_no_ack() {
    static RESULT: AtomicI32 = AtomicI32::new(i32::MIN);
    fn on_complete(result: i32, _token: usize) {
        RESULT.store(result, Ordering::SeqCst);
    }

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let mut engine = init_engine(&gpio, &intc);
    let mut irqs = SimIrqServices::new();
    let mut slave = SimSlave::new(SDA_PIN, SCL_PIN, 0x50);
    slave.policy = AckPolicy::Never;

    engine
        .request_port(PortId::In1, SDA_PIN, SCL_PIN, &mut irqs)
        .unwrap();
    let mut data = [0xDEu8, 0xAD];
    let mut msgs = [Message {
        addr: 0x50,
        dir: Dir::Write,
        data: &mut data,
    }];
    unsafe {
        engine
            .start_xfer(PortId::In1, &mut msgs, on_complete, 0)
            .unwrap();
    }

    run_to_complete(&mut engine, &gpio, &mut slave, PortId::In1);
    // The abort happens at the first missing ack: no data byte made it out.
    assert!(slave.written.is_empty());
    assert_eq!(engine.service_status_irq(), 1);
    assert_eq!(RESULT.load(Ordering::SeqCst), XFER_NO_ACK);
}

#[test]
fn write_then_read_chains_through_the_stop_pulse_start() {
    static RESULT: AtomicI32 = AtomicI32::new(i32::MIN);
    fn on_complete(result: i32, _token: usize) {
        RESULT.store(result, Ordering::SeqCst);
    }

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let mut engine = init_engine(&gpio, &intc);
    let mut irqs = SimIrqServices::new();
    let mut slave = SimSlave::new(SDA_PIN, SCL_PIN, 0x50);
    slave.response.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]).unwrap();

    engine
        .request_port(PortId::In1, SDA_PIN, SCL_PIN, &mut irqs)
        .unwrap();
    let mut reg = [0xAAu8];
    let mut buf = [0u8; 4];
    let mut msgs = [
        Message {
            addr: 0x50,
            dir: Dir::Write,
            data: &mut reg,
        },
        Message {
            addr: 0x50,
            dir: Dir::Read,
            data: &mut buf,
        },
    ];
    unsafe {
        engine
            .start_xfer(PortId::In1, &mut msgs, on_complete, 0)
            .unwrap();
    }
    drop(msgs);

    let trace = run_to_complete(&mut engine, &gpio, &mut slave, PortId::In1);

    // Exactly one chained boundary: stop edge, extra pulse, fresh start.
    let restarts = trace
        .iter()
        .filter(|s| **s == TransferState::Restart)
        .count();
    assert_eq!(restarts, 1);
    let stop3 = trace
        .iter()
        .filter(|s| **s == TransferState::Stop3)
        .count();
    assert_eq!(stop3, 1);
    let restart_at = trace
        .iter()
        .position(|s| *s == TransferState::Restart)
        .unwrap();
    let stop3_at = trace
        .iter()
        .position(|s| *s == TransferState::Stop3)
        .unwrap();
    assert!(restart_at < stop3_at);
    // On the wire the boundary is a full stop plus a new start.
    assert_eq!(slave.starts, 2);
    assert_eq!(slave.stops, 2);
    assert_eq!(slave.written.as_slice(), &[0xAA]);

    // Read data lands in the caller's buffer only at service time.
    assert_eq!(buf, [0u8; 4]);
    assert_eq!(engine.service_status_irq(), 1);
    assert_eq!(buf, [0x11, 0x22, 0x33, 0x44]);
    assert_eq!(RESULT.load(Ordering::SeqCst), XFER_OK);
}

#[test]
fn ports_run_concurrently_and_one_service_reaps_both() {
    static RESULTS: [AtomicI32; 2] = [AtomicI32::new(i32::MIN), AtomicI32::new(i32::MIN)];
    fn on_complete(result: i32, token: usize) {
        RESULTS[token].store(result, Ordering::SeqCst);
    }

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let mut engine = init_engine(&gpio, &intc);
    let mut irqs = SimIrqServices::new();
    // A slave answers on port 1; port 2's lines float, so its address
    // byte goes unacknowledged.
    let mut slave = SimSlave::new(SDA_PIN, SCL_PIN, 0x50);
    let (sda2, scl2) = (0x12u8, 0x13u8);

    engine
        .request_port(PortId::In1, SDA_PIN, SCL_PIN, &mut irqs)
        .unwrap();
    engine
        .request_port(PortId::In2, sda2, scl2, &mut irqs)
        .unwrap();

    let mut d1 = [0x10u8, 0x20];
    let mut m1 = [Message {
        addr: 0x50,
        dir: Dir::Write,
        data: &mut d1,
    }];
    let mut d2 = [0x30u8];
    let mut m2 = [Message {
        addr: 0x51,
        dir: Dir::Write,
        data: &mut d2,
    }];
    unsafe {
        engine.start_xfer(PortId::In1, &mut m1, on_complete, 0).unwrap();
        engine.start_xfer(PortId::In2, &mut m2, on_complete, 1).unwrap();
    }
    // A port with a transfer in flight rejects another start.
    let mut d3 = [0u8];
    let mut m3 = [Message {
        addr: 0x50,
        dir: Dir::Write,
        data: &mut d3,
    }];
    let err = unsafe { engine.start_xfer(PortId::In1, &mut m3, on_complete, 9) };
    assert_eq!(err, Err(Error::Busy));

    for _ in 0..4096 {
        engine.handle_tick();
        slave.poll(&mut gpio.borrow_mut());
        if engine.port_state(PortId::In1) == TransferState::Complete
            && engine.port_state(PortId::In2) == TransferState::Complete
        {
            break;
        }
    }
    assert_eq!(engine.port_state(PortId::In1), TransferState::Complete);
    assert_eq!(engine.port_state(PortId::In2), TransferState::Complete);

    // One status edge, one scan, both ports reaped.
    assert_eq!(engine.service_status_irq(), 2);
    assert_eq!(RESULTS[0].load(Ordering::SeqCst), XFER_OK);
    assert_eq!(RESULTS[1].load(Ordering::SeqCst), XFER_NO_ACK);
    assert_eq!(slave.written.as_slice(), &[0x10, 0x20]);
}

#[test]
fn complete_port_keeps_toggling_the_status_pin() {
    fn on_complete(_result: i32, _token: usize) {}

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let mut engine = init_engine(&gpio, &intc);
    let mut irqs = SimIrqServices::new();
    let mut slave = SimSlave::new(SDA_PIN, SCL_PIN, 0x50);

    engine
        .request_port(PortId::In1, SDA_PIN, SCL_PIN, &mut irqs)
        .unwrap();
    let mut data = [0x42u8];
    let mut msgs = [Message {
        addr: 0x50,
        dir: Dir::Write,
        data: &mut data,
    }];
    unsafe {
        engine
            .start_xfer(PortId::In1, &mut msgs, on_complete, 0)
            .unwrap();
    }
    run_to_complete(&mut engine, &gpio, &mut slave, PortId::In1);

    // Each further tick flips the shared status line, so the edge
    // interrupt cannot be missed.
    let mut levels = Vec::new();
    for _ in 0..4 {
        engine.handle_tick();
        levels.push(gpio.borrow().pin_is_high(STATUS_PIN));
    }
    assert!(levels.windows(2).all(|w| w[0] != w[1]));
    engine.service_status_irq();
    assert_eq!(engine.port_state(PortId::In1), TransferState::Idle);
}

#[test]
fn spurious_status_edge_is_counted_and_logged() {
    struct SharedSink<'a>(&'a RefCell<Vec<u8>>);

    impl embedded_io::ErrorType for SharedSink<'_> {
        type Error = core::convert::Infallible;
    }

    impl embedded_io::Write for SharedSink<'_> {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    let gpio = RefCell::new(SimGpio::new());
    let intc = RefCell::new(SimIntc::new());
    let log = RefCell::new(Vec::new());
    let mut engine = Engine::with_logger(
        &gpio,
        &intc,
        WriterLogger::new(SharedSink(&log), LogLevel::Warn),
    );
    engine.init(
        &EngineConfigBuilder::new()
            .timer_irq(TIMER_IRQ)
            .status_pin(STATUS_PIN)
            .status_irq(STATUS_IRQ)
            .build(),
    );

    // No port has completed, so the edge is spurious: nothing is serviced
    // and the service path logs the warning itself.
    assert_eq!(engine.service_status_irq(), 0);
    let log = log.borrow();
    assert!(log.starts_with(b"WRN: "));
    assert!(log.ends_with(b"\r\n"));
}
