// Licensed under the Apache-2.0 license

//! Common logging seam shared by the engine modules.
//!
//! Controllers carry a `Logger` type parameter (defaulting to [`NoOpLogger`])
//! so release builds pay nothing for diagnostics while development builds can
//! route messages to a UART-style sink through [`WriterLogger`].

/// Severity of a log message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Minimal logging interface.
///
/// Callable from normal and ordinary-interrupt context, so implementations
/// must not block. Never called from FIQ-equivalent context; the tick
/// handler does not log.
pub trait Logger {
    fn log(&mut self, level: LogLevel, msg: &str);

    fn warn(&mut self, msg: &str) {
        self.log(LogLevel::Warn, msg);
    }

    fn error(&mut self, msg: &str) {
        self.log(LogLevel::Error, msg);
    }
}

/// Logger that discards everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&mut self, _level: LogLevel, _msg: &str) {}
}

/// Logger writing line-oriented text to an `embedded_io::Write` sink,
/// typically a UART console.
pub struct WriterLogger<W: embedded_io::Write> {
    sink: W,
    min_level: LogLevel,
}

impl<W: embedded_io::Write> WriterLogger<W> {
    pub fn new(sink: W, min_level: LogLevel) -> Self {
        Self { sink, min_level }
    }

    pub fn release(self) -> W {
        self.sink
    }

    fn tag(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Debug => "DBG",
            LogLevel::Info => "INF",
            LogLevel::Warn => "WRN",
            LogLevel::Error => "ERR",
        }
    }
}

impl<W: embedded_io::Write> Logger for WriterLogger<W> {
    fn log(&mut self, level: LogLevel, msg: &str) {
        if level < self.min_level {
            return;
        }
        // Write errors on a diagnostic sink are not actionable here.
        let _ = self.sink.write_all(Self::tag(level).as_bytes());
        let _ = self.sink.write_all(b": ");
        let _ = self.sink.write_all(msg.as_bytes());
        let _ = self.sink.write_all(b"\r\n");
    }
}
