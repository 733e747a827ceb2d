//! Iteration records and the sinks that receive them.
//!
//! Sinks only observe the solve. Nothing a sink does, including failing to write,
//! feeds back into the iterates.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Lines between repeated table headers.
const HEADER_PERIOD: usize = 25;

/// One row of iteration history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub objective_value: f64,
    pub gradient_norm: f64,
    /// Absent on iteration 0.
    pub step_length: Option<f64>,
    /// Absent on iteration 0.
    pub step_norm: Option<f64>,
}

/// Recoverable events the solver works around.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The line search found no decrease and the smallest step was taken anyway.
    LineSearchStalled {
        iteration: usize,
        attempts: usize,
        step_length: f64,
    },
    /// The BFGS update was refused and the previous matrix kept.
    UpdateSkipped {
        iteration: usize,
        curvature: f64,
        hessian_curvature: f64,
    },
    /// The approximate Hessian lost positive definiteness and was reset to `I`.
    HessianRestarted { iteration: usize },
}

pub trait IterationSink {
    fn record(&mut self, record: &IterationRecord);

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        log::trace!("[BFGS] unhandled diagnostic {:?}", diagnostic);
    }
}

impl IterationSink for () {
    fn record(&mut self, record: &IterationRecord) {
        log::trace!("[BFGS] iteration {} discarded", record.iteration);
    }
}

impl IterationSink for Vec<IterationRecord> {
    fn record(&mut self, record: &IterationRecord) {
        self.push(*record);
    }
}

impl<S: IterationSink + ?Sized> IterationSink for &mut S {
    fn record(&mut self, record: &IterationRecord) {
        (**self).record(record);
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        (**self).diagnostic(diagnostic);
    }
}

/// Keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<IterationRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl IterationSink for MemorySink {
    fn record(&mut self, record: &IterationRecord) {
        self.records.push(*record);
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.diagnostics.push(*diagnostic);
    }
}

/// Forwards records to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl IterationSink for LogSink {
    fn record(&mut self, record: &IterationRecord) {
        match (record.step_length, record.step_norm) {
            (Some(alpha), Some(step)) => log::info!(
                "[BFGS] iter={} f={:.6e} ||g||={:.3e} α={:.3e} ||Δx||={:.3e}",
                record.iteration,
                record.objective_value,
                record.gradient_norm,
                alpha,
                step
            ),
            (alpha, step) => log::info!(
                "[BFGS] iter={} f={:.6e} ||g||={:.3e} α={:?} ||Δx||={:?}",
                record.iteration,
                record.objective_value,
                record.gradient_norm,
                alpha,
                step
            ),
        }
    }

    // The solver already warns when these happen.
    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        log::debug!("[BFGS] {:?}", diagnostic);
    }
}

/// Fixed-width iteration table with a header every 25 iterations.
///
/// ```text
///
///  iter           fval      grad norm    step-length      step norm
///     0      2.45000e1      2.32750e2
///     1      5.25000e0      4.35000e1     1.25000e-1     3.75000e-1
/// ```
pub struct TableWriter<W: Write> {
    out: W,
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &IterationRecord) -> io::Result<()> {
        if record.iteration.is_multiple_of(HEADER_PERIOD) {
            writeln!(self.out)?;
            writeln!(
                self.out,
                "{:>5}{:>15}{:>15}{:>15}{:>15}",
                "iter", "fval", "grad norm", "step-length", "step norm"
            )?;
        }
        write!(
            self.out,
            "{:>5}{:>15.5e}{:>15.5e}",
            record.iteration, record.objective_value, record.gradient_norm
        )?;
        if let (Some(alpha), Some(step)) = (record.step_length, record.step_norm) {
            write!(self.out, "{:>15.5e}{:>15.5e}", alpha, step)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl TableWriter<BufWriter<File>> {
    /// Opens `path` for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> IterationSink for TableWriter<W> {
    fn record(&mut self, record: &IterationRecord) {
        if let Err(err) = self.write_record(record) {
            log::warn!(
                "[BFGS] failed to write iteration {} to the table: {}",
                record.iteration,
                err
            );
        }
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        log::debug!("[BFGS] {:?}", diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::{Diagnostic, IterationRecord, IterationSink, LogSink, MemorySink, TableWriter};
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::cell::RefCell;
    use std::io::{self, Write};

    thread_local! {
        static CAPTURED: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    // Keeps each test thread's log lines apart from the others.
    struct ThreadCapture;

    impl Log for ThreadCapture {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Trace
        }

        fn log(&self, record: &Record) {
            CAPTURED.with(|c| {
                c.borrow_mut()
                    .push((record.level(), format!("{}", record.args())))
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: ThreadCapture = ThreadCapture;

    fn captured_while(f: impl FnOnce()) -> Vec<(Level, String)> {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
        CAPTURED.with(|c| c.borrow_mut().clear());
        f();
        CAPTURED.with(|c| c.borrow_mut().drain(..).collect())
    }

    fn first() -> IterationRecord {
        IterationRecord {
            iteration: 0,
            objective_value: 24.5,
            gradient_norm: 232.75,
            step_length: None,
            step_norm: None,
        }
    }

    fn later(iteration: usize) -> IterationRecord {
        IterationRecord {
            iteration,
            objective_value: 5.25,
            gradient_norm: 43.5,
            step_length: Some(0.125),
            step_norm: Some(0.375),
        }
    }

    fn render(records: &[IterationRecord]) -> String {
        let mut table = TableWriter::new(Vec::new());
        for r in records {
            table.record(r);
        }
        String::from_utf8(table.into_inner()).unwrap()
    }

    #[test]
    fn table_starts_with_a_header_and_omits_steps_on_iteration_zero() {
        let text = render(&[first(), later(1)]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "");
        assert_eq!(
            lines[1],
            " iter           fval      grad norm    step-length      step norm"
        );
        assert_eq!(lines[2], "    0      2.45000e1      2.32750e2");
        assert_eq!(
            lines[3],
            "    1      5.25000e0      4.35000e1     1.25000e-1     3.75000e-1"
        );
    }

    #[test]
    fn header_repeats_every_twenty_five_iterations() {
        let records: Vec<IterationRecord> = std::iter::once(first())
            .chain((1..=50).map(later))
            .collect();
        let text = render(&records);
        assert_eq!(text.matches("step-length").count(), 3);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other(format!("refused {} bytes", buf.len())))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_do_not_panic() {
        let mut table = TableWriter::new(Broken);
        table.record(&first());
        table.record(&later(1));
    }

    #[test]
    fn sinks_do_not_repeat_solver_warnings() {
        let stall = Diagnostic::LineSearchStalled {
            iteration: 4,
            attempts: 100,
            step_length: 1e-30,
        };
        let lines = captured_while(|| {
            TableWriter::new(Vec::new()).diagnostic(&stall);
            LogSink.diagnostic(&stall);
        });
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|(level, _)| *level == Level::Debug));
    }

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::default();
        sink.record(&first());
        sink.diagnostic(&Diagnostic::HessianRestarted { iteration: 1 });
        sink.record(&later(1));
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[1].iteration, 1);
        assert_eq!(
            sink.diagnostics,
            vec![Diagnostic::HessianRestarted { iteration: 1 }]
        );
    }

    #[test]
    fn record_payload_marks_missing_steps_as_null() {
        let json = serde_json::to_value(first()).unwrap();
        assert_eq!(json["iteration"], 0);
        assert!(json["step_length"].is_null());
        assert!(json["step_norm"].is_null());

        let json = serde_json::to_value(Diagnostic::UpdateSkipped {
            iteration: 3,
            curvature: -1.0,
            hessian_curvature: 2.0,
        })
        .unwrap();
        assert_eq!(json["kind"], "update_skipped");
        assert_eq!(json["iteration"], 3);
    }
}
