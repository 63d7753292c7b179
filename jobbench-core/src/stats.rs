use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::engine::EngineCounters;
use crate::error::Result;

pub const STATS_HEADER: &str = "timeStamp;nrOfProcessInstances;nrOfExecutions;nrOfTasks;nrOfAsyncJobs;nrOfTimerJobs;nrOfDeadLetterJobs;nrFinishedProcessInstances;nrFinishedTasks;nrOfFinishedHistoricActInstances";

const DELIMITER: char = ';';

/// One snapshot of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: SystemTime,
    pub counters: EngineCounters,
}

impl Sample {
    pub fn new(timestamp: SystemTime, counters: EngineCounters) -> Self {
        Self {
            timestamp,
            counters,
        }
    }

    /// Renders the sample as one delimited row (without line terminator).
    #[must_use]
    pub fn to_row(&self) -> String {
        let c = &self.counters;
        let fields = [
            c.process_instances,
            c.executions,
            c.tasks,
            c.async_jobs,
            c.timer_jobs,
            c.dead_letter_jobs,
            c.finished_process_instances,
            c.finished_tasks,
            c.finished_activities,
        ];

        let mut row = humantime::format_rfc3339_millis(self.timestamp).to_string();
        for v in fields {
            row.push(DELIMITER);
            row.push_str(&v.to_string());
        }
        row
    }
}

/// Append-only destination of sampled counters.
pub trait StatsSink: Send {
    fn append(&mut self, sample: &Sample) -> Result<()>;
}

/// Semicolon-delimited time series. The header is written once, on creation, and every row
/// is flushed as soon as it is written.
#[derive(Debug)]
pub struct DelimitedStatsSink<W: Write> {
    writer: W,
    rows: u64,
}

impl DelimitedStatsSink<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> DelimitedStatsSink<W> {
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{STATS_HEADER}")?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> StatsSink for DelimitedStatsSink<W> {
    fn append(&mut self, sample: &Sample) -> Result<()> {
        writeln!(self.writer, "{}", sample.to_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn counters(seed: u64) -> EngineCounters {
        EngineCounters {
            process_instances: seed,
            executions: seed * 2,
            tasks: 0,
            async_jobs: seed + 3,
            timer_jobs: 0,
            dead_letter_jobs: 1,
            finished_process_instances: 7,
            finished_tasks: 0,
            finished_activities: 203,
        }
    }

    #[test]
    fn header_is_written_once_and_first() {
        let mut sink = match DelimitedStatsSink::new(Vec::new()) {
            Ok(v) => v,
            Err(err) => panic!("sink: {err}"),
        };

        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for i in 0..3 {
            let sample = Sample::new(t0 + Duration::from_secs(30 * i), counters(i));
            if let Err(err) = sink.append(&sample) {
                panic!("append: {err}");
            }
        }
        assert_eq!(sink.rows(), 3);

        let text = String::from_utf8_lossy(&sink.into_inner()).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], STATS_HEADER);
        assert_eq!(text.matches(STATS_HEADER).count(), 1);

        for line in &lines[1..] {
            let fields: Vec<&str> = line.split(';').collect();
            assert_eq!(fields.len(), 10, "{line}");
            assert!(humantime::parse_rfc3339(fields[0]).is_ok(), "{line}");
            for f in &fields[1..] {
                assert!(f.parse::<u64>().is_ok(), "{line}");
            }
        }
    }

    #[test]
    fn row_keeps_column_order() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let row = Sample::new(t, counters(2)).to_row();
        assert_eq!(row, "2023-11-14T22:13:20.123Z;2;4;0;5;0;1;7;0;203");
    }

    #[test]
    fn create_writes_header_to_disk() {
        let dir = match tempfile::tempdir() {
            Ok(v) => v,
            Err(err) => panic!("tempdir: {err}"),
        };
        let path = dir.path().join("nested").join("output.txt");

        match DelimitedStatsSink::create(&path) {
            Ok(mut sink) => {
                let sample = Sample::new(SystemTime::now(), counters(1));
                if let Err(err) = sink.append(&sample) {
                    panic!("append: {err}");
                }
            }
            Err(err) => panic!("create: {err}"),
        }

        let text = std::fs::read_to_string(&path).unwrap_or_default();
        assert!(text.starts_with(STATS_HEADER));
        assert_eq!(text.lines().count(), 2);
    }
}
