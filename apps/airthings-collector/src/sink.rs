use crate::line_protocol;
use crate::record::MetricRecord;
use anyhow::{Context, Result};
use std::io::Write;

/// Receives the records of one successful collection cycle.
pub trait MetricSink {
    fn emit(&mut self, records: &[MetricRecord]) -> Result<()>;
}

impl MetricSink for Vec<MetricRecord> {
    fn emit(&mut self, records: &[MetricRecord]) -> Result<()> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// Writes records as InfluxDB line protocol, one line per record.
pub struct LineProtocolSink<W: Write> {
    out: W,
}

impl<W: Write> LineProtocolSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MetricSink for LineProtocolSink<W> {
    fn emit(&mut self, records: &[MetricRecord]) -> Result<()> {
        for record in records {
            match line_protocol::render(record) {
                Some(line) => {
                    writeln!(self.out, "{line}").context("failed to write metric line")?;
                }
                None => {
                    tracing::debug!(
                        device = record.tag("id").unwrap_or(""),
                        "record has no fields; not written as line protocol"
                    );
                }
            }
        }
        self.out.flush().context("failed to flush metric output")?;
        Ok(())
    }
}
