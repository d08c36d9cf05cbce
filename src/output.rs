use std::io::{self, Write};

use serde::Serialize;

use crate::batch::{BatchReport, ItemStatus, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_report(&mut stdout, report)
    }

    pub fn write_report<W: Write>(out: &mut W, report: &BatchReport) -> io::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        writeln!(out, "{cyan}{} summary{reset}", report.stage)?;
        for item in &report.items {
            match &item.status {
                ItemStatus::Succeeded => writeln!(out, "{green}  ok      {}{reset}", item.label())?,
                ItemStatus::Failed { reason } => {
                    writeln!(out, "{yellow}  failed  {}: {reason}{reset}", item.label())?
                }
                ItemStatus::Pending => writeln!(out, "  pending {}", item.label())?,
            }
            for (artifact, path) in &item.artifacts {
                writeln!(out, "          {artifact}: {path}")?;
            }
        }
        let color = if report.halted_early() { red } else { green };
        writeln!(out, "{color}{}{reset}", report.summary_line())
    }
}
