//! CSV export of captured records.
//!
//! Files start with `# `-prefixed metadata lines followed by a header row, so
//! they stay readable by spreadsheet tools and by `csv` readers configured with
//! `comment(Some(b'#'))`.

use crate::controller::Trace;
use crate::error::Result;
use crate::subsystems::ChannelId;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

fn write_metadata<W: Write>(writer: &mut W, channel: ChannelId, samples: usize) -> Result<()> {
    writeln!(writer, "# source: {channel}")?;
    writeln!(writer, "# samples: {samples}")?;
    Ok(())
}

/// Write `trace` as `index,time_s,volts` rows.
pub fn write_trace_csv<W: Write>(trace: &Trace, mut writer: W) -> Result<()> {
    write_metadata(&mut writer, trace.channel, trace.len())?;

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["index", "time_s", "volts"])
        .map_err(io::Error::from)?;
    for (i, (time, volts)) in trace.times.iter().zip(&trace.volts).enumerate() {
        csv.write_record(&[i.to_string(), time.to_string(), volts.to_string()])
            .map_err(io::Error::from)?;
    }
    csv.flush()?;
    Ok(())
}

/// Write undecoded sample values as `index,value` rows.
pub fn write_samples_csv<W: Write>(
    channel: ChannelId,
    samples: &[f64],
    mut writer: W,
) -> Result<()> {
    write_metadata(&mut writer, channel, samples.len())?;

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["index", "value"]).map_err(io::Error::from)?;
    for (i, value) in samples.iter().enumerate() {
        csv.write_record(&[i.to_string(), value.to_string()])
            .map_err(io::Error::from)?;
    }
    csv.flush()?;
    Ok(())
}

/// Create `path` and write `trace` to it.
pub fn save_trace<P: AsRef<Path>>(trace: &Trace, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_trace_csv(trace, file)?;
    tracing::info!(path = %path.as_ref().display(), samples = trace.len(), "Trace written");
    Ok(())
}
