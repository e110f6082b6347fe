//! JSON results on stdout.

use std::io::Write;

use serde::Serialize;

/// Pretty-printed, for one-shot commands.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<(), crate::CliError> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// One compact line per value, for streams.
pub fn json_line<T: Serialize + ?Sized>(value: &T) -> Result<(), crate::CliError> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
