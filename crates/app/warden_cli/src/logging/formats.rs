use std::io::Write;

use flexi_logger::{DeferredNow, style};
use log::Record;

/// `LEVEL message`, colored by level.
pub fn cli_format(
    w: &mut dyn Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    let level = record.level();
    write!(w, "{}", style(level).paint(format!("{level} {}", record.args())))
}
