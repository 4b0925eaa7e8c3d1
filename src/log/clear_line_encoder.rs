//! Log lines written while the day-loop progress bar is drawn would otherwise leave the tail of
//! the bar on screen.

use log::Record;
use log4rs::encode::{Encode, Write};

const CLEAR_LINE: &[u8] = b"\x1B[2K\r";

/// Clears the current terminal line, then hands the record to the wrapped encoder.
#[derive(Debug)]
pub struct ClearLineEncoder {
    inner: Box<dyn Encode>,
}

impl ClearLineEncoder {
    pub fn new(inner: Box<dyn Encode>) -> Self {
        Self { inner }
    }
}

impl Encode for ClearLineEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> Result<(), anyhow::Error> {
        w.write_all(CLEAR_LINE)?;
        self.inner.encode(w, record)
    }
}
