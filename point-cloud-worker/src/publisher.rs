/// Delivery of result envelopes
use crate::envelope::JobEnvelope;
use std::io::{self, Write};
use std::sync::Mutex;

pub trait ResultPublisher: Send + Sync {
    fn publish(&self, envelope: &JobEnvelope) -> io::Result<()>;
}

/// Writes each envelope as one JSON line
pub struct JsonLinesPublisher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ResultPublisher for JsonLinesPublisher<W> {
    fn publish(&self, envelope: &JobEnvelope) -> io::Result<()> {
        let line = serde_json::to_vec(envelope)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("result writer lock poisoned"))?;
        out.write_all(&line)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}
