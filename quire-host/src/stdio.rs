use parking_lot::Mutex;
use quire_bridge::{Session, ViewSink};
use std::io::{BufRead, ErrorKind, Write};

/// View endpoint that writes each event as one line of JSON.
///
/// Serialized events never contain raw newlines, so one line is one message.
pub struct LineSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send + 'static> LineSink<W> {
    pub fn new(out: W) -> Self {
        LineSink {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send + 'static> ViewSink for LineSink<W> {
    fn post(&self, message: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", message).and_then(|_| out.flush()) {
            log::warn!("Failed to write event to view: {}", e);
        }
    }
}

/// Feed every non-blank input line to `session` until EOF. Returns the number
/// of lines handed over. Lines that are not UTF-8 are dropped like any other
/// malformed message; only a failing input stream ends the pump early.
pub fn pump<R: BufRead>(mut input: R, session: &Session) -> Result<usize, String> {
    let mut handled = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(handled),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("Failed to read from view: {}", e)),
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                log::debug!("Dropping undecodable view message: {}", e);
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        session.handle_message(line);
        handled += 1;
    }
}
