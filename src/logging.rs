use env_logger::{Builder, Target};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::errors::{MeetingError, MeetingResult};

// The REPL owns the terminal, so records go to a file that can be followed from
// another shell. Each completed line is flushed straight away for that reason.
struct LineFlushingFile {
    inner: Mutex<BufWriter<File>>,
}

impl LineFlushingFile {
    fn new(file: File) -> Self {
        Self {
            inner: Mutex::new(BufWriter::new(file)),
        }
    }
}

impl Write for LineFlushingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let written = file.write(buf)?;
        if buf[..written].contains(&b'\n') {
            file.flush()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.flush()
    }
}

/// Installs the global logger. `RUST_LOG` overrides the default `info` filter.
///
/// With `log_file` set, records go to that file instead of stderr; the REPL owns
/// the terminal.
pub fn setup_logging(log_file: Option<&Path>) -> MeetingResult<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
        .filter(None, log::LevelFilter::Info)
        .parse_default_env();

    if let Some(path) = log_file {
        let file = File::create(path).map_err(|e| {
            MeetingError::Config(format!("cannot open log file {}: {}", path.display(), e))
        })?;
        builder.target(Target::Pipe(Box::new(LineFlushingFile::new(file))));
    }

    builder
        .try_init()
        .map_err(|e| MeetingError::Config(format!("logger already initialised: {}", e)))
}
