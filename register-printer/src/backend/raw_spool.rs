//! Raw-spool backend
//!
//! Writes bytes straight to a spool target: a device node, a named pipe or
//! a plain file. Cut and drawer kick use fixed control sequences understood
//! by the register's printer firmware.

use std::fs::{File, OpenOptions};
use std::io::Write;

use tracing::{debug, info, instrument};

use super::{Capabilities, Operation, PrinterBackend};
use crate::config::{DriverKind, PrintOptions};
use crate::error::{PrintError, PrintResult};

/// Newlines written before the cut command
const CUT_PADDING_LINES: usize = 8;

/// ESC i LF - Cut
pub const CUT_SEQUENCE: [u8; 3] = [0x1B, 0x69, 0x0A];

/// ESC p NUL '0' '0' LF - Drawer kick
pub const KICK_SEQUENCE: [u8; 6] = [0x1B, 0x70, 0x00, 0x30, b'0', 0x0A];

/// Backend writing raw bytes to a spool target
///
/// Nothing is opened at construction; call [`open`](PrinterBackend::open)
/// first. `close` is idempotent.
#[derive(Debug)]
pub struct RawSpoolBackend {
    spool: String,
    sink: Option<File>,
}

impl RawSpoolBackend {
    pub const CAPABILITIES: Capabilities = Capabilities::of(&[
        Operation::Open,
        Operation::Close,
        Operation::PrintLine,
        Operation::Cut,
        Operation::KickDrawer,
    ]);

    pub fn new(spool: impl Into<String>) -> Self {
        Self {
            spool: spool.into(),
            sink: None,
        }
    }

    pub fn spool(&self) -> &str {
        &self.spool
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| PrintError::NotOpen(self.spool.clone()))?;
        sink.write_all(bytes)
            .map_err(|e| PrintError::transport(&self.spool, e))
    }
}

impl PrinterBackend for RawSpoolBackend {
    fn driver(&self) -> DriverKind {
        DriverKind::RawSpool
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    #[instrument(skip(self), fields(spool = %self.spool))]
    fn open(&mut self) -> PrintResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.spool)
            .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", self.spool, e)))?;

        self.sink = Some(file);
        info!("spool opened");
        Ok(())
    }

    fn close(&mut self) -> PrintResult<()> {
        if self.sink.take().is_some() {
            info!(spool = %self.spool, "spool closed");
        }
        Ok(())
    }

    fn print_line(&mut self, line: &str) -> PrintResult<()> {
        self.write(line.as_bytes())
    }

    fn cut(&mut self, options: &PrintOptions) -> PrintResult<()> {
        if !options.is_empty() {
            debug!(?options, "raw-spool cut ignores options");
        }
        for _ in 0..CUT_PADDING_LINES {
            self.print_line("\n")?;
        }
        self.write(&CUT_SEQUENCE)
    }

    fn kick_drawer(&mut self, options: &PrintOptions) -> PrintResult<()> {
        if !options.is_empty() {
            debug!(?options, "raw-spool drawer kick has no pin selection");
        }
        self.write(&KICK_SEQUENCE)
    }
}

impl Drop for RawSpoolBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spool_in(dir: &TempDir) -> String {
        dir.path().join("spool").to_string_lossy().into_owned()
    }

    #[test]
    fn test_cut_bytes() {
        let dir = TempDir::new().unwrap();
        let path = spool_in(&dir);
        let mut backend = RawSpoolBackend::new(path.clone());
        backend.open().unwrap();
        backend.cut(&PrintOptions::new()).unwrap();
        backend.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..8], b"\n\n\n\n\n\n\n\n");
        assert_eq!(&data[8..], &[27, 105, 10]);
    }

    #[test]
    fn test_kick_bytes() {
        let dir = TempDir::new().unwrap();
        let path = spool_in(&dir);
        let mut backend = RawSpoolBackend::new(path.clone());
        backend.open().unwrap();
        backend.kick_drawer(&PrintOptions::new()).unwrap();
        backend.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![27, 112, 0, 48, 48, 10]);
    }

    #[test]
    fn test_print_line_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = spool_in(&dir);
        let mut backend = RawSpoolBackend::new(path.clone());
        backend.open().unwrap();
        backend.print_line("Milk 1.99").unwrap();
        backend.print_line("Eggs 3.49").unwrap();
        backend.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Milk 1.99Eggs 3.49");
    }

    #[test]
    fn test_open_missing_directory() {
        let mut backend = RawSpoolBackend::new("/nonexistent-register/lp0");
        match backend.open() {
            Err(PrintError::PrinterNotFound(msg)) => {
                assert!(msg.contains("/nonexistent-register/lp0"))
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!backend.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut backend = RawSpoolBackend::new(spool_in(&dir));
        backend.close().unwrap();
        backend.open().unwrap();
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(!backend.is_open());
    }

    #[test]
    fn test_write_before_open() {
        let mut backend = RawSpoolBackend::new("/tmp/never-opened");
        assert!(matches!(
            backend.print_line("x"),
            Err(PrintError::NotOpen(_))
        ));
    }

    #[test]
    fn test_unsupported_defaults() {
        let mut backend = RawSpoolBackend::new("/tmp/never-opened");
        match backend.print_qr("hello") {
            Err(PrintError::UnsupportedOperation { operation, driver }) => {
                assert_eq!(operation, "print_qr");
                assert_eq!(driver, "raw-spool");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
