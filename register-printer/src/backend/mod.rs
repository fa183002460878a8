//! Printer backends
//!
//! A backend drives one transport family. The set is closed: every
//! backend is a variant of [`Backend`], and each variant publishes a static
//! [`Capabilities`] table. Operations outside that table fall through to
//! the trait defaults, which report [`PrintError::UnsupportedOperation`].

use std::path::Path;

use enum_dispatch::enum_dispatch;

use crate::config::{DriverKind, PrintOptions};
use crate::error::{PrintError, PrintResult};

mod protocol;
mod raw_spool;

pub use protocol::{BARCODE_FIELDS, DEFAULT_DRAWER_PIN, ProtocolBackend};
pub use raw_spool::{CUT_SEQUENCE, KICK_SEQUENCE, RawSpoolBackend};

/// Operations of the printer contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Close,
    PrintLine,
    PrintImage,
    PrintQr,
    PrintBarcode,
    Cut,
    KickDrawer,
    Set,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Open,
        Operation::Close,
        Operation::PrintLine,
        Operation::PrintImage,
        Operation::PrintQr,
        Operation::PrintBarcode,
        Operation::Cut,
        Operation::KickDrawer,
        Operation::Set,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::PrintLine => "print_line",
            Self::PrintImage => "print_image",
            Self::PrintQr => "print_qr",
            Self::PrintBarcode => "print_barcode",
            Self::Cut => "cut",
            Self::KickDrawer => "kick_drawer",
            Self::Set => "set",
        }
    }

    /// Supported by every backend
    pub fn is_universal(&self) -> bool {
        matches!(self, Self::PrintLine | Self::Cut | Self::KickDrawer)
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Static capability table of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const fn of(ops: &[Operation]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ops.len() {
            bits |= ops[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn with(self, op: Operation) -> Self {
        Self(self.0 | op.bit())
    }

    pub const fn supports(&self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Operation> {
        Operation::ALL
            .into_iter()
            .filter(move |op| self.supports(*op))
    }
}

pub(crate) fn unsupported(driver: DriverKind, operation: Operation) -> PrintError {
    PrintError::UnsupportedOperation {
        operation: operation.as_str(),
        driver: driver.as_str(),
    }
}

/// The printer contract implemented by every backend
#[enum_dispatch]
pub trait PrinterBackend {
    fn driver(&self) -> DriverKind;

    fn capabilities(&self) -> Capabilities;

    fn open(&mut self) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::Open))
    }

    fn close(&mut self) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::Close))
    }

    fn print_line(&mut self, line: &str) -> PrintResult<()>;

    fn print_image(&mut self, _path: &Path) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::PrintImage))
    }

    fn print_qr(&mut self, _text: &str) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::PrintQr))
    }

    fn print_barcode(&mut self, _fields: &PrintOptions) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::PrintBarcode))
    }

    fn cut(&mut self, options: &PrintOptions) -> PrintResult<()>;

    fn kick_drawer(&mut self, options: &PrintOptions) -> PrintResult<()>;

    fn set(&mut self, _options: &PrintOptions) -> PrintResult<()> {
        Err(unsupported(self.driver(), Operation::Set))
    }
}

/// Backend bound to a printer handle
#[enum_dispatch(PrinterBackend)]
pub enum Backend {
    RawSpool(RawSpoolBackend),
    Protocol(ProtocolBackend),
}
