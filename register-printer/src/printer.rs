//! Printer facade
//!
//! [`Printer`] is the only type register code needs: it resolves the driver
//! from configuration, binds exactly one backend for its whole lifetime and
//! checks the backend's capability table before every optional operation.

use std::path::Path;

use serde_json::Value;
use tracing::{info, instrument};

use crate::backend::{
    Backend, Capabilities, Operation, PrinterBackend, ProtocolBackend, RawSpoolBackend,
    unsupported,
};
use crate::config::{DriverKind, InterfaceKind, PrintOptions, PrinterConfig};
use crate::error::PrintResult;

/// Receipt printer handle
pub struct Printer {
    backend: Backend,
    driver: DriverKind,
    interface: Option<InterfaceKind>,
    spool: String,
}

impl Printer {
    /// Build a printer from normalised configuration
    ///
    /// The protocol driver opens its transport here; the raw-spool driver
    /// does no I/O until [`open`](Self::open).
    #[instrument(skip(config), fields(spool = %config.spool(), driver = %config.driver()))]
    pub fn new(config: PrinterConfig) -> PrintResult<Self> {
        let driver = DriverKind::parse(config.driver())?;

        let (backend, interface) = match driver {
            DriverKind::RawSpool => (
                Backend::from(RawSpoolBackend::new(config.spool())),
                None,
            ),
            DriverKind::Protocol => {
                let backend = ProtocolBackend::connect(&config)?;
                let interface = backend.interface();
                (Backend::from(backend), Some(interface))
            }
        };

        info!(%driver, "printer backend selected");
        Ok(Self {
            backend,
            driver,
            interface,
            spool: config.spool().to_string(),
        })
    }

    /// Build a printer from a settings value (bare spool string or record)
    pub fn from_value(settings: Value) -> PrintResult<Self> {
        Self::new(PrinterConfig::from_value(settings)?)
    }

    /// Build a printer from `PRINTER_CONFIG`
    pub fn from_env() -> PrintResult<Self> {
        Self::new(PrinterConfig::from_env()?)
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    /// Resolved interface, `None` for the raw-spool driver
    pub fn interface(&self) -> Option<InterfaceKind> {
        self.interface
    }

    pub fn spool(&self) -> &str {
        &self.spool
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.capabilities().supports(operation)
    }

    fn require(&self, operation: Operation) -> PrintResult<()> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(unsupported(self.driver, operation))
        }
    }

    pub fn open(&mut self) -> PrintResult<()> {
        self.require(Operation::Open)?;
        self.backend.open()
    }

    pub fn close(&mut self) -> PrintResult<()> {
        self.require(Operation::Close)?;
        self.backend.close()
    }

    pub fn print_line(&mut self, line: &str) -> PrintResult<()> {
        self.backend.print_line(line)
    }

    pub fn print_image(&mut self, path: impl AsRef<Path>) -> PrintResult<()> {
        self.require(Operation::PrintImage)?;
        self.backend.print_image(path.as_ref())
    }

    pub fn print_qr(&mut self, text: &str) -> PrintResult<()> {
        self.require(Operation::PrintQr)?;
        self.backend.print_qr(text)
    }

    /// Print a barcode; `fields` must hold `code, bc, width, height, pos, font`
    pub fn print_barcode(&mut self, fields: &PrintOptions) -> PrintResult<()> {
        self.require(Operation::PrintBarcode)?;
        self.backend.print_barcode(fields)
    }

    pub fn cut(&mut self, options: &PrintOptions) -> PrintResult<()> {
        self.backend.cut(options)
    }

    pub fn kick_drawer(&mut self, options: &PrintOptions) -> PrintResult<()> {
        self.backend.kick_drawer(options)
    }

    pub fn set(&mut self, options: &PrintOptions) -> PrintResult<()> {
        self.require(Operation::Set)?;
        self.backend.set(options)
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("driver", &self.driver)
            .field("interface", &self.interface)
            .field("spool", &self.spool)
            .finish()
    }
}
