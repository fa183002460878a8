//! # register-printer
//!
//! Receipt printer abstraction for the register.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Driver selection from register settings
//! - Raw spool printing (device node, named pipe or file)
//! - ESC/POS printing over USB, serial, network (TCP 9100) or file
//! - Capability checks with typed errors for unsupported operations
//!
//! WHAT to print (receipt layout, transaction totals) stays in register code.
//!
//! ## Example
//!
//! ```ignore
//! use register_printer::{PrintOptions, Printer};
//! use serde_json::json;
//!
//! let mut printer = Printer::from_value(json!({
//!     "spool": "192.168.1.100",
//!     "driver": "escpos",
//!     "interface": "network"
//! }))?;
//!
//! let style = json!({"font": "A", "align": "CENTER"});
//! printer.set(style.as_object().unwrap())?;
//! printer.print_line("Hello World!")?;
//! printer.cut(&PrintOptions::new())?;
//! ```

mod backend;
mod config;
mod encoding;
mod error;
mod escpos;
mod printer;
mod transport;

// Re-exports
pub use backend::{
    BARCODE_FIELDS, Backend, CUT_SEQUENCE, Capabilities, DEFAULT_DRAWER_PIN, KICK_SEQUENCE,
    Operation, PrinterBackend, ProtocolBackend, RawSpoolBackend,
};
pub use config::{
    DEFAULT_BAUD_RATE, DEFAULT_NETWORK_PORT, DEFAULT_TIMEOUT, DriverKind, InterfaceKind,
    PrintOptions, PrinterConfig,
};
pub use encoding::{TextEncoding, convert_to_gbk};
pub use error::{PrintError, PrintResult};
pub use escpos::{Barcode, CutMode, EscPosBuilder, QR_MAX_DATA, Symbology};
pub use printer::Printer;
pub use transport::{FileTransport, NetworkTransport, SerialTransport, Transport, UsbTransport};
