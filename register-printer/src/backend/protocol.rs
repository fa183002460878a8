//! ESC/POS protocol backend
//!
//! Encodes every operation with [`EscPosBuilder`] and writes it to a
//! [`Transport`] opened at construction. There is no `open`/`close`: the
//! transport lives as long as the backend.

#[cfg(feature = "image")]
use std::path::Path;

use serde_json::Value;
use tracing::{info, instrument, warn};

use super::{Capabilities, Operation, PrinterBackend};
use crate::config::{DriverKind, InterfaceKind, PrintOptions, PrinterConfig};
use crate::encoding::TextEncoding;
use crate::error::{PrintError, PrintResult};
use crate::escpos::{Barcode, CutMode, EscPosBuilder, QR_MODULE_SIZE};
use crate::transport::Transport;

/// Fields `print_barcode` requires, in command order
pub const BARCODE_FIELDS: [&str; 6] = ["code", "bc", "width", "height", "pos", "font"];

/// Drawer connector pulsed when no `pin` is given
pub const DEFAULT_DRAWER_PIN: u8 = 2;

/// Pulses sent per kick
const DRAWER_PULSES: usize = 2;

/// Backend speaking ESC/POS over USB, serial, network or file
pub struct ProtocolBackend {
    transport: Transport,
    encoding: TextEncoding,
}

impl ProtocolBackend {
    pub const CAPABILITIES: Capabilities = {
        let base = Capabilities::of(&[
            Operation::PrintLine,
            Operation::PrintQr,
            Operation::PrintBarcode,
            Operation::Cut,
            Operation::KickDrawer,
            Operation::Set,
        ]);
        if cfg!(feature = "image") {
            base.with(Operation::PrintImage)
        } else {
            base
        }
    };

    /// Open the transport named by the config's interface token
    #[instrument(skip(config), fields(spool = %config.spool(), interface = %config.interface()))]
    pub fn connect(config: &PrinterConfig) -> PrintResult<Self> {
        let interface = InterfaceKind::parse(config.interface())?;
        let transport = Transport::open(interface, config)?;
        info!("protocol printer ready");

        Ok(Self::with_transport(transport, config.encoding()))
    }

    pub fn with_transport(transport: Transport, encoding: TextEncoding) -> Self {
        Self {
            transport,
            encoding,
        }
    }

    pub fn interface(&self) -> InterfaceKind {
        self.transport.kind()
    }

    fn send(&mut self, builder: EscPosBuilder) -> PrintResult<()> {
        self.transport.send(&builder.build())
    }
}

impl PrinterBackend for ProtocolBackend {
    fn driver(&self) -> DriverKind {
        DriverKind::Protocol
    }

    fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    fn print_line(&mut self, line: &str) -> PrintResult<()> {
        let mut b = EscPosBuilder::new();
        b.text(&format!("{}\n", line), self.encoding);
        self.send(b)
    }

    #[cfg(feature = "image")]
    fn print_image(&mut self, path: &Path) -> PrintResult<()> {
        let mut b = EscPosBuilder::new();
        b.raster_image(path)?;
        self.send(b)
    }

    fn print_qr(&mut self, text: &str) -> PrintResult<()> {
        let mut b = EscPosBuilder::new();
        b.qr_code(text, QR_MODULE_SIZE)?;
        self.send(b)
    }

    fn print_barcode(&mut self, fields: &PrintOptions) -> PrintResult<()> {
        if BARCODE_FIELDS.iter().any(|key| !fields.contains_key(*key)) {
            return Err(PrintError::MissingArgument(format!(
                "all barcode arguments are required: {}",
                BARCODE_FIELDS.join(", ")
            )));
        }

        let barcode = Barcode::new(
            &fields["code"],
            &fields["bc"],
            &fields["width"],
            &fields["height"],
            &fields["pos"],
            &fields["font"],
        )?;

        let mut b = EscPosBuilder::new();
        b.barcode(&barcode);
        self.send(b)
    }

    fn cut(&mut self, options: &PrintOptions) -> PrintResult<()> {
        let mut mode = CutMode::default();
        let mut feed = true;

        for (key, value) in options {
            match (key.as_str(), value) {
                ("mode", Value::String(token)) => mode = CutMode::parse(token)?,
                ("feed", Value::Bool(flag)) => feed = *flag,
                _ => {
                    return Err(PrintError::InvalidArgument(format!(
                        "cut option {} = {}",
                        key, value
                    )));
                }
            }
        }

        let mut b = EscPosBuilder::new();
        b.cut(mode, feed);
        self.send(b)
    }

    fn kick_drawer(&mut self, options: &PrintOptions) -> PrintResult<()> {
        let pin = match options.get("pin") {
            None => DEFAULT_DRAWER_PIN,
            Some(value) => parse_pin(value)?,
        };
        if pin != 2 && pin != 5 {
            warn!(pin, "drawer pin outside 2/5, behaviour is hardware-defined");
        }

        for _ in 0..DRAWER_PULSES {
            let mut b = EscPosBuilder::new();
            b.cash_drawer(pin);
            self.send(b)?;
        }
        Ok(())
    }

    fn set(&mut self, options: &PrintOptions) -> PrintResult<()> {
        let mut b = EscPosBuilder::new();
        b.set(options)?;
        self.send(b)
    }
}

fn parse_pin(value: &Value) -> PrintResult<u8> {
    let pin = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    pin.and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| PrintError::InvalidArgument(format!("pin = {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_backend(dir: &TempDir) -> (ProtocolBackend, std::path::PathBuf) {
        let path = dir.path().join("capture.bin");
        let config = PrinterConfig::structured(path.to_string_lossy(), "escpos", "file");
        (ProtocolBackend::connect(&config).unwrap(), path)
    }

    fn options(value: Value) -> PrintOptions {
        value.as_object().cloned().unwrap()
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_print_line_appends_newline() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        backend.print_line("Hello").unwrap();
        drop(backend);

        assert_eq!(std::fs::read(&path).unwrap(), b"Hello\n");
    }

    #[test]
    fn test_kick_drawer_pulses_twice() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        backend.kick_drawer(&options(json!({"pin": 5}))).unwrap();
        drop(backend);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, vec![0x1B, b'p', 1, 25, 250, 0x1B, b'p', 1, 25, 250]);
    }

    #[test]
    fn test_kick_drawer_default_pin() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        backend.kick_drawer(&PrintOptions::new()).unwrap();
        drop(backend);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(count(&data, &[0x1B, b'p', 0, 25, 250]), 2);
        assert_eq!(data.len(), 10);
    }

    #[test]
    fn test_kick_drawer_rejects_non_numeric_pin() {
        let dir = TempDir::new().unwrap();
        let (mut backend, _) = file_backend(&dir);
        let result = backend.kick_drawer(&options(json!({"pin": "left"})));
        assert!(matches!(result, Err(PrintError::InvalidArgument(_))));
    }

    #[test]
    fn test_barcode_requires_every_field() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        let full = options(json!({
            "code": "4006381333931",
            "bc": "EAN13",
            "width": 3,
            "height": 64,
            "pos": "BELOW",
            "font": "A"
        }));

        for key in BARCODE_FIELDS {
            let mut partial = full.clone();
            partial.remove(key);
            match backend.print_barcode(&partial) {
                Err(PrintError::MissingArgument(msg)) => {
                    for field in BARCODE_FIELDS {
                        assert!(msg.contains(field));
                    }
                }
                other => panic!("missing {}: unexpected {:?}", key, other),
            }
        }
        assert!(matches!(
            backend.print_barcode(&PrintOptions::new()),
            Err(PrintError::MissingArgument(_))
        ));

        backend.print_barcode(&full).unwrap();
        drop(backend);
        let data = std::fs::read(&path).unwrap();
        assert!(data.ends_with(b"4006381333931\0"));
    }

    #[test]
    fn test_cut_options() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        backend.cut(&options(json!({"mode": "PART"}))).unwrap();
        backend.cut(&PrintOptions::new()).unwrap();
        assert!(matches!(
            backend.cut(&options(json!({"blade": 2}))),
            Err(PrintError::InvalidArgument(_))
        ));
        drop(backend);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(
            data,
            vec![0x1B, b'd', 6, 0x1D, b'V', 1, 0x1B, b'd', 6, 0x1D, b'V', 0]
        );
    }

    #[test]
    fn test_set_and_qr_reach_transport() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        backend
            .set(&options(json!({"font": "A", "align": "CENTER"})))
            .unwrap();
        backend.print_qr("ORDER-1042").unwrap();
        drop(backend);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(count(&data, &[0x1B, b'a', 1]), 1);
        assert_eq!(count(&data, &[0x1B, b'M', 0]), 1);
        assert_eq!(count(&data, b"ORDER-1042"), 1);
    }

    #[test]
    fn test_oversized_qr_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut backend, path) = file_backend(&dir);
        assert!(matches!(
            backend.print_qr(&"A".repeat(70_000)),
            Err(PrintError::InvalidArgument(_))
        ));
        assert!(matches!(
            backend.print_qr(""),
            Err(PrintError::InvalidArgument(_))
        ));
        drop(backend);

        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_interface() {
        let config = PrinterConfig::structured("/dev/rfcomm0", "escpos", "bluetooth");
        assert!(matches!(
            ProtocolBackend::connect(&config),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_file_interface_missing_directory() {
        let config =
            PrinterConfig::structured("/nonexistent-register/capture.bin", "escpos", "file");
        assert!(matches!(
            ProtocolBackend::connect(&config),
            Err(PrintError::PrinterNotFound(_))
        ));
    }

    #[test]
    fn test_usb_device_absent() {
        // Vendor 0xffff is reserved; no real device uses it.
        let config = PrinterConfig::structured("ffff:fffe", "escpos", "usb");
        assert!(matches!(
            ProtocolBackend::connect(&config),
            Err(PrintError::PrinterNotFound(_))
        ));
    }

    #[test]
    fn test_serial_port_absent() {
        let config = PrinterConfig::structured("/dev/ttyNOPE42", "escpos", "serial");
        assert!(matches!(
            ProtocolBackend::connect(&config),
            Err(PrintError::PrinterNotFound(_))
        ));
    }
}
