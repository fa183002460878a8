//! Printer configuration
//!
//! Two input shapes are accepted:
//!
//! - a bare string: the raw-spool target path (legacy register settings)
//! - a record: `{"spool": "...", "driver": "...", "interface": "..."}`
//!
//! Both normalise to one [`PrinterConfig`]. Driver and interface tokens are
//! compared upper-cased, so configuration is case-insensitive; the tokens
//! are kept as written for error messages.
//!
//! # Environment
//!
//! | Variable | Description |
//! |----------|-------------|
//! | PRINTER_CONFIG | JSON document (string or record) or a bare spool path |

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::encoding::TextEncoding;
use crate::error::{PrintError, PrintResult};

/// Open option map passed to `cut`, `kick_drawer`, `set` and `print_barcode`
pub type PrintOptions = serde_json::Map<String, Value>;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_NETWORK_PORT: u16 = 9100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend family selected by the `driver` token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Raw bytes to a spool file or device node
    RawSpool,
    /// ESC/POS encoder over USB, serial, network or file
    Protocol,
}

impl DriverKind {
    /// Resolve a driver token. `orthosie` and `escpos` are the legacy names.
    pub fn parse(token: &str) -> PrintResult<Self> {
        match token.trim().to_uppercase().as_str() {
            "RAW-SPOOL" | "RAW_SPOOL" | "ORTHOSIE" => Ok(Self::RawSpool),
            "PROTOCOL" | "ESCPOS" => Ok(Self::Protocol),
            _ => Err(PrintError::UnsupportedDriver(token.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawSpool => "raw-spool",
            Self::Protocol => "protocol",
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport family for the protocol backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    Usb,
    Serial,
    Network,
    File,
}

impl InterfaceKind {
    pub fn parse(token: &str) -> PrintResult<Self> {
        match token.trim().to_uppercase().as_str() {
            "USB" => Ok(Self::Usb),
            "SERIAL" => Ok(Self::Serial),
            "NETWORK" => Ok(Self::Network),
            "FILE" => Ok(Self::File),
            _ => Err(PrintError::InvalidConfig(format!(
                "Printer interface \"{}\" not supported",
                token
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Serial => "serial",
            Self::Network => "network",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record as it appears in settings
#[derive(Debug, Deserialize)]
struct ConfigRecord {
    spool: String,
    driver: String,
    #[serde(default)]
    interface: String,
    #[serde(default = "default_baud_rate")]
    baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    encoding: String,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_port() -> u16 {
    DEFAULT_NETWORK_PORT
}

/// Normalised printer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterConfig {
    spool: String,
    driver: String,
    interface: String,
    baud_rate: u32,
    timeout: Duration,
    port: u16,
    encoding: TextEncoding,
}

impl PrinterConfig {
    /// Legacy shape: a bare spool path printed through the raw-spool driver
    pub fn legacy(spool: impl Into<String>) -> Self {
        Self {
            spool: spool.into(),
            driver: "raw-spool".to_string(),
            interface: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            port: DEFAULT_NETWORK_PORT,
            encoding: TextEncoding::Utf8,
        }
    }

    /// Structured shape with default transport tuning
    pub fn structured(spool: impl Into<String>, driver: &str, interface: &str) -> Self {
        Self {
            spool: spool.into(),
            driver: driver.trim().to_string(),
            interface: interface.trim().to_string(),
            ..Self::legacy("")
        }
    }

    /// Normalise a settings value (JSON string or JSON object)
    pub fn from_value(value: Value) -> PrintResult<Self> {
        match value {
            Value::String(spool) => Ok(Self::legacy(spool)),
            Value::Object(_) => {
                let record: ConfigRecord = serde_json::from_value(value)
                    .map_err(|e| PrintError::InvalidConfig(e.to_string()))?;
                Self::from_record(record)
            }
            other => Err(PrintError::InvalidConfig(format!(
                "expected a spool path or a {{spool, driver, interface}} record, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> PrintResult<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| PrintError::InvalidConfig(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load from `PRINTER_CONFIG`, reading a `.env` file first if present
    ///
    /// A value starting with `{` or `"` is parsed as JSON, anything else is
    /// taken as a bare spool path.
    pub fn from_env() -> PrintResult<Self> {
        let _ = dotenv::dotenv();

        let raw = std::env::var("PRINTER_CONFIG")
            .map_err(|_| PrintError::InvalidConfig("PRINTER_CONFIG is not set".to_string()))?;
        Self::from_setting(&raw)
    }

    fn from_setting(raw: &str) -> PrintResult<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('"') {
            Self::from_json(trimmed)
        } else {
            Ok(Self::legacy(trimmed))
        }
    }

    fn from_record(record: ConfigRecord) -> PrintResult<Self> {
        if record.timeout_ms == 0 {
            return Err(zero_timeout());
        }

        Ok(Self {
            spool: record.spool,
            driver: record.driver.trim().to_string(),
            interface: record.interface.trim().to_string(),
            baud_rate: record.baud_rate,
            timeout: Duration::from_millis(record.timeout_ms),
            port: record.port,
            encoding: TextEncoding::parse(&record.encoding)?,
        })
    }

    /// Override the connect/write timeout; zero is rejected
    pub fn with_timeout(mut self, timeout: Duration) -> PrintResult<Self> {
        if timeout.is_zero() {
            return Err(zero_timeout());
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Spool target (path, device address or host)
    pub fn spool(&self) -> &str {
        &self.spool
    }

    /// Driver token as configured
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Interface token as configured, empty for the raw-spool driver
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}

impl From<&str> for PrinterConfig {
    fn from(spool: &str) -> Self {
        Self::legacy(spool)
    }
}

fn zero_timeout() -> PrintError {
    PrintError::InvalidConfig("timeout_ms must be greater than zero".to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
