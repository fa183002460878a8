//! Error types for the printer library

use thiserror::Error;

/// Printer error types
///
/// Every failure a backend or transport can hit is translated into one of
/// these variants before it leaves the crate.
#[derive(Debug, Error)]
pub enum PrintError {
    /// Malformed construction input
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unknown driver token
    #[error("Printer driver \"{0}\" not supported")]
    UnsupportedDriver(String),

    /// The bound backend does not implement the requested operation
    #[error("Operation \"{operation}\" not supported by the {driver} driver")]
    UnsupportedOperation {
        operation: &'static str,
        driver: &'static str,
    },

    /// Spool target, device or socket could not be opened
    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    /// Barcode call without the full field set
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Option value the encoder cannot express
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Write attempted before `open()` (or after `close()`)
    #[error("Printer \"{0}\" is not open")]
    NotOpen(String),

    /// Write or encode failure on an already opened transport
    #[error("Transport error: {0}")]
    Transport(String),
}

impl PrintError {
    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{}: {}", context, err))
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_subject() {
        let e = PrintError::UnsupportedDriver("STAR".into());
        assert!(e.to_string().contains("STAR"));

        let e = PrintError::UnsupportedOperation {
            operation: "print_qr",
            driver: "raw-spool",
        };
        let msg = e.to_string();
        assert!(msg.contains("print_qr"));
        assert!(msg.contains("raw-spool"));

        let e = PrintError::PrinterNotFound("/dev/usb/lp9".into());
        assert!(e.to_string().contains("/dev/usb/lp9"));
    }
}
