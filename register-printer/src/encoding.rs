//! Text encoding for the ESC/POS protocol backend
//!
//! Receipt text arrives as UTF-8. Western printers take it as-is; Chinese
//! printers expect GBK. The GBK path keeps every ASCII byte (0x00-0x7F)
//! untouched so embedded ESC/POS commands survive the conversion.

use crate::error::{PrintError, PrintResult};
use tracing::instrument;

/// Text encoding applied to `print_line` payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Gbk,
}

impl TextEncoding {
    /// Parse a configuration token (case-insensitive)
    pub fn parse(token: &str) -> PrintResult<Self> {
        match token.trim().to_uppercase().as_str() {
            "" | "UTF-8" | "UTF8" => Ok(Self::Utf8),
            "GBK" => Ok(Self::Gbk),
            other => Err(PrintError::InvalidConfig(format!(
                "Unknown text encoding: {}",
                other
            ))),
        }
    }

    /// Encode text for the wire
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Gbk => convert_to_gbk(text.as_bytes()),
        }
    }
}

/// Convert mixed UTF-8 content (with ESC/POS commands) to GBK
///
/// Only bytes >= 0x80 are treated as UTF-8 sequences and converted.
/// Chinese mode is re-enabled after every INIT command (ESC @) and the
/// Euro sign is routed through code page PC858.
#[instrument(skip(bytes))]
pub fn convert_to_gbk(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len() * 2);

    // FS & - Enable Chinese mode, FS C 1 - Select GBK
    result.extend_from_slice(&[0x1C, 0x26, 0x1C, 0x43, 0x01]);

    let mut pending = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == 0x1B && bytes.get(i + 1) == Some(&0x40) {
            flush_pending(&mut pending, &mut result);
            result.extend_from_slice(&[0x1B, 0x40, 0x1C, 0x26]);
            i += 2;
            continue;
        }

        if b < 0x80 {
            flush_pending(&mut pending, &mut result);
            result.push(b);
        } else {
            pending.push(b);
        }
        i += 1;
    }

    flush_pending(&mut pending, &mut result);

    // FS . - Exit Chinese mode
    result.extend_from_slice(&[0x1C, 0x2E]);

    result
}

fn flush_pending(pending: &mut Vec<u8>, result: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }

    let s = String::from_utf8_lossy(pending);
    let parts: Vec<&str> = s.split('€').collect();

    for (idx, part) in parts.iter().enumerate() {
        if !part.is_empty() {
            let (gbk, _, _) = encoding_rs::GBK.encode(part);
            result.extend_from_slice(&gbk);
        }
        if idx < parts.len() - 1 {
            // Exit Chinese -> PC858 -> Euro -> Enter Chinese
            result.extend_from_slice(&[0x1C, 0x2E, 0x1B, 0x74, 19, 0xD5, 0x1C, 0x26]);
        }
    }
    pending.clear();
}
