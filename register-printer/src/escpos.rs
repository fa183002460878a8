//! ESC/POS command encoder
//!
//! Fluent builder producing the byte sequences the protocol backend sends
//! to the transport. Each printer operation builds one short buffer; the
//! printer keeps its style state between buffers, so nothing here emits
//! an implicit INIT.

use std::path::Path;

use serde_json::Value;
use tracing::instrument;

use crate::config::PrintOptions;
use crate::encoding::TextEncoding;
use crate::error::{PrintError, PrintResult};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

/// Lines fed before a cut so the last printed line clears the blade
const CUT_FEED_LINES: u8 = 6;

/// Default QR module size in dots
pub const QR_MODULE_SIZE: u8 = 3;

/// Largest QR payload, in bytes (model 2, numeric, level L)
pub const QR_MAX_DATA: usize = 7089;

/// Widest raster image, in dots (58mm and 80mm heads)
#[cfg(feature = "image")]
const MAX_IMAGE_WIDTH: u32 = 384;

/// Paper cut mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CutMode {
    #[default]
    Full,
    Partial,
}

impl CutMode {
    pub fn parse(token: &str) -> PrintResult<Self> {
        match token.trim().to_uppercase().as_str() {
            "FULL" => Ok(Self::Full),
            "PART" | "PARTIAL" => Ok(Self::Partial),
            other => Err(PrintError::InvalidArgument(format!(
                "cut mode must be FULL or PART, got {}",
                other
            ))),
        }
    }
}

/// Barcode symbology (function A of GS k)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
}

impl Symbology {
    pub fn parse(token: &str) -> PrintResult<Self> {
        match token.trim().to_uppercase().as_str() {
            "UPC-A" | "UPCA" => Ok(Self::UpcA),
            "UPC-E" | "UPCE" => Ok(Self::UpcE),
            "EAN13" | "JAN13" => Ok(Self::Ean13),
            "EAN8" | "JAN8" => Ok(Self::Ean8),
            "CODE39" => Ok(Self::Code39),
            "ITF" => Ok(Self::Itf),
            "NW7" | "CODABAR" => Ok(Self::Codabar),
            other => Err(PrintError::InvalidArgument(format!(
                "unsupported barcode type: {}",
                other
            ))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::UpcA => 0,
            Self::UpcE => 1,
            Self::Ean13 => 2,
            Self::Ean8 => 3,
            Self::Code39 => 4,
            Self::Itf => 5,
            Self::Codabar => 6,
        }
    }

    fn numeric_only(&self) -> bool {
        matches!(
            self,
            Self::UpcA | Self::UpcE | Self::Ean13 | Self::Ean8 | Self::Itf
        )
    }
}

/// Fully resolved barcode command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub code: String,
    pub symbology: Symbology,
    pub width: u8,
    pub height: u8,
    /// HRI position: 0 off, 1 above, 2 below, 3 both
    pub position: u8,
    /// HRI font: 0 = A, 1 = B
    pub font: u8,
}

impl Barcode {
    /// Build from the six barcode fields, in order `code, bc, width, height, pos, font`
    pub fn new(
        code: &Value,
        bc: &Value,
        width: &Value,
        height: &Value,
        pos: &Value,
        font: &Value,
    ) -> PrintResult<Self> {
        let code = match code {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(invalid("code", other)),
        };
        let symbology = Symbology::parse(as_str("bc", bc)?)?;

        if code.is_empty() || code.contains('\0') {
            return Err(PrintError::InvalidArgument(
                "barcode code must be non-empty".to_string(),
            ));
        }
        if symbology.numeric_only() && !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(PrintError::InvalidArgument(format!(
                "{:?} barcodes take digits only, got {}",
                symbology, code
            )));
        }

        let width = as_int_in("width", width, 2, 6)?;
        let height = as_int_in("height", height, 1, 255)?;

        let position = match as_str("pos", pos)?.to_uppercase().as_str() {
            "OFF" => 0,
            "ABOVE" => 1,
            "BELOW" => 2,
            "BOTH" => 3,
            other => {
                return Err(PrintError::InvalidArgument(format!(
                    "pos must be OFF, ABOVE, BELOW or BOTH, got {}",
                    other
                )));
            }
        };
        let font = font_code(as_str("font", font)?)?;

        Ok(Self {
            code,
            symbology,
            width,
            height,
            position,
            font,
        })
    }
}

/// ESC/POS command builder
pub struct EscPosBuilder {
    buf: Vec<u8>,
}

impl EscPosBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    // === Text Output ===

    /// Write text in the given encoding
    pub fn text(&mut self, s: &str, encoding: TextEncoding) -> &mut Self {
        self.buf.extend_from_slice(&encoding.encode(s));
        self
    }

    /// ESC d n - Print and feed n lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, b'd', lines]);
        self
    }

    // === Style ===

    /// Apply a formatting option map
    ///
    /// Keys: `align`, `font`, `bold`, `underline`, `width`, `height`,
    /// `double_width`, `double_height`, `invert`, `flip`, `smooth`.
    pub fn set(&mut self, options: &PrintOptions) -> PrintResult<&mut Self> {
        let mut width: Option<u8> = None;
        let mut height: Option<u8> = None;

        for (key, value) in options {
            match key.as_str() {
                "align" => {
                    let n = match as_str(key, value)?.to_uppercase().as_str() {
                        "LEFT" => 0,
                        "CENTER" | "CENTRE" => 1,
                        "RIGHT" => 2,
                        _ => return Err(invalid(key, value)),
                    };
                    self.buf.extend_from_slice(&[ESC, b'a', n]);
                }
                "font" => {
                    let n = match value {
                        Value::Number(_) => as_int_in(key, value, 0, 1)?,
                        _ => font_code(as_str(key, value)?)?,
                    };
                    self.buf.extend_from_slice(&[ESC, b'M', n]);
                }
                "bold" => {
                    let n = as_flag(key, value)?;
                    self.buf.extend_from_slice(&[ESC, b'E', n]);
                }
                "underline" => {
                    let n = as_int_in(key, value, 0, 2)?;
                    self.buf.extend_from_slice(&[ESC, b'-', n]);
                }
                "width" => width = Some(as_int_in(key, value, 1, 8)?),
                "height" => height = Some(as_int_in(key, value, 1, 8)?),
                "double_width" => {
                    if as_flag(key, value)? == 1 {
                        width = Some(2);
                    }
                }
                "double_height" => {
                    if as_flag(key, value)? == 1 {
                        height = Some(2);
                    }
                }
                "invert" => {
                    let n = as_flag(key, value)?;
                    self.buf.extend_from_slice(&[GS, b'B', n]);
                }
                "flip" => {
                    let n = as_flag(key, value)?;
                    self.buf.extend_from_slice(&[ESC, b'{', n]);
                }
                "smooth" => {
                    let n = as_flag(key, value)?;
                    self.buf.extend_from_slice(&[GS, b'b', n]);
                }
                other => {
                    return Err(PrintError::InvalidArgument(format!(
                        "unknown formatting option: {}",
                        other
                    )));
                }
            }
        }

        if width.is_some() || height.is_some() {
            let w = width.unwrap_or(1) - 1;
            let h = height.unwrap_or(1) - 1;
            // GS ! n - Character size
            self.buf.extend_from_slice(&[GS, b'!', (w << 4) | h]);
        }

        Ok(self)
    }

    // === Paper Control ===

    /// Cut paper, optionally feeding first
    pub fn cut(&mut self, mode: CutMode, feed: bool) -> &mut Self {
        if feed {
            self.feed(CUT_FEED_LINES);
        }
        let m = match mode {
            CutMode::Full => 0x00,
            CutMode::Partial => 0x01,
        };
        // GS V m
        self.buf.extend_from_slice(&[GS, b'V', m]);
        self
    }

    // === Cash Drawer ===

    /// ESC p m t1 t2 - Pulse the drawer kick connector
    ///
    /// Pin 2 maps to m=0, pin 5 to m=1. Other values are sent as m unchanged.
    pub fn cash_drawer(&mut self, pin: u8) -> &mut Self {
        let m = match pin {
            2 => 0,
            5 => 1,
            other => other,
        };
        self.buf.extend_from_slice(&[ESC, b'p', m, 25, 250]);
        self
    }

    // === QR Code ===

    /// Print a native model 2 QR code, error correction level L
    ///
    /// Size: 1-16 (module size in dots). Payloads must be 1 to
    /// [`QR_MAX_DATA`] bytes.
    pub fn qr_code(&mut self, data: &str, size: u8) -> PrintResult<&mut Self> {
        let data_bytes = data.as_bytes();
        if data_bytes.is_empty() || data_bytes.len() > QR_MAX_DATA {
            return Err(PrintError::InvalidArgument(format!(
                "QR payload must be 1 to {} bytes, got {}",
                QR_MAX_DATA,
                data_bytes.len()
            )));
        }
        let size = size.clamp(1, 16);

        // Function 165: model 2
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);
        // Function 167: module size
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);
        // Function 169: error correction L
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x30]);

        // Function 180: store data
        let len = data_bytes.len() + 3;
        self.buf.extend_from_slice(&[
            GS,
            0x28,
            0x6B,
            (len & 0xFF) as u8,
            ((len >> 8) & 0xFF) as u8,
            0x31,
            0x50,
            0x30,
        ]);
        self.buf.extend_from_slice(data_bytes);

        // Function 181: print
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);
        Ok(self)
    }

    // === Barcode ===

    pub fn barcode(&mut self, barcode: &Barcode) -> &mut Self {
        self.buf.extend_from_slice(&[GS, b'h', barcode.height]);
        self.buf.extend_from_slice(&[GS, b'w', barcode.width]);
        self.buf.extend_from_slice(&[GS, b'H', barcode.position]);
        self.buf.extend_from_slice(&[GS, b'f', barcode.font]);
        self.buf
            .extend_from_slice(&[GS, b'k', barcode.symbology.code()]);
        self.buf.extend_from_slice(barcode.code.as_bytes());
        self.buf.push(0x00);
        self
    }

    // === Image ===

    /// Load an image and append it as GS v 0 raster data
    ///
    /// The image is scaled down to at most 384 dots wide and thresholded to
    /// 1 bit on luminance. Transparent pixels print white.
    #[cfg(feature = "image")]
    #[instrument(skip(self))]
    pub fn raster_image(&mut self, path: &Path) -> PrintResult<&mut Self> {
        use image::GenericImageView;

        let img = image::open(path)
            .map_err(|e| PrintError::transport(&format!("image {}", path.display()), e))?;

        let (w, h) = img.dimensions();
        let (new_w, new_h) = if w > MAX_IMAGE_WIDTH {
            let ratio = MAX_IMAGE_WIDTH as f64 / w as f64;
            (MAX_IMAGE_WIDTH, ((h as f64 * ratio) as u32).max(1))
        } else {
            (w, h)
        };
        if new_h > u32::from(u16::MAX) {
            return Err(PrintError::InvalidArgument(format!(
                "image {} is {} rows tall after scaling, at most {} fit a raster block",
                path.display(),
                new_h,
                u16::MAX
            )));
        }
        tracing::debug!(width = new_w, height = new_h, "rasterising image");

        let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Nearest);
        let rgba = resized.to_rgba8();
        let x_bytes = new_w.div_ceil(8);

        // GS v 0 m xL xH yL yH
        self.buf.extend_from_slice(&[
            GS,
            b'v',
            0x30,
            0x00,
            x_bytes as u8,
            (x_bytes >> 8) as u8,
            new_h as u8,
            (new_h >> 8) as u8,
        ]);

        for y in 0..new_h {
            for x_byte in 0..x_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = x_byte * 8 + bit;
                    if x >= new_w {
                        continue;
                    }
                    let pixel = rgba.get_pixel(x, y);
                    if pixel[3] < 128 {
                        continue;
                    }
                    let luma = 0.299 * pixel[0] as f32
                        + 0.587 * pixel[1] as f32
                        + 0.114 * pixel[2] as f32;
                    if luma < 128.0 {
                        byte |= 1 << (7 - bit);
                    }
                }
                self.buf.push(byte);
            }
        }

        self.buf.push(b'\n');
        Ok(self)
    }

    #[cfg(not(feature = "image"))]
    #[instrument(skip(self))]
    pub fn raster_image(&mut self, path: &Path) -> PrintResult<&mut Self> {
        Err(PrintError::Transport(format!(
            "image support not built: {}",
            path.display()
        )))
    }

    // === Build ===

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(key: &str, value: &Value) -> PrintError {
    PrintError::InvalidArgument(format!("{} = {}", key, value))
}

fn as_str<'a>(key: &str, value: &'a Value) -> PrintResult<&'a str> {
    value.as_str().ok_or_else(|| invalid(key, value))
}

fn as_flag(key: &str, value: &Value) -> PrintResult<u8> {
    match value {
        Value::Bool(b) => Ok(u8::from(*b)),
        Value::Number(_) => as_int_in(key, value, 0, 1),
        _ => Err(invalid(key, value)),
    }
}

fn as_int_in(key: &str, value: &Value, min: u8, max: u8) -> PrintResult<u8> {
    value
        .as_u64()
        .filter(|n| (min as u64..=max as u64).contains(n))
        .map(|n| n as u8)
        .ok_or_else(|| invalid(key, value))
}

fn font_code(token: &str) -> PrintResult<u8> {
    match token.trim().to_uppercase().as_str() {
        "A" => Ok(0),
        "B" => Ok(1),
        other => Err(PrintError::InvalidArgument(format!(
            "font must be A or B, got {}",
            other
        ))),
    }
}
