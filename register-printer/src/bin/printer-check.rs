//! printer-check: print a test slip on the configured receipt printer
//!
//! Reads `PRINTER_CONFIG` (environment or `.env`), prints a short slip and
//! cuts. Pass `--kick` to also open the cash drawer.
//!
//! ```ignore
//! PRINTER_CONFIG='{"spool":"/tmp/slip.bin","driver":"escpos","interface":"file"}' \
//!     cargo run --bin printer-check -- --kick
//! ```

use register_printer::{DriverKind, Operation, PrintOptions, Printer};
use serde_json::json;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "register_printer=info,printer_check=info".into()),
        )
        .init();

    let kick = std::env::args().skip(1).any(|arg| arg == "--kick");

    let mut printer = Printer::from_env()?;
    tracing::info!(?printer, "printer configured");

    if printer.supports(Operation::Open) {
        printer.open()?;
    }

    let result = print_slip(&mut printer, kick);

    // Release the spool even when printing failed
    if printer.supports(Operation::Close) {
        printer.close()?;
    }

    result?;
    tracing::info!("test slip printed");
    Ok(())
}

fn print_slip(printer: &mut Printer, kick: bool) -> Result<(), BoxError> {
    if printer.supports(Operation::Set) {
        printer.set(&options(json!({"align": "center", "bold": true})))?;
    }
    line(printer, "PRINTER CHECK")?;

    if printer.supports(Operation::Set) {
        printer.set(&options(json!({"align": "left", "bold": false})))?;
    }
    let driver = format!("driver: {}", printer.driver());
    line(printer, &driver)?;
    if let Some(interface) = printer.interface() {
        line(printer, &format!("interface: {}", interface))?;
    }

    if printer.supports(Operation::PrintQr) {
        printer.print_qr("register-printer")?;
    }

    printer.cut(&PrintOptions::new())?;

    if kick {
        printer.kick_drawer(&PrintOptions::new())?;
    }
    Ok(())
}

/// The raw-spool driver writes lines verbatim; ESC/POS appends the newline
fn line(printer: &mut Printer, text: &str) -> Result<(), BoxError> {
    match printer.driver() {
        DriverKind::RawSpool => printer.print_line(&format!("{}\n", text))?,
        DriverKind::Protocol => printer.print_line(text)?,
    }
    Ok(())
}

fn options(value: serde_json::Value) -> PrintOptions {
    match value {
        serde_json::Value::Object(map) => map,
        _ => PrintOptions::new(),
    }
}
