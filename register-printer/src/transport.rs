//! Blocking transports for the ESC/POS protocol backend
//!
//! Supports:
//! - USB printers addressed by `vendor:product` (hex ids)
//! - Serial ports
//! - Network printers (raw TCP, port 9100 by default)
//! - Plain files, for offline capture
//!
//! Every transport is opened once, at construction, and closed on drop.
//! Open failures map to [`PrintError::PrinterNotFound`], write failures
//! to [`PrintError::Transport`].

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use rusb::UsbContext;
use tracing::{debug, info, instrument, warn};

use crate::config::{InterfaceKind, PrinterConfig};
use crate::error::{PrintError, PrintResult};

/// An open connection to a printer
pub enum Transport {
    Usb(UsbTransport),
    Serial(SerialTransport),
    Network(NetworkTransport),
    File(FileTransport),
}

impl Transport {
    /// Open the transport selected by `interface` for the configured spool target
    pub fn open(interface: InterfaceKind, config: &PrinterConfig) -> PrintResult<Self> {
        match interface {
            InterfaceKind::Usb => {
                UsbTransport::open(config.spool(), config.timeout()).map(Self::Usb)
            }
            InterfaceKind::Serial => {
                SerialTransport::open(config.spool(), config.baud_rate(), config.timeout())
                    .map(Self::Serial)
            }
            InterfaceKind::Network => {
                NetworkTransport::connect(config.spool(), config.port(), config.timeout())
                    .map(Self::Network)
            }
            InterfaceKind::File => FileTransport::open(config.spool()).map(Self::File),
        }
    }

    pub fn kind(&self) -> InterfaceKind {
        match self {
            Self::Usb(_) => InterfaceKind::Usb,
            Self::Serial(_) => InterfaceKind::Serial,
            Self::Network(_) => InterfaceKind::Network,
            Self::File(_) => InterfaceKind::File,
        }
    }

    /// Send a complete command buffer
    pub fn send(&mut self, data: &[u8]) -> PrintResult<()> {
        let kind = self.kind();
        debug!(interface = %kind, data_len = data.len(), "sending");

        let result = match self {
            Self::Usb(t) => t.write_all(data).and_then(|_| t.flush()),
            Self::Serial(t) => t.port.write_all(data).and_then(|_| t.port.flush()),
            Self::Network(t) => t.stream.write_all(data).and_then(|_| t.stream.flush()),
            Self::File(t) => t.file.write_all(data).and_then(|_| t.file.flush()),
        };

        result.map_err(|e| PrintError::transport(&format!("{} write failed", kind), e))
    }
}

// ============================================================================
// USB
// ============================================================================

/// Printer class bulk endpoint used when the descriptor cannot be read
const DEFAULT_USB_OUT_ENDPOINT: u8 = 0x01;

/// USB printer claimed through libusb
pub struct UsbTransport {
    handle: rusb::DeviceHandle<rusb::Context>,
    interface: u8,
    endpoint: u8,
    timeout: Duration,
}

impl UsbTransport {
    /// Open a device addressed as `vendor:product`, e.g. `04b8:0202` or `0x04b8:0x0202`
    #[instrument(skip(timeout))]
    pub fn open(spool: &str, timeout: Duration) -> PrintResult<Self> {
        let (vendor_id, product_id) = parse_usb_id(spool)?;

        let context = rusb::Context::new()
            .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", spool, e)))?;
        let mut handle = context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or_else(|| PrintError::PrinterNotFound(spool.to_string()))?;

        let (interface, endpoint) = find_bulk_out(&handle.device()).unwrap_or_else(|| {
            warn!("no bulk OUT endpoint in descriptor, using default");
            (0, DEFAULT_USB_OUT_ENDPOINT)
        });

        // Not supported on every platform; the claim below reports real failures.
        let _ = handle.set_auto_detach_kernel_driver(true);

        handle
            .claim_interface(interface)
            .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", spool, e)))?;

        info!(interface, endpoint, "USB printer claimed");
        Ok(Self {
            handle,
            interface,
            endpoint,
            timeout,
        })
    }
}

impl Write for UsbTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.handle
            .write_bulk(self.endpoint, buf, self.timeout)
            .map_err(|e| match e {
                rusb::Error::Timeout => std::io::Error::new(std::io::ErrorKind::TimedOut, e),
                other => std::io::Error::other(other),
            })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!(error = %e, "failed to release USB interface");
        }
    }
}

fn parse_usb_id(spool: &str) -> PrintResult<(u16, u16)> {
    let invalid = || {
        PrintError::InvalidConfig(format!(
            "USB spool must be vendor:product in hex, got \"{}\"",
            spool
        ))
    };

    let (vendor, product) = spool.trim().split_once(':').ok_or_else(invalid)?;
    let parse = |s: &str| {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(s, 16).map_err(|_| invalid())
    };

    Ok((parse(vendor)?, parse(product)?))
}

fn find_bulk_out(device: &rusb::Device<rusb::Context>) -> Option<(u8, u8)> {
    let config = device.active_config_descriptor().ok()?;
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.direction() == rusb::Direction::Out
                    && endpoint.transfer_type() == rusb::TransferType::Bulk
                {
                    return Some((descriptor.interface_number(), endpoint.address()));
                }
            }
        }
    }
    None
}

// ============================================================================
// Serial
// ============================================================================

/// Serial port printer
pub struct SerialTransport {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SerialTransport {
    #[instrument(skip(timeout))]
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> PrintResult<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(timeout)
            .open()
            .map_err(|e| {
                warn!(error = %e, "failed to open serial port");
                PrintError::PrinterNotFound(format!("{}: {}", path, e))
            })?;

        info!("serial port opened");
        Ok(Self { port })
    }
}

// ============================================================================
// Network
// ============================================================================

/// Network printer (raw TCP)
///
/// Most thermal printers accept raw ESC/POS on port 9100.
pub struct NetworkTransport {
    addr: SocketAddr,
    stream: TcpStream,
}

impl NetworkTransport {
    /// Connect to `host` or `host:port`; `default_port` applies when no port is given
    #[instrument(skip(timeout))]
    pub fn connect(spool: &str, default_port: u16, timeout: Duration) -> PrintResult<Self> {
        let addrs = resolve(spool, default_port)?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(timeout))
                        .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", addr, e)))?;
                    info!(%addr, "connected to printer");
                    return Ok(Self { addr, stream });
                }
                Err(e) => {
                    warn!(%addr, error = %e, "connect failed");
                    last_error = Some(format!("{}: {}", addr, e));
                }
            }
        }

        Err(PrintError::PrinterNotFound(last_error.unwrap_or_else(|| {
            format!("{}: no addresses resolved", spool)
        })))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

fn resolve(spool: &str, default_port: u16) -> PrintResult<Vec<SocketAddr>> {
    let spool = spool.trim();
    if spool.is_empty() {
        return Err(PrintError::InvalidConfig(
            "network spool must name a host".to_string(),
        ));
    }

    // Literal addresses ("10.0.0.5:9100", "[::1]:9100") skip the resolver
    if let Ok(addr) = spool.parse::<SocketAddr>() {
        return Ok(vec![addr]);
    }
    if let Ok(ip) = spool.parse::<std::net::IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, default_port)]);
    }

    let (host, port) = match spool.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, port),
            Err(_) => (spool, default_port),
        },
        None => (spool, default_port),
    };

    // System resolver, not bounded by the configured timeout
    (host, port)
        .to_socket_addrs()
        .map(|addrs| addrs.collect())
        .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", spool, e)))
}

// ============================================================================
// File
// ============================================================================

/// Plain file sink
pub struct FileTransport {
    file: File,
}

impl FileTransport {
    #[instrument]
    pub fn open(path: &str) -> PrintResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| PrintError::PrinterNotFound(format!("{}: {}", path, e)))?;

        info!("capture file opened");
        Ok(Self { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("04b8:0202").unwrap(), (0x04b8, 0x0202));
        assert_eq!(parse_usb_id("0x0416:0X5011").unwrap(), (0x0416, 0x5011));
        assert!(matches!(
            parse_usb_id("/dev/usb/lp0"),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(matches!(
            parse_usb_id("zzzz:0001"),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_resolve_forms() {
        let addrs = resolve("192.168.1.100", 9100).unwrap();
        assert_eq!(addrs, vec!["192.168.1.100:9100".parse().unwrap()]);

        let addrs = resolve("192.168.1.100:9101", 9100).unwrap();
        assert_eq!(addrs[0].port(), 9101);

        let addrs = resolve("localhost:9102", 9100).unwrap();
        assert!(addrs.iter().all(|a| a.port() == 9102));

        assert!(matches!(resolve("  ", 9100), Err(PrintError::InvalidConfig(_))));
    }

    #[test]
    fn test_network_refused_is_not_found() {
        // Bind then drop to get a local port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = NetworkTransport::connect("127.0.0.1", port, Duration::from_millis(500));
        match result {
            Err(PrintError::PrinterNotFound(msg)) => assert!(msg.contains("127.0.0.1")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connect should fail"),
        }
    }

    #[test]
    fn test_network_send() {
        use std::io::Read;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).unwrap();
            buf
        });

        let mut transport = Transport::Network(
            NetworkTransport::connect(&addr.to_string(), 9100, Duration::from_secs(2)).unwrap(),
        );
        transport.send(b"Hello\n").unwrap();
        drop(transport);

        assert_eq!(reader.join().unwrap(), b"Hello\n");
    }

    #[test]
    fn test_file_open_missing_dir() {
        let result = FileTransport::open("/nonexistent-dir/capture.bin");
        assert!(matches!(result, Err(PrintError::PrinterNotFound(_))));
    }
}
