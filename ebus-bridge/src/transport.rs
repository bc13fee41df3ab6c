//! Adapter transport: the byte-stream link to the TCP serial adapter.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::errors::TransportError;

/// Enhanced-protocol init handshake: the bridge writes this pair on
/// connect and expects the adapter to echo it back before any bus traffic
/// is trusted.
const INIT_REQUEST: [u8; 2] = [0xC0, 0x81];

/// A full-duplex byte-stream link to the serial adapter.
///
/// Implementations poll rather than block: `read_nonblocking` returns
/// `Ok(None)` rather than waiting when no byte is currently available, so
/// the link driver's single-threaded loop can also service the broker
/// collaborator without a dedicated reader thread.
pub trait AdapterTransport {
    /// Read one byte if one is immediately available.
    fn read_nonblocking(&mut self) -> Result<Option<u8>, TransportError>;

    /// Write raw bytes to the adapter.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// A TCP connection to the adapter, in non-blocking mode with Nagle
/// disabled (each enhanced-framed pair should hit the wire immediately).
pub struct TcpAdapterTransport {
    stream: TcpStream,
}

impl TcpAdapterTransport {
    /// Connect to `host:port`, disable Nagle, switch to non-blocking mode,
    /// then perform the adapter's init handshake (write `0xC0 0x81`, await
    /// its echo) within `deadline`.
    pub fn connect(host: &str, port: u16, deadline: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        let mut transport = Self { stream };
        transport.await_init(deadline)?;
        Ok(transport)
    }

    fn await_init(&mut self, deadline: Duration) -> Result<(), TransportError> {
        self.write(&INIT_REQUEST)?;
        let start = Instant::now();
        let mut echoed = Vec::with_capacity(INIT_REQUEST.len());
        while echoed.len() < INIT_REQUEST.len() {
            if start.elapsed() > deadline {
                return Err(TransportError::InitTimeout);
            }
            if let Some(byte) = self.read_nonblocking()? {
                echoed.push(byte);
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }
}

impl AdapterTransport for TcpAdapterTransport {
    fn read_nonblocking(&mut self) -> Result<Option<u8>, TransportError> {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(TransportError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "adapter closed connection"))),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }
}
