//! Transport abstraction
//!
//! A session runs over any reliable, ordered byte stream. The session needs
//! three handles on it: one for the inbound pump to read from, one for the
//! outbound pump to write to, and one to shut the connection down so both
//! pumps unblock. `try_clone` hands out the extra handles.
//!
//! Securing the stream (TLS and protocol negotiation) is the caller's job;
//! the session only sees bytes.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Byte stream a session runs over
pub trait Transport: Read + Write + Send + 'static {
    /// Another handle on the same connection
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;

    /// Shut the connection down in both directions
    ///
    /// Blocked reads and writes on every handle return once this is called.
    fn close(&self) -> io::Result<()>;
}

impl Transport for Box<dyn Transport> {
    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        (**self).try_clone()
    }

    fn close(&self) -> io::Result<()> {
        (**self).close()
    }
}

/// Plain TCP transport
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect with a timeout, trying each resolved address in turn
    ///
    /// TCP_NODELAY is set so small control frames are not held back.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> io::Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match Self::connect_addr(addr, timeout) {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    }

    fn connect_addr(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.connect_timeout(&addr.into(), timeout)?;
        Ok(TcpTransport {
            stream: socket.into(),
        })
    }

    /// Accept one connection from `listener`
    pub fn accept(listener: &TcpListener) -> io::Result<Self> {
        let (stream, peer) = listener.accept()?;
        debug!(%peer, "accepted connection");
        Self::from_stream(stream)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(TcpTransport { stream })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport {
            stream: self.stream.try_clone()?,
        }))
    }

    fn close(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            // already gone is as closed as it gets
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
