//! # Transport Layer
//!
//! TCP sockets, optional TLS wrapping, and address resolution.
//!
//! Socket options come from the [`Config`]: keepalive, send and receive
//! buffer sizes, and the listen backlog are applied when a socket is
//! created, Nagle's algorithm per accepted or connected stream. Hostnames
//! are resolved asynchronously and the first address is used.

pub mod tls;

use crate::config::Config;
use crate::error::{Result, WireError};
use crate::utils::timeout::DEFAULT_TIMEOUT;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsStream};
use tracing::debug;

/// One established byte stream, plain or TLS-wrapped.
pub enum Conn {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_flush(cx),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

async fn resolve(ip: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((ip, port)).await?;
    addrs.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{ip} did not resolve to any address"),
        )
    })
}

fn socket_for(addr: SocketAddr, config: &Config) -> io::Result<TcpSocket> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_keepalive(config.keep_alive)?;
    socket.set_send_buffer_size(config.socket_send_buff)?;
    socket.set_recv_buffer_size(config.socket_recv_buff)?;
    Ok(socket)
}

/// Bound listening socket, TLS-enabled when configured. Accepted streams
/// inherit the socket options applied at bind.
pub(crate) struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    pub(crate) async fn bind(config: &Config) -> Result<Self> {
        let bind_failed = |source: io::Error| WireError::Bind {
            addr: config.addr(),
            source,
        };

        let addr = resolve(&config.ip, config.port).await.map_err(bind_failed)?;
        let socket = socket_for(addr, config).map_err(bind_failed)?;
        socket.set_reuseaddr(true).map_err(bind_failed)?;
        socket.bind(addr).map_err(bind_failed)?;
        let inner = socket.listen(config.backlog).map_err(bind_failed)?;

        let tls = if config.ssl_enabled {
            Some(tls::acceptor(config)?)
        } else {
            None
        };

        Ok(Self { inner, tls })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    pub(crate) async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }

    pub(crate) fn tls(&self) -> Option<TlsAcceptor> {
        self.tls.clone()
    }
}

/// Establish an outbound connection per the configuration, TLS included.
pub(crate) async fn connect(config: &Config) -> Result<(Conn, SocketAddr)> {
    let connect_failed = |source: io::Error| WireError::Connect {
        addr: config.addr(),
        source,
    };

    let addr = resolve(&config.ip, config.port)
        .await
        .map_err(connect_failed)?;
    let socket = socket_for(addr, config).map_err(connect_failed)?;

    let stream = tokio::time::timeout(DEFAULT_TIMEOUT, socket.connect(addr))
        .await
        .map_err(|_| {
            connect_failed(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
        })?
        .map_err(connect_failed)?;
    stream.set_nodelay(config.tcp_no_delay).map_err(connect_failed)?;

    debug!(peer = %addr, tls = config.ssl_enabled, "stream established");

    let conn = if config.ssl_enabled {
        let tls_stream = tls::connect_tls(config, stream).await?;
        Conn::Tls(Box::new(tls_stream.into()))
    } else {
        Conn::Plain(stream)
    };
    Ok((conn, addr))
}
