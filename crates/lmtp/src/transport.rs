//! Line Transport (spec.md §2 component 1): framed byte stream over a TCP or
//! Unix connection, yielding CRLF-terminated command lines and, during
//! `DATA`, a dot-stuffed body substream. Carries the TLS upgrade hook;
//! byte-level TLS negotiation itself is `tokio-rustls`'s problem, not ours.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::{server::TlsStream, TlsAcceptor};

use crate::reply::Reply;

/// Blanket-implemented marker so the transport can hold either a plain or a
/// TLS-upgraded socket behind one boxed value.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

const MAX_LINE_LEN: usize = 8192;

pub struct LineTransport {
    reader: BufReader<Box<dyn Connection>>,
}

/// One line yielded while reading a dot-stuffed body.
pub enum DotLine {
    Line(Vec<u8>),
    Done,
}

impl LineTransport {
    pub fn new(conn: Box<dyn Connection>) -> Self {
        LineTransport {
            reader: BufReader::new(conn),
        }
    }

    /// Read one CRLF-terminated command line, with the terminator stripped.
    /// Returns `Ok(None)` on clean EOF.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = self.reader.read(&mut byte).await?;
            if n == 0 {
                return if buf.is_empty() {
                    Ok(None)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-line",
                    ))
                };
            }
            if buf.len() >= MAX_LINE_LEN {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "command line too long"));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n") {
                buf.truncate(buf.len() - 2);
                return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
            }
        }
    }

    /// Read the next line of a dot-stuffed body (RFC 5321 §4.5.2): a bare
    /// `.` line signals `Done`; a leading `..` has one dot removed.
    pub async fn read_dot_line(&mut self) -> io::Result<DotLine> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let n = self.reader.read(&mut byte).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-body",
                ));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n") {
                buf.truncate(buf.len() - 2);
                break;
            }
        }
        if buf == b"." {
            return Ok(DotLine::Done);
        }
        if buf.starts_with(b".") {
            buf.remove(0);
        }
        buf.extend_from_slice(b"\r\n");
        Ok(DotLine::Line(buf))
    }

    pub async fn write_reply(&mut self, reply: &Reply) -> io::Result<()> {
        self.reader.get_mut().write_all(reply.render().as_bytes()).await?;
        self.reader.get_mut().flush().await
    }

    pub async fn write_raw(&mut self, text: &str) -> io::Result<()> {
        self.reader.get_mut().write_all(text.as_bytes()).await?;
        self.reader.get_mut().flush().await
    }

    /// Upgrade the transport to TLS in place, returning a fresh transport
    /// wrapping the upgraded stream plus a description of the negotiated
    /// cipher (spec.md §4.2 `STARTTLS`). Any bytes already buffered on the
    /// plaintext side are dropped: a client that pipelines commands past
    /// `STARTTLS` is violating RFC 3207, and honoring them would let
    /// plaintext-injected commands execute with the authority of the TLS
    /// session that follows.
    pub async fn upgrade_tls(self, acceptor: &TlsAcceptor) -> io::Result<(Self, String)> {
        let inner = self.reader.into_inner();
        let tls: TlsStream<Box<dyn Connection>> = match acceptor.accept(inner).await {
            Ok(tls) => tls,
            Err(err) => {
                trc::event!(trc::EventType::TlsFailed, "reason" => err.to_string()).log();
                return Err(err);
            }
        };
        let cipher_description = tls
            .get_ref()
            .1
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()))
            .unwrap_or_else(|| "unknown".to_string());
        trc::event!(trc::EventType::TlsStarted, "cipher" => cipher_description.clone()).log();
        Ok((LineTransport::new(Box::new(tls)), cipher_description))
    }
}
