//! CoAP over reliable byte streams (RFC 8323), plain TCP or anything else
//! that reads and writes bytes, such as a TLS session.
use std::io::{self, Error, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use super::{RecvInfo, Transport, TransportKind};
use crate::config::PDU_SIZE_LIMIT;
use crate::error::Result;
use crate::framing;

/// Splits a byte stream into complete CoAP frames.
pub struct StreamCodec {
    max_frame: usize,
}

impl StreamCodec {
    pub fn new(max_frame: usize) -> StreamCodec {
        StreamCodec { max_frame }
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        StreamCodec::new(PDU_SIZE_LIMIT)
    }
}

impl Decoder for StreamCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<BytesMut>, io::Error> {
        let length = match framing::frame_length(buf) {
            Some(length) => length,
            None => return Ok(None),
        };
        if length > self.max_frame {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds {} bytes", length, self.max_frame),
            ));
        }
        if buf.len() < length {
            buf.reserve(length - buf.len());
            return Ok(None);
        }
        Ok(Some(buf.split_to(length)))
    }
}

impl Encoder<Vec<u8>> for StreamCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: Vec<u8>, buf: &mut BytesMut) -> std::result::Result<(), io::Error> {
        buf.extend_from_slice(&frame);
        Ok(())
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One connected stream peer.
pub struct StreamTransport {
    kind: TransportKind,
    local: SocketAddr,
    peer: SocketAddr,
    reader: Mutex<FramedRead<BoxedReader, StreamCodec>>,
    writer: Mutex<FramedWrite<BoxedWriter, StreamCodec>>,
}

impl StreamTransport {
    pub fn new<S>(stream: S, kind: TransportKind, local: SocketAddr, peer: SocketAddr) -> StreamTransport
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        StreamTransport {
            kind,
            local,
            peer,
            reader: Mutex::new(FramedRead::new(reader, StreamCodec::default())),
            writer: Mutex::new(FramedWrite::new(writer, StreamCodec::default())),
        }
    }

    pub fn from_tcp(stream: TcpStream) -> IoResult<StreamTransport> {
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(StreamTransport::new(stream, TransportKind::Tcp, local, peer))
    }

    pub async fn connect_tcp(peer: SocketAddr) -> IoResult<StreamTransport> {
        let stream = TcpStream::connect(peer).await?;
        StreamTransport::from_tcp(stream)
    }

    /// Waits at most `wait` for one peer on `listener`.
    pub async fn accept_tcp(listener: &TcpListener, wait: Duration) -> Result<StreamTransport> {
        let (stream, peer) = timeout(wait, listener.accept())
            .await
            .map_err(|_| crate::Error::Timeout("stream peer"))??;
        debug!("accepted stream peer {}", peer);
        Ok(StreamTransport::from_tcp(stream)?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// Opens a listening TCP socket with `SO_REUSEADDR` set.
pub fn bind_tcp(addr: SocketAddr) -> IoResult<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1)
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> IoResult<SocketAddr> {
        Ok(self.local)
    }

    async fn send_to(&self, buf: &[u8], _dst: &SocketAddr) -> IoResult<usize> {
        let mut writer = self.writer.lock().await;
        writer.send(buf.to_vec()).await?;
        Ok(buf.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> IoResult<RecvInfo> {
        let mut reader = self.reader.lock().await;
        let frame = match reader.next().await {
            Some(frame) => frame?,
            None => return Err(Error::new(ErrorKind::UnexpectedEof, "stream closed by peer")),
        };
        if frame.len() > buf.len() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("frame of {} bytes does not fit the receive buffer", frame.len()),
            ));
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(RecvInfo {
            len: frame.len(),
            remote: self.peer,
            local: Some(self.local),
        })
    }

    async fn close(&self) -> IoResult<()> {
        let mut writer = self.writer.lock().await;
        SinkExt::<Vec<u8>>::close(&mut *writer).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_codec_waits_for_complete_frame() {
        let mut codec = StreamCodec::default();
        let mut buf = BytesMut::from(&[0x31u8, 0x01][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0xAB, 0xB2, b'h', b'i', 0x00]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], &[0x31, 0x01, 0xAB, 0xB2, b'h', b'i']);
        // the next frame (empty body, no token) is still buffered
        assert_eq!(&buf[..], &[0x00]);
    }

    #[test]
    fn test_codec_rejects_oversized_frame() {
        let mut codec = StreamCodec::new(64);
        let mut buf = BytesMut::from(&[0xE0u8, 0x01, 0x00][..]);
        assert_err!(codec.decode(&mut buf));
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let client = StreamTransport::connect_tcp(addr).await.unwrap();
            client.send_to(&[0x00, 0x45], &addr).await.unwrap();
            client
        });

        let server = StreamTransport::accept_tcp(&listener, Duration::from_secs(5))
            .await
            .unwrap();
        let client = client.await.unwrap();

        let mut buf = [0u8; 32];
        let info = server.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..info.len], &[0x00, 0x45]);
        assert_eq!(info.remote, client.local_addr().unwrap());
        assert_eq!(server.kind(), TransportKind::Tcp);

        client.close().await.unwrap();
        assert_err!(server.recv(&mut buf).await);
    }

    #[tokio::test]
    async fn test_accept_times_out() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).unwrap();
        let result = StreamTransport::accept_tcp(&listener, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(crate::Error::Timeout(_))));
    }
}
