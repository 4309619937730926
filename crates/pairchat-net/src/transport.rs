//! TCP transport helpers
//!
//! A connection is split into a framed reader and a writer task. Other
//! components talk to the writer through an [`OutboundLink`], which only
//! enqueues; the socket write itself happens on the writer task.

use crate::framing::{Frame, FrameCodec, FrameError};
use futures::SinkExt;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

/// Framed read half of a connection
pub type FrameReader = FramedRead<OwnedReadHalf, FrameCodec>;

/// Framed write half of a connection
pub type FrameWriter = FramedWrite<OwnedWriteHalf, FrameCodec>;

/// Link errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Split a stream into framed halves
pub fn framed(stream: TcpStream) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        FramedRead::new(read_half, FrameCodec::new()),
        FramedWrite::new(write_half, FrameCodec::new()),
    )
}

/// Non-blocking handle for queueing frames to one connection
#[derive(Clone, Debug)]
pub struct OutboundLink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl OutboundLink {
    /// Create a link and the receiver a writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame; fails once the writer task has stopped
    pub fn send(&self, frame: Frame) -> Result<(), LinkError> {
        self.tx.send(frame).map_err(|_| LinkError::ConnectionClosed)
    }
}

/// Spawn the writer task for a connection.
///
/// The task drains `rx` until every [`OutboundLink`] is dropped, so frames
/// queued before teardown are flushed. A write error ends the task early.
pub fn spawn_writer(
    mut writer: FrameWriter,
    mut rx: mpsc::UnboundedReceiver<Frame>,
) -> JoinHandle<Result<(), FrameError>> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            writer.send(frame).await?;
        }
        debug!("Writer drained, closing write half");
        SinkExt::<Frame>::close(&mut writer).await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::FrameType;
    use futures::StreamExt;
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    #[tokio::test]
    async fn test_writer_flushes_queue_before_close() {
        let (a, b) = socket_pair().await;
        let (_a_reader, a_writer) = framed(a);
        let (mut b_reader, _b_writer) = framed(b);

        let (link, rx) = OutboundLink::channel();
        let writer = spawn_writer(a_writer, rx);

        link.send(Frame::control("one")).unwrap();
        link.send(Frame::new(FrameType::Payload, vec![1, 2, 3])).unwrap();
        drop(link);

        writer.await.unwrap().unwrap();

        let first = b_reader.next().await.unwrap().unwrap();
        let second = b_reader.next().await.unwrap().unwrap();
        assert_eq!(first.text(), "one");
        assert_eq!(second.payload, vec![1, 2, 3]);
        assert!(b_reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_link_reports_closed_writer() {
        let (link, rx) = OutboundLink::channel();
        link.send(Frame::control("early")).unwrap();
        drop(rx);
        assert!(matches!(
            link.send(Frame::control("late")),
            Err(LinkError::ConnectionClosed)
        ));
    }
}
