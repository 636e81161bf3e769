use crate::domain::InboundMessage;
use crate::transport::{frame_codec, InboundFrame};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Accepts agent connections and queues decoded frames for the ingest worker
pub struct PullListener {
    listener: TcpListener,
    max_frame_bytes: usize,
    sender: mpsc::Sender<InboundMessage>,
}

impl PullListener {
    pub async fn bind(
        addr: &str,
        max_frame_bytes: usize,
        sender: mpsc::Sender<InboundMessage>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind ingest listener on {}", addr))?;

        info!(addr = %listener.local_addr()?, "ingest listener bound");

        Ok(Self {
            listener,
            max_frame_bytes,
            sender,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("received shutdown signal, stopping ingest listener");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "agent connected");
                            connections.spawn(read_frames(
                                stream,
                                peer,
                                self.max_frame_bytes,
                                self.sender.clone(),
                                ctx.clone(),
                            ));
                        }
                        Err(e) => warn!(error = %e, "failed to accept connection"),
                    }
                }
            }
        }

        connections.close();
        connections.wait().await;
        Ok(())
    }
}

async fn read_frames(
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_bytes: usize,
    sender: mpsc::Sender<InboundMessage>,
    ctx: CancellationToken,
) {
    let mut frames = FramedRead::new(stream, frame_codec(max_frame_bytes));

    loop {
        let frame = tokio::select! {
            _ = ctx.cancelled() => break,
            frame = frames.next() => frame,
        };

        let body = match frame {
            Some(Ok(body)) => body.freeze(),
            Some(Err(e)) => {
                // Oversized or truncated frames leave the stream unsynchronised
                warn!(peer = %peer, error = %e, "dropping connection on frame error");
                break;
            }
            None => break,
        };

        let message = match InboundFrame::decode(body) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %peer, error = %e, "discarding malformed frame");
                continue;
            }
        };

        let queued = tokio::select! {
            _ = ctx.cancelled() => break,
            queued = sender.send(message) => queued,
        };
        if queued.is_err() {
            debug!(peer = %peer, "ingest queue closed");
            break;
        }
    }

    debug!(peer = %peer, "agent disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::SinkExt;
    use tokio_util::codec::FramedWrite;

    #[tokio::test]
    async fn test_frames_are_queued_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let listener = PullListener::bind("127.0.0.1:0", 1024, tx).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = CancellationToken::new();
        let handle = tokio::spawn(listener.run(ctx.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut writer = FramedWrite::new(stream, frame_codec(1024));
        writer
            .send(InboundFrame::encode(&InboundMessage::new(
                &b"{\"n\":1}"[..],
                Bytes::new(),
            )))
            .await
            .unwrap();
        writer
            .send(Bytes::from_static(b"\x00\x00\x00\x63{}"))
            .await
            .unwrap();
        writer
            .send(InboundFrame::encode(&InboundMessage::new(
                &b"{\"n\":2}"[..],
                &b"heap"[..],
            )))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(&first.header[..], b"{\"n\":1}");
        assert_eq!(&second.header[..], b"{\"n\":2}");
        assert_eq!(&second.attachment[..], b"heap");

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let (tx, _rx) = mpsc::channel(1);
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let result = PullListener::bind(&addr, 1024, tx).await;

        assert!(result.is_err());
    }
}
