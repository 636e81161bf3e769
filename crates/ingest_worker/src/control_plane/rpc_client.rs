use crate::transport::frame_codec;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use common::domain::{DomainError, DomainResult, ProfilingNotification, ProfilingNotifier};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

pub const DEFAULT_CONTROL_PLANE_ADDR: &str = "127.0.0.1:43666";

const PROFILING_METHOD: &str = "profiling";
const MAX_REPLY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub method: &'a str,
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RpcReply {
    #[serde(default)]
    pub error: Option<Value>,
}

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// Request/reply client for the control-plane service
///
/// Holds at most one connection, opened on first use and dropped after any
/// transport failure so the next call reconnects.
pub struct ControlPlaneClient {
    addr: String,
    connection: Mutex<Option<Connection>>,
}

impl ControlPlaneClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connection: Mutex::new(None),
        }
    }

    /// Send one request and wait for its reply
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<RpcReply> {
        let request = serde_json::to_vec(&RpcRequest { method, args })
            .context("failed to encode rpc request")?;

        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .with_context(|| format!("failed to connect to control plane at {}", self.addr))?;
            debug!(addr = %self.addr, "control plane connected");
            *guard = Some(Framed::new(stream, frame_codec(MAX_REPLY_BYTES)));
        }

        let exchange = async {
            let connection = guard
                .as_mut()
                .ok_or_else(|| anyhow!("control plane connection missing"))?;
            connection
                .send(Bytes::from(request))
                .await
                .context("failed to send rpc request")?;
            let frame = connection
                .next()
                .await
                .ok_or_else(|| anyhow!("control plane closed the connection"))?
                .context("failed to read rpc reply")?;
            serde_json::from_slice::<RpcReply>(&frame).context("failed to decode rpc reply")
        }
        .await;

        if exchange.is_err() {
            *guard = None;
        }
        exchange
    }
}

#[async_trait]
impl ProfilingNotifier for ControlPlaneClient {
    async fn notify(&self, notification: ProfilingNotification) -> DomainResult<()> {
        let descriptor = serde_json::to_value(&notification)
            .map_err(|e| DomainError::NotificationFailed(e.to_string()))?;
        let args = vec![
            Value::String(notification.server_name.clone()),
            Value::String(notification.public_key.clone()),
            descriptor,
        ];

        let reply = self.call(PROFILING_METHOD, args).await.map_err(|e| {
            warn!(addr = %self.addr, error = %e, "control plane call failed");
            DomainError::NotificationFailed(format!("{:#}", e))
        })?;

        match reply.error {
            None | Some(Value::Null) => Ok(()),
            Some(error) => Err(DomainError::NotificationFailed(format!(
                "control plane replied with error: {}",
                error
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn notification() -> ProfilingNotification {
        ProfilingNotification {
            status: "success".to_string(),
            server_name: "n1".to_string(),
            public_key: "pk1".to_string(),
            name: Some("api".to_string()),
            pm_id: Some(json!(0)),
            heapdump: true,
            cpuprofile: false,
            file_name: "n1.pk1.api.0.heapsnapshot".to_string(),
            timestamp: 1_700_000_000_000,
        }
    }

    /// Serve `replies` in order on one connection, returning the received requests
    async fn serve(listener: TcpListener, replies: Vec<Value>) -> Vec<Value> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, frame_codec(MAX_REPLY_BYTES));
        let mut requests = Vec::new();
        for reply in replies {
            let frame = framed.next().await.unwrap().unwrap();
            requests.push(serde_json::from_slice(&frame).unwrap());
            framed
                .send(Bytes::from(serde_json::to_vec(&reply).unwrap()))
                .await
                .unwrap();
        }
        requests
    }

    #[tokio::test]
    async fn test_notify_sends_profiling_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, vec![json!({"error": null})]));

        let client = ControlPlaneClient::new(addr.to_string());
        client.notify(notification()).await.unwrap();

        let requests = server.await.unwrap();
        assert_eq!(requests[0]["method"], "profiling");
        assert_eq!(requests[0]["args"][0], "n1");
        assert_eq!(requests[0]["args"][1], "pk1");
        assert_eq!(requests[0]["args"][2]["file_name"], "n1.pk1.api.0.heapsnapshot");
        assert_eq!(requests[0]["args"][2]["status"], "success");
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            vec![json!({"error": null}), json!({"error": null})],
        ));

        let client = ControlPlaneClient::new(addr.to_string());
        client.notify(notification()).await.unwrap();
        client.notify(notification()).await.unwrap();

        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_reply_is_notification_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, vec![json!({"error": "unknown bucket"})]));

        let client = ControlPlaneClient::new(addr.to_string());
        let result = client.notify(notification()).await;

        assert!(matches!(result, Err(DomainError::NotificationFailed(msg)) if msg.contains("unknown bucket")));
    }

    #[tokio::test]
    async fn test_unreachable_control_plane() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlPlaneClient::new(addr.to_string());
        let result = client.notify(notification()).await;

        assert!(matches!(result, Err(DomainError::NotificationFailed(_))));
    }
}
