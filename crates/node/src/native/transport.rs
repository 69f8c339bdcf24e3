//! Ring transport over HTTP JSON-RPC.
use std::time::Duration;

use async_trait::async_trait;
use chordkv_core::dht::NodeRef;
use chordkv_core::error::Result as CoreResult;
use chordkv_core::message::Message;
use chordkv_core::message::MessageReport;
use chordkv_core::transport::Transport;

use crate::client::Client;
use crate::error::Error;
use crate::error::Result;
use crate::util::endpoint_url;

/// Posts every [Message] to the endpoint advertised by the target.
/// Connection failures and error statuses are reported as the target being unreachable.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` bounds connecting only. How long to wait for an answer is up to the ring
    /// client, lookups get more time than other calls.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::HttpRequestError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, target: &NodeRef, msg: Message) -> CoreResult<MessageReport> {
        let client = Client::with_http_client(self.client.clone(), &endpoint_url(&target.address));
        client.call(&msg).await.map_err(|e| {
            tracing::debug!("http call {} to {} failed: {}", msg.method(), target, e);
            e.into_core(target)
        })
    }
}
