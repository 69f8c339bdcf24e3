//! JSON-RPC client of a node endpoint, used by peers and by the CLI.

use chordkv_core::inspect::SwarmInspect;
use chordkv_core::message::DeleteValueSend;
use chordkv_core::message::GetValueSend;
use chordkv_core::message::Message;
use chordkv_core::message::MessageReport;
use chordkv_core::message::PutValueSend;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::error::Result;

/// Method name of the inspection call, next to the protocol methods.
pub const INSPECT_METHOD: &str = "inspect";

/// Wrap json_client send request between nodes.
#[derive(Clone)]
pub struct Client {
    client: HttpClient,
    endpoint_url: String,
}

impl Client {
    /// Creates a new Client instance with the specified endpoint URL
    pub fn new(endpoint_url: &str) -> Self {
        Self::with_http_client(HttpClient::default(), endpoint_url)
    }

    /// Share a connection pool between clients of different endpoints.
    pub fn with_http_client(client: HttpClient, endpoint_url: &str) -> Self {
        Self {
            client,
            endpoint_url: endpoint_url.to_string(),
        }
    }

    /// Call `method` on the endpoint and decode its result as `T`.
    /// `params` must be an object or null.
    pub async fn call_method<T>(&self, method: &str, params: serde_json::Value) -> Result<T>
    where T: DeserializeOwned {
        use jsonrpc_core::Call;
        use jsonrpc_core::Id;
        use jsonrpc_core::MethodCall;
        use jsonrpc_core::Params;
        use jsonrpc_core::Request;
        use jsonrpc_core::Version;

        let params = match params {
            serde_json::Value::Null => Params::None,
            serde_json::Value::Object(map) => Params::Map(map),
            _ => {
                return Err(Error::InvalidParams(
                    "params should be an object".to_string(),
                ))
            }
        };

        let jsonrpc_request = Request::Single(Call::MethodCall(MethodCall {
            jsonrpc: Some(Version::V2),
            method: method.to_string(),
            params,
            id: Id::Num(1),
        }));

        let result = self.do_jsonrpc_request(&jsonrpc_request).await?;
        serde_json::from_value(result).map_err(Error::SerdeJsonError)
    }

    async fn do_jsonrpc_request(&self, req: &jsonrpc_core::Request) -> Result<serde_json::Value> {
        let body = serde_json::to_string(req).map_err(Error::SerdeJsonError)?;

        let req = self
            .client
            .post(self.endpoint_url.as_str())
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(body);

        let resp = req
            .send()
            .await
            .map_err(|e| Error::HttpRequestError(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::HttpRequestError(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| Error::HttpRequestError(e.to_string()))?;

        let jsonrpc_resp = jsonrpc_core::Response::from_json(&String::from_utf8_lossy(&resp))
            .map_err(|_| Error::DecodeError)?;

        match jsonrpc_resp {
            jsonrpc_core::Response::Single(resp) => match resp {
                jsonrpc_core::Output::Success(success) => Ok(success.result),
                jsonrpc_core::Output::Failure(failure) => Err(Error::from_rpc(failure.error)),
            },
            jsonrpc_core::Response::Batch(_) => Err(Error::RemoteRpcError(
                "Batch response is not supported".to_string(),
            )),
        }
    }

    /// Deliver a protocol message.
    pub async fn call(&self, msg: &Message) -> Result<MessageReport> {
        self.call_method(msg.method(), msg.params()?).await
    }

    /// Store a value through the node.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let msg = Message::Put(PutValueSend {
            key: key.to_string(),
            value,
            forwarded: false,
        });
        Ok(self.call(&msg).await?.into_ack()?)
    }

    /// Read a value through the node.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let msg = Message::Get(GetValueSend {
            key: key.to_string(),
            forwarded: false,
        });
        Ok(self.call(&msg).await?.into_value()?)
    }

    /// Delete a value through the node, `false` if there was none.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let msg = Message::Delete(DeleteValueSend {
            key: key.to_string(),
            forwarded: false,
        });
        Ok(self.call(&msg).await?.into_removed()?)
    }

    /// Query for swarm inspect info.
    pub async fn inspect(&self) -> Result<SwarmInspect> {
        self.call_method(INSPECT_METHOD, serde_json::Value::Null)
            .await
    }
}
