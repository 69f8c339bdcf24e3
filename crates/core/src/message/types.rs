#![warn(missing_docs)]
//! This module defines the message structures exchanged by ring members.
//! Every request is a `xxxSend` struct wrapped in [Message], every answer a [MessageReport].

use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeRef;
use crate::dht::RingId;
use crate::dht::TopoInfo;
use crate::error::Error;
use crate::error::Result;
use crate::storage::Entry;

/// MessageType use to find successor in a chord ring.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FindSuccessorSend {
    /// target id
    pub id: RingId,
    /// Hops the lookup may still take before it fails.
    pub hops: u32,
}

/// Ask for the predecessor.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct GetPredecessorSend {}

/// MessageType use notify the successor about the predecessor inferred by current node.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NotifyPredecessorSend {
    /// The node claiming to be predecessor.
    pub candidate: NodeRef,
}

/// Ask for the successor list.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct QueryForSuccessorListSend {}

/// Ask for predecessor and successor list in one round trip.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct QueryForTopoInfoSend {}

/// Store a value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PutValueSend {
    /// application key
    pub key: String,
    /// payload
    pub value: Vec<u8>,
    /// Sent by a member that already routed it, apply without routing again.
    #[serde(default)]
    pub forwarded: bool,
}

/// Read a value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GetValueSend {
    /// application key
    pub key: String,
    /// Sent by a member that already routed it, answer locally.
    #[serde(default)]
    pub forwarded: bool,
}

/// Delete a value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DeleteValueSend {
    /// application key
    pub key: String,
    /// Sent by a member that already routed it, apply without routing again.
    #[serde(default)]
    pub forwarded: bool,
}

/// Copy of an owned entry sent to a replica holder.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PushReplicaSend {
    /// application key
    pub key: String,
    /// versioned value
    pub entry: Entry,
}

/// Liveness check.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct PingSend {}

/// Pull entries whose key hashes into `(start, end]`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GetPartitionSend {
    /// exclusive
    pub start: RingId,
    /// inclusive
    pub end: RingId,
}

/// Merge a batch of entries.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SetPartitionSend {
    /// key and versioned value pairs
    pub entries: Vec<(String, Entry)>,
}

/// Ask for the cached coordinator.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Default)]
pub struct GetCoordinatorSend {}

/// A collection MessageType.
/// Serialized as `{"method": "findSuccessor", "params": {...}}`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
#[non_exhaustive]
pub enum Message {
    /// Remote message of find successor
    FindSuccessor(FindSuccessorSend),
    /// Remote message of get predecessor
    GetPredecessor(GetPredecessorSend),
    /// Remote message of notify a predecessor
    Notify(NotifyPredecessorSend),
    /// Remote message of get successor list
    GetSuccessorList(QueryForSuccessorListSend),
    /// Remote message of query topological info of a node.
    QueryTopoInfo(QueryForTopoInfoSend),
    /// Store a value through any member.
    Put(PutValueSend),
    /// Read a value through any member.
    Get(GetValueSend),
    /// Delete a value through any member.
    Delete(DeleteValueSend),
    /// Replicator to replicator write.
    PushReplica(PushReplicaSend),
    /// Liveness check.
    Ping(PingSend),
    /// Pull a key range.
    GetPartition(GetPartitionSend),
    /// Push a batch of entries.
    SetPartition(SetPartitionSend),
    /// Read the cached coordinator.
    GetCoordinator(GetCoordinatorSend),
}

impl Message {
    /// Wire names of all methods.
    pub const METHODS: [&'static str; 13] = [
        "findSuccessor",
        "getPredecessor",
        "notify",
        "getSuccessorList",
        "queryTopoInfo",
        "put",
        "get",
        "delete",
        "pushReplica",
        "ping",
        "getPartition",
        "setPartition",
        "getCoordinator",
    ];

    /// Wire name of this message.
    pub fn method(&self) -> &'static str {
        match self {
            Message::FindSuccessor(_) => "findSuccessor",
            Message::GetPredecessor(_) => "getPredecessor",
            Message::Notify(_) => "notify",
            Message::GetSuccessorList(_) => "getSuccessorList",
            Message::QueryTopoInfo(_) => "queryTopoInfo",
            Message::Put(_) => "put",
            Message::Get(_) => "get",
            Message::Delete(_) => "delete",
            Message::PushReplica(_) => "pushReplica",
            Message::Ping(_) => "ping",
            Message::GetPartition(_) => "getPartition",
            Message::SetPartition(_) => "setPartition",
            Message::GetCoordinator(_) => "getCoordinator",
        }
    }

    /// Rebuild a message from a method name and its params.
    /// Missing params are read as `{}`.
    pub fn from_method(method: &str, params: serde_json::Value) -> Result<Self> {
        let params = match params {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            p => p,
        };
        serde_json::from_value(serde_json::json!({
            "method": method,
            "params": params,
        }))
        .map_err(Error::Deserialize)
    }

    /// Params as a JSON value.
    pub fn params(&self) -> Result<serde_json::Value> {
        let mut v = serde_json::to_value(self).map_err(Error::Serialize)?;
        Ok(v
            .get_mut("params")
            .map(serde_json::Value::take)
            .unwrap_or_default())
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Answers of [Message].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
#[non_exhaustive]
pub enum MessageReport {
    /// Answer of `findSuccessor` and `ping`.
    Node(NodeRef),
    /// Answer of `getPredecessor` and `getCoordinator`.
    MaybeNode(Option<NodeRef>),
    /// Answer of `getSuccessorList`.
    Nodes(Vec<NodeRef>),
    /// Answer of `queryTopoInfo`.
    TopoInfo(TopoInfo),
    /// Answer of `get`, `None` is NotFound.
    Value(Option<Vec<u8>>),
    /// Answer of `delete`, `false` is NotFound.
    Removed(bool),
    /// Answer of `getPartition`.
    Entries(Vec<(String, Entry)>),
    /// Plain acknowledgement.
    Ack,
}

macro_rules! report_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Unwrap a [MessageReport::", stringify!($variant), "].")]
        pub fn $name(self) -> Result<$ty> {
            match self {
                MessageReport::$variant(v) => Ok(v),
                r => Err(Error::UnexpectedResponse(format!("{:?}", r))),
            }
        }
    };
}

impl MessageReport {
    report_getter!(into_node, Node, NodeRef);
    report_getter!(into_maybe_node, MaybeNode, Option<NodeRef>);
    report_getter!(into_nodes, Nodes, Vec<NodeRef>);
    report_getter!(into_topo_info, TopoInfo, TopoInfo);
    report_getter!(into_value, Value, Option<Vec<u8>>);
    report_getter!(into_removed, Removed, bool);
    report_getter!(into_entries, Entries, Vec<(String, Entry)>);

    /// Expect a [MessageReport::Ack].
    pub fn into_ack(self) -> Result<()> {
        match self {
            MessageReport::Ack => Ok(()),
            r => Err(Error::UnexpectedResponse(format!("{:?}", r))),
        }
    }
}
