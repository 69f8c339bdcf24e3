#![warn(missing_docs)]
//! Inbound side of the protocol: every [Message] a peer sends ends up here.

use async_trait::async_trait;

use crate::dht::types::Chord;
use crate::dht::types::CorrectChord;
use crate::dht::NodeState;
use crate::dht::SuccessorReader;
use crate::error::Error;
use crate::error::Result;
use crate::message::types::*;
use crate::swarm::Swarm;

/// Generic trait for handle message, inspired by Actor-Model.
#[async_trait]
pub trait HandleMsg<T> {
    /// Message handler.
    async fn handle(&self, msg: T) -> Result<MessageReport>;
}

impl Swarm {
    /// Answer a message sent by a peer.
    /// A node that left answers nothing, like a node that is gone.
    pub async fn handle_message(&self, msg: Message) -> Result<MessageReport> {
        if self.dht.state()? == NodeState::Leaving {
            return Err(Error::PeerUnreachable(self.dht.id()));
        }
        tracing::debug!("{} handle {}", self.dht.id(), msg.method());
        match msg {
            Message::FindSuccessor(m) => self.handle(m).await,
            Message::GetPredecessor(m) => self.handle(m).await,
            Message::Notify(m) => self.handle(m).await,
            Message::GetSuccessorList(m) => self.handle(m).await,
            Message::QueryTopoInfo(m) => self.handle(m).await,
            Message::Put(m) => self.handle(m).await,
            Message::Get(m) => self.handle(m).await,
            Message::Delete(m) => self.handle(m).await,
            Message::PushReplica(m) => self.handle(m).await,
            Message::Ping(m) => self.handle(m).await,
            Message::GetPartition(m) => self.handle(m).await,
            Message::SetPartition(m) => self.handle(m).await,
            Message::GetCoordinator(m) => self.handle(m).await,
        }
    }
}

#[async_trait]
impl HandleMsg<FindSuccessorSend> for Swarm {
    async fn handle(&self, msg: FindSuccessorSend) -> Result<MessageReport> {
        let found = self.router.route(msg.id, msg.hops).await?;
        Ok(MessageReport::Node(found))
    }
}

#[async_trait]
impl HandleMsg<GetPredecessorSend> for Swarm {
    async fn handle(&self, _msg: GetPredecessorSend) -> Result<MessageReport> {
        Ok(MessageReport::MaybeNode(self.dht.predecessor()?))
    }
}

#[async_trait]
impl HandleMsg<NotifyPredecessorSend> for Swarm {
    async fn handle(&self, msg: NotifyPredecessorSend) -> Result<MessageReport> {
        let current = self.dht.notify(msg.candidate)?;
        self.dht.try_activate()?;
        Ok(MessageReport::Node(current))
    }
}

#[async_trait]
impl HandleMsg<QueryForSuccessorListSend> for Swarm {
    async fn handle(&self, _msg: QueryForSuccessorListSend) -> Result<MessageReport> {
        Ok(MessageReport::Nodes(self.dht.successors().list()?))
    }
}

#[async_trait]
impl HandleMsg<QueryForTopoInfoSend> for Swarm {
    async fn handle(&self, _msg: QueryForTopoInfoSend) -> Result<MessageReport> {
        Ok(MessageReport::TopoInfo(self.dht.topo_info()?))
    }
}

#[async_trait]
impl HandleMsg<PutValueSend> for Swarm {
    async fn handle(&self, msg: PutValueSend) -> Result<MessageReport> {
        if msg.forwarded {
            self.put_local(&msg.key, msg.value).await?;
        } else {
            self.put(&msg.key, msg.value).await?;
        }
        Ok(MessageReport::Ack)
    }
}

#[async_trait]
impl HandleMsg<GetValueSend> for Swarm {
    async fn handle(&self, msg: GetValueSend) -> Result<MessageReport> {
        let value = if msg.forwarded {
            self.store.get(&msg.key).await?
        } else {
            self.get(&msg.key).await?
        };
        Ok(MessageReport::Value(value))
    }
}

#[async_trait]
impl HandleMsg<DeleteValueSend> for Swarm {
    async fn handle(&self, msg: DeleteValueSend) -> Result<MessageReport> {
        let removed = if msg.forwarded {
            self.delete_local(&msg.key).await?
        } else {
            self.delete(&msg.key).await?
        };
        Ok(MessageReport::Removed(removed))
    }
}

#[async_trait]
impl HandleMsg<PushReplicaSend> for Swarm {
    async fn handle(&self, msg: PushReplicaSend) -> Result<MessageReport> {
        self.store.apply(&msg.key, msg.entry).await?;
        Ok(MessageReport::Ack)
    }
}

#[async_trait]
impl HandleMsg<PingSend> for Swarm {
    async fn handle(&self, _msg: PingSend) -> Result<MessageReport> {
        Ok(MessageReport::Node(self.dht.local.clone()))
    }
}

#[async_trait]
impl HandleMsg<GetPartitionSend> for Swarm {
    async fn handle(&self, msg: GetPartitionSend) -> Result<MessageReport> {
        Ok(MessageReport::Entries(
            self.store.range(msg.start, msg.end).await?,
        ))
    }
}

#[async_trait]
impl HandleMsg<SetPartitionSend> for Swarm {
    async fn handle(&self, msg: SetPartitionSend) -> Result<MessageReport> {
        let n = self.store.apply_all(msg.entries).await?;
        tracing::debug!("[replicate] {} merged {} entries", self.dht.id(), n);
        Ok(MessageReport::Ack)
    }
}

#[async_trait]
impl HandleMsg<GetCoordinatorSend> for Swarm {
    async fn handle(&self, _msg: GetCoordinatorSend) -> Result<MessageReport> {
        Ok(MessageReport::MaybeNode(self.dht.coordinator()?))
    }
}
