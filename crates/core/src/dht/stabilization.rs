//! Stabilization run daemons to maintain dht.

use std::sync::Arc;

use crate::dht::types::Chord;
use crate::dht::types::CorrectChord;
use crate::dht::NodeState;
use crate::dht::PeerRing;
use crate::dht::PeerRingAction;
use crate::dht::PeerRingRemoteAction;
use crate::dht::Router;
use crate::discovery::Bootstrapper;
use crate::error::Error;
use crate::error::Result;
use crate::transport::RingClient;

/// The stabilization runner.
#[derive(Clone)]
pub struct Stabilizer {
    dht: Arc<PeerRing>,
    client: Arc<RingClient>,
    router: Arc<Router>,
    bootstrapper: Option<Arc<Bootstrapper>>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(
        dht: Arc<PeerRing>,
        client: Arc<RingClient>,
        router: Arc<Router>,
        bootstrapper: Option<Arc<Bootstrapper>>,
    ) -> Self {
        Self {
            dht,
            client,
            router,
            bootstrapper,
        }
    }

    /// Run stabilization once.
    pub async fn stabilize(&self) -> Result<()> {
        if self.dht.state()? == NodeState::Leaving {
            return Ok(());
        }
        let tick = self.dht.begin_tick();
        tracing::debug!("STABILIZATION tick {} stabilize_successor start", tick);
        if let Err(e) = self.stabilize_successor().await {
            tracing::error!("[stabilize] Failed on stabilize successor {:?}", e);
        }
        tracing::debug!("STABILIZATION check_predecessor start");
        if let Err(e) = self.check_predecessor().await {
            tracing::error!("[stabilize] Failed on check predecessor {:?}", e);
        }
        tracing::debug!("STABILIZATION fix_fingers start");
        if let Err(e) = self.fix_fingers().await {
            tracing::error!("[stabilize] Failed on fix_finger {:?}", e);
        }
        tracing::debug!("STABILIZATION rejoin_if_isolated start");
        if let Err(e) = self.rejoin_if_isolated().await {
            tracing::error!("[stabilize] Failed on rejoin {:?}", e);
        }
        self.dht.try_activate()?;
        tracing::debug!("STABILIZATION end");
        Ok(())
    }

    /// Query successors in order for their topology, the first that answers becomes
    /// the head of the rebuilt successor list and is notified of us.
    pub async fn stabilize_successor(&self) -> Result<()> {
        let candidates = match self.dht.pre_stabilize()? {
            PeerRingAction::None => return Ok(()),
            PeerRingAction::RemoteAction(
                next,
                PeerRingRemoteAction::QueryForSuccessorListAndPred,
            ) => vec![next],
            PeerRingAction::MultiActions(acts) => acts
                .into_iter()
                .filter_map(|act| match act {
                    PeerRingAction::RemoteAction(
                        next,
                        PeerRingRemoteAction::QueryForSuccessorListAndPred,
                    ) => Some(next),
                    _ => None,
                })
                .collect(),
            act => return Err(Error::PeerRingUnexpectedAction(act)),
        };

        for head in candidates {
            let info = match self.client.query_topo_info(&head).await {
                Ok(info) => info,
                Err(Error::PeerUnreachable(_)) => continue,
                Err(e) => return Err(e),
            };
            if let PeerRingAction::RemoteAction(succ, PeerRingRemoteAction::Notify(me)) =
                self.dht.stabilize(head, info)?
            {
                tracing::debug!("STABILIZATION notify {}", succ);
                if let Err(e) = self.client.notify(&succ, me).await {
                    tracing::warn!("[stabilize] notify {} failed: {:?}", succ, e);
                }
            }
            return Ok(());
        }
        tracing::warn!("[stabilize] {} no successor answered", self.dht.id());
        Ok(())
    }

    /// Ping predecessor, clear it if it does not answer.
    pub async fn check_predecessor(&self) -> Result<()> {
        if let PeerRingAction::RemoteAction(pred, PeerRingRemoteAction::CheckPredecessor) =
            self.dht.check_predecessor()?
        {
            match self.client.ping(&pred).await {
                Ok(_) => {}
                Err(Error::PeerUnreachable(_)) => self.dht.clear_predecessor(pred.id)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fix fingers from finger table, this is a DHT operation.
    pub async fn fix_fingers(&self) -> Result<()> {
        match self.dht.fix_fingers()? {
            PeerRingAction::None => Ok(()),
            PeerRingAction::RemoteAction(_, PeerRingRemoteAction::FindSuccessorForFix(start)) => {
                tracing::debug!("STABILIZATION fix_fingers: {}", start);
                let found = self.router.find_successor(start).await?;
                if found.id != self.dht.id() {
                    self.dht.lock_finger()?.set_fix(found);
                }
                Ok(())
            }
            act => {
                tracing::error!("Invalid PeerRing Action");
                Err(Error::PeerRingUnexpectedAction(act))
            }
        }
    }

    /// A member that lost every pointer asks discovery for a way back in.
    pub async fn rejoin_if_isolated(&self) -> Result<()> {
        let Some(bootstrapper) = &self.bootstrapper else {
            return Ok(());
        };
        if !self.dht.is_isolated()? {
            return Ok(());
        }
        bootstrapper.rejoin().await?;
        Ok(())
    }
}

mod stabilizer {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::FutureExt;
    use futures::pin_mut;
    use futures::select;
    use futures_timer::Delay;

    use super::*;

    impl Stabilizer {
        /// Run stabilization in a loop.
        pub async fn wait(self: Arc<Self>, interval: Duration) {
            loop {
                let timeout = Delay::new(interval).fuse();
                pin_mut!(timeout);
                select! {
                    _ = timeout => self
                        .stabilize()
                        .await
                        .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
                }
            }
        }
    }
}
