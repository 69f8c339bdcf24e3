//! Serializable snapshots of a ring member, served by `GET /status` and the `inspect` command.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::NodeState;
use crate::dht::PeerRing;
use crate::dht::SuccessorReader;
use crate::error::Result;
use crate::swarm::Swarm;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmInspect {
    pub dht: DHTInspect,
    pub storage: StorageInspect,
    #[serde(default)]
    pub coordinator: Option<String>,
    pub caught_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DHTInspect {
    pub local: String,
    pub state: NodeState,
    pub successors: Vec<String>,
    #[serde(default)]
    pub predecessor: Option<String>,
    /// `(finger, first index, last index)`, consecutive equal entries folded.
    pub finger_table: Vec<(Option<String>, u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInspect {
    pub live: usize,
    pub tombstones: usize,
    /// Live or dead keys in `(predecessor, self]`.
    pub owned: usize,
}

impl SwarmInspect {
    pub async fn inspect(swarm: &Swarm) -> Result<Self> {
        let dht = DHTInspect::inspect(&swarm.dht)?;
        let storage = StorageInspect::inspect(swarm).await?;
        let coordinator = swarm.dht.coordinator()?.map(|c| c.to_string());
        Ok(Self {
            dht,
            storage,
            coordinator,
            caught_up: swarm.replicator.caught_up(),
        })
    }
}

impl DHTInspect {
    pub fn inspect(dht: &PeerRing) -> Result<Self> {
        let successors = dht
            .successors()
            .list()?
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let predecessor = dht.predecessor()?.map(|p| p.to_string());
        let finger_table = {
            let finger = dht.lock_finger()?;
            compress_iter(finger.list().iter().map(|x| x.as_ref().map(|n| n.to_string())))
        };

        Ok(Self {
            local: dht.local.to_string(),
            state: dht.state()?,
            successors,
            predecessor,
            finger_table,
        })
    }
}

impl StorageInspect {
    pub async fn inspect(swarm: &Swarm) -> Result<Self> {
        let (live, tombstones) = swarm.store.counts().await?;
        let mut owned = 0;
        for (key, _) in swarm.store.entries().await? {
            if swarm.dht.owns(swarm.store.key_id(&key))? {
                owned += 1;
            }
        }
        Ok(Self {
            live,
            tombstones,
            owned,
        })
    }
}

/// Run length encode an iterator into `(item, first index, last index)`.
pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result: Vec<(T, u64, u64)> = vec![];
    for (i, x) in iter.enumerate() {
        match result.last_mut() {
            Some((prev, _, end)) if *prev == x => *end = i as u64,
            _ => result.push((x, i as u64, i as u64)),
        }
    }
    result
}
