use std::sync::Arc;
use std::time::Duration;

use crate::dht::NodeRef;
use crate::dht::RingId;
use crate::dht::RingSpace;
use crate::dht::SuccessorReader;
use crate::discovery::Discoverer;
use crate::error::Result;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;
use crate::transport::dummy::DummyHub;
use crate::transport::dummy::DummyTransport;

mod test_membership;
mod test_message_handler;
mod test_stabilization;
mod test_storage;

/// Every scenario runs on a modulo 128 ring.
pub const BITS: u8 = 7;

pub fn space() -> RingSpace {
    RingSpace::new(BITS).unwrap()
}

pub fn address(id: u64) -> String {
    format!("node{id}")
}

pub fn node_ref(id: u64) -> NodeRef {
    NodeRef::new(RingId::from(id), address(id))
}

pub fn builder(hub: &Arc<DummyHub>, id: u64) -> SwarmBuilder {
    SwarmBuilder::new(
        &address(id),
        &address(id),
        Arc::new(DummyTransport::new(hub.clone())),
    )
    .ring_bits(BITS)
    .local_id(RingId::from(id))
    .rpc_timeout(Duration::from_millis(500))
    .bootstrap_backoff(Duration::from_millis(1))
}

pub fn register(hub: &Arc<DummyHub>, swarm: Swarm) -> Arc<Swarm> {
    let swarm = Arc::new(swarm);
    hub.register(&swarm);
    swarm
}

pub fn prepare_node(hub: &Arc<DummyHub>, id: u64, factor: u8) -> Result<Arc<Swarm>> {
    Ok(register(hub, builder(hub, id).replication_factor(factor).build()?))
}

pub fn prepare_node_with_discoverer(
    hub: &Arc<DummyHub>,
    id: u64,
    discoverer: Arc<dyn Discoverer>,
) -> Result<Arc<Swarm>> {
    Ok(register(
        hub,
        builder(hub, id).discoverer(discoverer).build()?,
    ))
}

/// The first id creates the ring, the others join through it.
/// No stabilization has run yet.
pub async fn prepare_ring(hub: &Arc<DummyHub>, ids: &[u64], factor: u8) -> Result<Vec<Arc<Swarm>>> {
    let mut swarms = vec![];
    for id in ids {
        swarms.push(prepare_node(hub, *id, factor)?);
    }
    swarms[0].create()?;
    for s in swarms.iter().skip(1) {
        s.join(node_ref(ids[0])).await?;
    }
    Ok(swarms)
}

/// Stabilized ring, fingers included.
pub async fn prepare_stable_ring(
    hub: &Arc<DummyHub>,
    ids: &[u64],
    factor: u8,
) -> Result<Vec<Arc<Swarm>>> {
    let swarms = prepare_ring(hub, ids, factor).await?;
    stabilize_all(hub, &swarms, BITS as usize + 3).await?;
    replicate_all(hub, &swarms, 1).await?;
    Ok(swarms)
}

pub async fn stabilize_all(hub: &Arc<DummyHub>, swarms: &[Arc<Swarm>], rounds: usize) -> Result<()> {
    for _ in 0..rounds {
        for s in swarms.iter() {
            if hub.is_down(&s.local().address) {
                continue;
            }
            s.stabilizer().stabilize().await?;
        }
    }
    Ok(())
}

pub async fn replicate_all(hub: &Arc<DummyHub>, swarms: &[Arc<Swarm>], rounds: usize) -> Result<()> {
    for _ in 0..rounds {
        for s in swarms.iter() {
            if hub.is_down(&s.local().address) {
                continue;
            }
            s.replicator().replicate().await?;
        }
    }
    Ok(())
}

/// First key of the form `key{n}` hashing into `(start, end]`.
pub fn key_in(start: u64, end: u64) -> String {
    let space = space();
    (0..)
        .map(|i| format!("key{i}"))
        .find(|k| space.in_range_incl(space.hash(k), RingId::from(start), RingId::from(end)))
        .unwrap()
}

/// The member responsible for `id` among `ids`: first id >= `id` clockwise.
pub fn expected_owner(ids: &[u64], id: u64) -> u64 {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted
        .iter()
        .copied()
        .find(|x| *x >= id)
        .unwrap_or(sorted[0])
}

pub fn successor_ids(swarm: &Swarm) -> Vec<u64> {
    swarm
        .dht()
        .successors()
        .list()
        .unwrap()
        .into_iter()
        .map(|n| n.id.value())
        .collect()
}
