//! Rendezvous through DNS: every member of a deployment answers to one alias.
use async_trait::async_trait;
use chordkv_core::dht::NodeRef;
use chordkv_core::dht::RingId;
use chordkv_core::discovery::Discoverer;
use chordkv_core::error::Error;
use chordkv_core::error::Result;

/// Resolves `rendezvous:port`, then appends the static seeds.
/// Ids of the candidates are placeholders, the bootstrap ping learns the real ones.
#[derive(Clone, Debug)]
pub struct DnsDiscoverer {
    rendezvous: Option<String>,
    port: u16,
    seeds: Vec<String>,
}

impl DnsDiscoverer {
    pub fn new(rendezvous: Option<String>, port: u16, seeds: Vec<String>) -> Self {
        Self {
            rendezvous,
            port,
            seeds,
        }
    }

    fn seed_refs(&self) -> Vec<NodeRef> {
        self.seeds
            .iter()
            .map(|s| NodeRef::new(RingId::from(0), s.as_str()))
            .collect()
    }
}

#[async_trait]
impl Discoverer for DnsDiscoverer {
    async fn discover(&self) -> Result<Vec<NodeRef>> {
        let Some(name) = &self.rendezvous else {
            return Ok(self.seed_refs());
        };

        let resolved = tokio::net::lookup_host((name.as_str(), self.port)).await;
        match resolved {
            Ok(addrs) => {
                let mut peers = addrs
                    .map(|a| NodeRef::new(RingId::from(0), a.to_string()))
                    .collect::<Vec<_>>();
                tracing::debug!("[bootstrap] {} resolved to {} peers", name, peers.len());
                peers.extend(self.seed_refs());
                Ok(peers)
            }
            Err(e) if !self.seeds.is_empty() => {
                tracing::warn!("[bootstrap] resolve {} failed: {}, use seeds", name, e);
                Ok(self.seed_refs())
            }
            Err(e) => Err(Error::Transport(format!("resolve {} failed: {}", name, e))),
        }
    }
}
