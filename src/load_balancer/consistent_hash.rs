//! Consistent hashing strategy.
//!
//! Each backend is placed on a SHA-256 ring at `replicas` virtual points.
//! A client key maps to the first point at or after its own hash, so
//! adding or removing one backend only moves the keys adjacent to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::endpoint::Balance;
use crate::load_balancer::{backend::Backend, LoadBalance};

#[derive(Debug)]
pub struct ConsistentHash {
    backends: Vec<Arc<Backend>>,
    ring: BTreeMap<u64, usize>,
}

impl ConsistentHash {
    pub fn new(backends: Vec<Arc<Backend>>, replicas: usize) -> Self {
        let mut ring = BTreeMap::new();
        for (index, backend) in backends.iter().enumerate() {
            for replica in 0..replicas.max(1) {
                ring.insert(hash(&format!("{}#{}", backend.addr, replica)), index);
            }
        }
        Self { backends, ring }
    }
}

fn hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

impl LoadBalance for ConsistentHash {
    fn select(&self, client_key: &str) -> Option<Arc<Backend>> {
        let point = hash(client_key);
        let (_, &index) = self
            .ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())?;
        Some(self.backends[index].clone())
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    fn balance(&self) -> Balance {
        Balance::ConsistentHash
    }
}
