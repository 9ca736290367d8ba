//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::endpoint::Balance;
use crate::load_balancer::{backend::Backend, LoadBalance};

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug)]
pub struct RoundRobin {
    backends: Vec<Arc<Backend>>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalance for RoundRobin {
    fn select(&self, _client_key: &str) -> Option<Arc<Backend>> {
        if self.backends.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.backends.len();
        Some(self.backends[index].clone())
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    fn balance(&self) -> Balance {
        Balance::Rr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::{test_backend, Decoration};

    #[test]
    fn test_round_robin() {
        let b1 = test_backend("127.0.0.1:8080", Decoration::Plain);
        let b2 = test_backend("127.0.0.1:8081", Decoration::Plain);
        let lb = RoundRobin::new(vec![b1.clone(), b2.clone()]);

        let s1 = lb.select("").unwrap();
        assert_eq!(s1.addr, b1.addr);

        let s2 = lb.select("").unwrap();
        assert_eq!(s2.addr, b2.addr);

        let s3 = lb.select("").unwrap();
        assert_eq!(s3.addr, b1.addr);
    }

    #[test]
    fn test_empty() {
        assert!(RoundRobin::new(Vec::new()).select("").is_none());
    }
}
