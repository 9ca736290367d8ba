//! Least connections load balancing strategies (LC and WLC).

use std::sync::Arc;

use crate::endpoint::Balance;
use crate::load_balancer::{backend::Backend, LoadBalance};

/// Least connections selector.
/// Selects the backend with the fewest in-flight requests, optionally
/// normalized by weight.
#[derive(Debug)]
pub struct LeastConnections {
    backends: Vec<Arc<Backend>>,
    weighted: bool,
}

impl LeastConnections {
    /// Plain least connections.
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            weighted: false,
        }
    }

    /// Weighted least connections: minimizes `in_flight / weight`.
    pub fn weighted(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            weighted: true,
        }
    }
}

impl LoadBalance for LeastConnections {
    fn select(&self, _client_key: &str) -> Option<Arc<Backend>> {
        if !self.weighted {
            // In case of tie, the first one is selected (stability)
            return self.backends.iter().min_by_key(|b| b.in_flight()).cloned();
        }

        let mut best: Option<&Arc<Backend>> = None;
        for candidate in self.backends.iter().filter(|b| b.weight() > 0) {
            best = match best {
                // a/wa < b/wb  ⇔  a*wb < b*wa
                Some(current)
                    if (candidate.in_flight() as u64) * u64::from(current.weight())
                        >= (current.in_flight() as u64) * u64::from(candidate.weight()) =>
                {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        best.cloned()
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    fn balance(&self) -> Balance {
        if self.weighted {
            Balance::Wlc
        } else {
            Balance::Lc
        }
    }
}
