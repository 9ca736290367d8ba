//! Smooth weighted round-robin strategy.
//!
//! Every pick adds each backend's weight to its running score, selects the
//! highest score and subtracts the total weight from the winner. Weights
//! 5/1/1 yield `a a b a c a a` instead of bursts of `a`.

use std::sync::{Arc, Mutex};

use crate::endpoint::Balance;
use crate::load_balancer::{backend::Backend, LoadBalance};

#[derive(Debug)]
pub struct WeightedRoundRobin {
    backends: Vec<Arc<Backend>>,
    current: Mutex<Vec<i64>>,
}

impl WeightedRoundRobin {
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        let current = Mutex::new(vec![0; backends.len()]);
        Self { backends, current }
    }
}

impl LoadBalance for WeightedRoundRobin {
    fn select(&self, _client_key: &str) -> Option<Arc<Backend>> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let mut total = 0i64;
        let mut best: Option<usize> = None;

        for (index, backend) in self.backends.iter().enumerate() {
            let weight = i64::from(backend.weight());
            if weight == 0 {
                continue;
            }
            current[index] += weight;
            total += weight;
            if best.map_or(true, |b| current[index] > current[b]) {
                best = Some(index);
            }
        }

        let best = best?;
        current[best] -= total;
        Some(self.backends[best].clone())
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    fn balance(&self) -> Balance {
        Balance::Wrr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::{test_backend, Decoration};

    #[test]
    fn test_smooth_sequence() {
        let a = test_backend("10.0.0.1:80", Decoration::Weighted(5));
        let b = test_backend("10.0.0.2:80", Decoration::Weighted(1));
        let c = test_backend("10.0.0.3:80", Decoration::Weighted(1));
        let lb = WeightedRoundRobin::new(vec![a, b, c]);

        let picks: Vec<String> = (0..7).map(|_| lb.select("").unwrap().addr.clone()).collect();
        let expected = [
            "10.0.0.1:80",
            "10.0.0.1:80",
            "10.0.0.2:80",
            "10.0.0.1:80",
            "10.0.0.3:80",
            "10.0.0.1:80",
            "10.0.0.1:80",
        ];
        assert_eq!(picks, expected);
    }

    #[test]
    fn test_distribution_matches_weights() {
        let a = test_backend("10.0.0.1:80", Decoration::Weighted(3));
        let b = test_backend("10.0.0.2:80", Decoration::Weighted(1));
        let lb = WeightedRoundRobin::new(vec![a, b]);
        let hits_a = (0..400)
            .filter(|_| lb.select("").unwrap().addr == "10.0.0.1:80")
            .count();
        assert_eq!(hits_a, 300);
    }

    #[test]
    fn test_all_zero_weights() {
        let a = test_backend("10.0.0.1:80", Decoration::Weighted(0));
        assert!(WeightedRoundRobin::new(vec![a]).select("").is_none());
    }
}
