//! Shortest expected delay (SED) and never queue (NQ) strategies.
//!
//! SED scores each backend `(in_flight + overhead) / weight` and picks the
//! lowest. NQ first sends to an idle backend (highest weight wins) and
//! falls back to SED once every backend is busy.

use std::sync::Arc;

use crate::endpoint::Balance;
use crate::load_balancer::{backend::Backend, LoadBalance};

#[derive(Debug)]
pub struct ShortestExpectedDelay {
    backends: Vec<Arc<Backend>>,
    overhead: u64,
    never_queue: bool,
}

impl ShortestExpectedDelay {
    pub fn new(backends: Vec<Arc<Backend>>, overhead: u32) -> Self {
        Self {
            backends,
            overhead: u64::from(overhead),
            never_queue: false,
        }
    }

    pub fn never_queue(backends: Vec<Arc<Backend>>, overhead: u32) -> Self {
        Self {
            never_queue: true,
            ..Self::new(backends, overhead)
        }
    }

    fn idle(&self) -> Option<&Arc<Backend>> {
        self.backends
            .iter()
            .filter(|b| b.weight() > 0 && b.in_flight() == 0)
            .fold(None, |best: Option<&Arc<Backend>>, b| match best {
                Some(current) if current.weight() >= b.weight() => Some(current),
                _ => Some(b),
            })
    }

    fn shortest(&self) -> Option<&Arc<Backend>> {
        let mut best: Option<(&Arc<Backend>, u64, u64)> = None;
        for backend in self.backends.iter().filter(|b| b.weight() > 0) {
            let delay = backend.in_flight() as u64 + self.overhead;
            let weight = u64::from(backend.weight());
            best = match best {
                // delay/weight < best_delay/best_weight  ⇔  delay*best_weight < best_delay*weight
                Some((_, best_delay, best_weight)) if delay * best_weight < best_delay * weight => {
                    Some((backend, delay, weight))
                }
                None => Some((backend, delay, weight)),
                keep => keep,
            };
        }
        best.map(|(backend, _, _)| backend)
    }
}

impl LoadBalance for ShortestExpectedDelay {
    fn select(&self, _client_key: &str) -> Option<Arc<Backend>> {
        if self.never_queue {
            if let Some(idle) = self.idle() {
                return Some(idle.clone());
            }
        }
        self.shortest().cloned()
    }

    fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    fn balance(&self) -> Balance {
        if self.never_queue {
            Balance::Nq
        } else {
            Balance::Sed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::{test_backend, Decoration};

    #[test]
    fn test_sed_prefers_capacity() {
        let small = test_backend("10.0.0.1:80", Decoration::Weighted(1));
        let large = test_backend("10.0.0.2:80", Decoration::Weighted(3));
        let lb = ShortestExpectedDelay::new(vec![small.clone(), large.clone()], 1);

        // (0+1)/1 = 1 vs (1+1)/3 ≈ 0.67
        let _busy = large.acquire();
        assert_eq!(lb.select("").unwrap().addr, large.addr);

        // (0+1)/1 = 1 vs (3+1)/3 ≈ 1.33
        let _more: Vec<_> = (0..2).map(|_| large.acquire()).collect();
        assert_eq!(lb.select("").unwrap().addr, small.addr);
    }

    #[test]
    fn test_nq_uses_idle_backend_first() {
        let small = test_backend("10.0.0.1:80", Decoration::Weighted(1));
        let large = test_backend("10.0.0.2:80", Decoration::Weighted(10));
        let lb = ShortestExpectedDelay::never_queue(vec![small.clone(), large.clone()], 1);
        let sed = ShortestExpectedDelay::new(vec![small.clone(), large.clone()], 1);

        let _busy = large.acquire();
        // SED still favours the large backend: (1+1)/10 < (0+1)/1.
        assert_eq!(sed.select("").unwrap().addr, large.addr);
        // NQ never queues while something is idle.
        assert_eq!(lb.select("").unwrap().addr, small.addr);

        let _small_busy = small.acquire();
        assert_eq!(lb.select("").unwrap().addr, large.addr);
        assert_eq!(lb.balance(), Balance::Nq);
    }

    #[test]
    fn test_overhead_changes_the_formula() {
        let small = test_backend("10.0.0.1:80", Decoration::Weighted(1));
        let large = test_backend("10.0.0.2:80", Decoration::Weighted(2));
        let _busy: Vec<_> = (0..2).map(|_| large.acquire()).collect();

        // overhead 0: 0/1 < 2/2
        let lb = ShortestExpectedDelay::new(vec![large.clone(), small.clone()], 0);
        assert_eq!(lb.select("").unwrap().addr, small.addr);
        // overhead 4: (0+4)/1 > (2+4)/2
        let lb = ShortestExpectedDelay::new(vec![small.clone(), large.clone()], 4);
        assert_eq!(lb.select("").unwrap().addr, large.addr);
    }
}
