//! Load balancer construction.
//!
//! # Responsibilities
//! - Turn endpoint addresses into decorated, pooled backends
//! - Build the selection strategy for a balance type
//!
//! | balance | decoration |
//! |---|---|
//! | rr, consistent_hash | none |
//! | wrr, wlc, sed, nq | weight |
//! | lc | in-flight counter |

use std::sync::Arc;

use crate::config::LoadBalancerConfig;
use crate::endpoint::{Balance, EndpointAddr};
use crate::error::{Error, Result};
use crate::load_balancer::backend::{transport_client, Backend, Decoration};
use crate::load_balancer::consistent_hash::ConsistentHash;
use crate::load_balancer::least_conn::LeastConnections;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::sed::ShortestExpectedDelay;
use crate::load_balancer::weighted_round_robin::WeightedRoundRobin;
use crate::load_balancer::LoadBalance;

/// Builds backends and strategies from endpoint records.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerFactory {
    config: LoadBalancerConfig,
}

impl LoadBalancerFactory {
    pub fn new(config: LoadBalancerConfig) -> Self {
        Self { config }
    }

    /// One pooled backend per address, decorated for `balance`.
    pub fn new_endpoints(&self, balance: Balance, addrs: &[EndpointAddr]) -> Result<Vec<Arc<Backend>>> {
        const OP: &str = "load_balancer.new_endpoints";
        if addrs.is_empty() {
            return Err(Error::validation(OP, "endpoint list is empty"));
        }
        addrs
            .iter()
            .map(|endpoint| {
                let decoration = match balance {
                    Balance::Rr | Balance::ConsistentHash => Decoration::Plain,
                    Balance::Wrr | Balance::Wlc | Balance::Sed | Balance::Nq => {
                        Decoration::Weighted(endpoint.weight)
                    }
                    Balance::Lc => Decoration::Counted,
                };
                let client = transport_client(self.config.pool_max_idle_per_host);
                Backend::new(endpoint.addr.clone(), decoration, client)
                    .map(Arc::new)
                    .map_err(|e| e.within(OP))
            })
            .collect()
    }

    /// Selection strategy for `balance` over `backends`.
    pub fn new_load_balance(&self, balance: Balance, backends: Vec<Arc<Backend>>) -> Result<Arc<dyn LoadBalance>> {
        if backends.is_empty() {
            return Err(Error::validation(
                "load_balancer.new",
                "cannot balance over zero backends",
            ));
        }
        let lb: Arc<dyn LoadBalance> = match balance {
            Balance::Rr => Arc::new(RoundRobin::new(backends)),
            Balance::Wrr => Arc::new(WeightedRoundRobin::new(backends)),
            Balance::Lc => Arc::new(LeastConnections::new(backends)),
            Balance::Wlc => Arc::new(LeastConnections::weighted(backends)),
            Balance::Sed => Arc::new(ShortestExpectedDelay::new(backends, self.config.sed_overhead)),
            Balance::Nq => Arc::new(ShortestExpectedDelay::never_queue(backends, self.config.sed_overhead)),
            Balance::ConsistentHash => Arc::new(ConsistentHash::new(backends, self.config.hash_replicas)),
        };
        Ok(lb)
    }

    /// Resolve a stored balance name and build the full balancer.
    pub fn build(&self, balance: &str, addrs: &[EndpointAddr]) -> Result<Arc<dyn LoadBalance>> {
        let balance: Balance = balance.parse().map_err(|e: Error| e.within("load_balancer.build"))?;
        let backends = self.new_endpoints(balance, addrs)?;
        self.new_load_balance(balance, backends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn addrs() -> Vec<EndpointAddr> {
        vec![
            EndpointAddr::new("127.0.0.1:9000", 3),
            EndpointAddr::new("127.0.0.1:9001", 1),
        ]
    }

    #[test]
    fn test_new_endpoints_decoration_per_balance() {
        let factory = LoadBalancerFactory::default();
        for balance in Balance::ALL {
            let backends = factory.new_endpoints(balance, &addrs()).unwrap();
            assert_eq!(backends.len(), 2, "{balance}");
            let expected = match balance {
                Balance::Rr | Balance::ConsistentHash => vec![Decoration::Plain, Decoration::Plain],
                Balance::Wrr | Balance::Wlc | Balance::Sed | Balance::Nq => {
                    vec![Decoration::Weighted(3), Decoration::Weighted(1)]
                }
                Balance::Lc => vec![Decoration::Counted, Decoration::Counted],
            };
            let actual: Vec<_> = backends.iter().map(|b| b.decoration).collect();
            assert_eq!(actual, expected, "{balance}");
            assert_eq!(backends[0].addr, "127.0.0.1:9000");
        }
    }

    #[test]
    fn test_strategy_matches_balance() {
        let factory = LoadBalancerFactory::default();
        for balance in Balance::ALL {
            let lb = factory.build(balance.as_str(), &addrs()).unwrap();
            assert_eq!(lb.balance(), balance);
            assert_eq!(lb.backends().len(), 2);
            assert!(lb.select("10.1.1.1").is_some());
        }
    }

    #[test]
    fn test_unsupported_balance() {
        let err = LoadBalancerFactory::default().build("random", &addrs()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
        assert_eq!(err.op(), "load_balancer.build");
    }

    #[test]
    fn test_empty_endpoint_list() {
        let err = LoadBalancerFactory::default()
            .new_endpoints(Balance::Rr, &[])
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
    }

    #[test]
    fn test_concurrent_select() {
        let lb = LoadBalancerFactory::default().build("wrr", &addrs()).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || (0..100).filter(|_| lb.select("").is_some()).count())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 800);
    }
}
