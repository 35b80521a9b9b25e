//! Per-network routing of a bulk call.
//!
//! A single request queue may receive calls for several networks. The router
//! splits a bulk call by network, runs every group on that network's
//! transport concurrently and reassembles the outcomes in input order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;

use crate::call::{CallSpec, Network};
use crate::error::TransportError;
use crate::outcome::CallOutcome;
use crate::transport::MulticallTransport;

/// Routes calls to one [`MulticallTransport`] per network.
#[derive(Default)]
pub struct NetworkRouter {
    routes: HashMap<Network, Arc<dyn MulticallTransport>>,
}

impl NetworkRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the transport for `network`.
    pub fn route(mut self, network: Network, transport: Arc<dyn MulticallTransport>) -> Self {
        self.routes.insert(network, transport);
        self
    }

    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<Network> = self.routes.keys().copied().collect();
        networks.sort_unstable();
        networks
    }
}

#[async_trait]
impl MulticallTransport for NetworkRouter {
    async fn execute(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>, TransportError> {
        // network → (input positions, calls)
        let mut groups: BTreeMap<Network, (Vec<usize>, Vec<CallSpec>)> = BTreeMap::new();
        for (i, call) in calls.iter().enumerate() {
            let group = groups.entry(call.network).or_default();
            group.0.push(i);
            group.1.push(call.clone());
        }

        let mut outcomes: Vec<Option<CallOutcome>> = vec![None; calls.len()];
        let mut runs = Vec::new();
        for (network, (positions, group)) in groups {
            match self.routes.get(&network) {
                Some(transport) => {
                    let transport = Arc::clone(transport);
                    runs.push(async move {
                        let result = transport.execute(&group).await.and_then(|out| {
                            if out.len() == group.len() {
                                Ok(out)
                            } else {
                                Err(TransportError::LengthMismatch {
                                    expected: group.len(),
                                    actual: out.len(),
                                })
                            }
                        });
                        (network, positions, result)
                    });
                }
                None => {
                    let reason = TransportError::UnknownNetwork(network).to_string();
                    for p in positions {
                        outcomes[p] = Some(CallOutcome::Failure(reason.clone()));
                    }
                }
            }
        }

        let total_groups = runs.len();
        let mut first_error = None;
        let mut failed_groups = 0;
        for (network, positions, result) in future::join_all(runs).await {
            match result {
                Ok(group_outcomes) => {
                    for (p, o) in positions.into_iter().zip(group_outcomes) {
                        outcomes[p] = Some(o);
                    }
                }
                Err(e) => {
                    tracing::warn!(network, error = %e, "network group failed");
                    failed_groups += 1;
                    let reason = e.to_string();
                    for p in positions {
                        outcomes[p] = Some(CallOutcome::Failure(reason.clone()));
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        if total_groups > 0 && failed_groups == total_groups {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| CallOutcome::Failure("call not routed".into())))
            .collect())
    }

    fn name(&self) -> &str {
        "router"
    }
}
