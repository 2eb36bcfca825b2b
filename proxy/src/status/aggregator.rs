//! Fan-out status probing and merge policies

use crate::backend::BackendResolver;
use crate::config::MergePolicy;
use futures::future::join_all;
use log::debug;
use shared::{ProtocolVersion, ServerPing};
use std::sync::Arc;

/// Everything needed to answer one status query.
#[derive(Debug, Clone)]
pub struct StatusQueryContext {
    pub version: ProtocolVersion,
    /// Backend names in the order they should be preferred.
    pub candidates: Vec<String>,
    pub policy: MergePolicy,
    /// Locally built answer used whenever no backend answer applies.
    pub fallback: ServerPing,
}

/// What one probe contributed, kept in candidate order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Response(ServerPing),
    /// The probe failed, timed out or panicked.
    Fallback,
}

pub struct StatusAggregator {
    resolver: Arc<dyn BackendResolver>,
}

impl StatusAggregator {
    pub fn new(resolver: Arc<dyn BackendResolver>) -> Self {
        Self { resolver }
    }

    /// Probes every resolvable candidate concurrently and merges the replies.
    /// Never fails: any probe problem degrades to the fallback.
    pub async fn resolve(&self, context: StatusQueryContext) -> ServerPing {
        let StatusQueryContext {
            version,
            candidates,
            policy,
            fallback,
        } = context;

        if policy == MergePolicy::Disabled {
            return fallback;
        }

        let probes: Vec<_> = candidates
            .iter()
            .filter_map(|name| self.resolver.resolve(name))
            .map(|backend| {
                let name = backend.name().to_string();
                let task = tokio::spawn(async move { backend.probe_status(version).await });
                (name, task)
            })
            .collect();

        if probes.is_empty() {
            debug!("No resolvable backends among {:?}", candidates);
            return fallback;
        }

        let (names, tasks): (Vec<String>, Vec<_>) = probes.into_iter().unzip();
        let outcomes = join_all(tasks)
            .await
            .into_iter()
            .zip(names)
            .map(|(result, name)| match result {
                Ok(Ok(ping)) => ProbeOutcome::Response(ping),
                Ok(Err(e)) => {
                    debug!("Status probe of {} failed: {}", name, e);
                    ProbeOutcome::Fallback
                }
                Err(e) => {
                    debug!("Status probe of {} aborted: {}", name, e);
                    ProbeOutcome::Fallback
                }
            })
            .collect();

        merge(policy, fallback, outcomes)
    }
}

/// Combines probe outcomes under `policy`. The first matching outcome in
/// candidate order wins.
pub fn merge(policy: MergePolicy, fallback: ServerPing, outcomes: Vec<ProbeOutcome>) -> ServerPing {
    let mut responses = outcomes.into_iter().filter_map(|outcome| match outcome {
        ProbeOutcome::Response(ping) => Some(ping),
        ProbeOutcome::Fallback => None,
    });

    match policy {
        MergePolicy::Disabled => fallback,
        MergePolicy::All => responses.next().unwrap_or(fallback),
        MergePolicy::ModsOnly => match responses.find(ServerPing::has_mods) {
            Some(response) => ServerPing {
                mod_info: response.mod_info,
                ..fallback
            },
            None => fallback,
        },
        MergePolicy::DescriptionOnly => match responses.find(ServerPing::has_description) {
            Some(response) => ServerPing {
                version: fallback.version,
                players: fallback.players,
                description: response.description,
                favicon: fallback.favicon,
                mod_info: response.mod_info,
            },
            None => fallback,
        },
    }
}
