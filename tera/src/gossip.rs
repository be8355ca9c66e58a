//! In-process gossip propagation and the publish/receive hooks the
//! external transport consumes.
//!
//! A real deployment plugs a pub/sub transport into
//! [`publish_extension`] and [`receive`]. For experiments and tests,
//! [`SimNetwork`] models a network as a list of nodes, each holding
//! its own gatekeeper and interest filter; propagation is a fold over
//! the nodes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::TeraError;
use crate::gatekeeper::{Decision, Gatekeeper, InterestFilter};
use crate::protocol::{self, ExtensionMessage, Inbound};
use crate::similarity::KernelParams;
use crate::store::TeraStore;
use crate::store::kv::KvBackend;
use crate::types::Extension;

/// Cooperative cancellation handle.
///
/// Long-running boundary operations check the token at operation
/// boundaries (between nodes, before a transaction); store
/// transactions themselves are short-lived and never interrupted
/// midway.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One simulated node: identity, interests, and its own gatekeeper.
pub struct SimNode {
    /// Node identity, used in propagation reports.
    pub id: String,
    /// What this node considers relevant.
    pub filter: InterestFilter,
    /// This node's admission policy and counters.
    pub gatekeeper: Gatekeeper,
}

impl SimNode {
    /// Builds a node from its interests.
    pub fn new(
        id: impl Into<String>,
        interests: Vec<String>,
        params: KernelParams,
    ) -> Result<Self, TeraError> {
        Ok(Self {
            id: id.into(),
            filter: InterestFilter::new(interests, params)?,
            gatekeeper: Gatekeeper::new(),
        })
    }
}

/// Decision a single node reached during propagation.
#[derive(Clone, Debug)]
pub struct NodeDecision {
    /// The deciding node's id.
    pub node: String,
    /// Its gatekeeper decision.
    pub decision: Decision,
}

/// What happened when an extension was propagated across the network.
#[derive(Debug, Default)]
pub struct PropagationReport {
    /// Per-node decisions, in network order.
    pub decisions: Vec<NodeDecision>,
    /// How many nodes admitted and would re-announce.
    pub forwarded: usize,
    /// `true` if propagation stopped early due to cancellation.
    pub cancelled: bool,
}

/// An in-process network of simulated nodes.
#[derive(Default)]
pub struct SimNetwork {
    nodes: Vec<SimNode>,
}

impl SimNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the network.
    pub fn add_node(&mut self, node: SimNode) {
        self.nodes.push(node);
    }

    /// The nodes in network order.
    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Propagates an extension across the network: a fold over the
    /// nodes, each consulting its own gatekeeper. Honours the cancel
    /// token between nodes.
    pub fn propagate(&self, ext: &Extension, cancel: &CancelToken) -> PropagationReport {
        self.nodes
            .iter()
            .fold(PropagationReport::default(), |mut report, node| {
                if report.cancelled || cancel.is_cancelled() {
                    report.cancelled = true;
                    return report;
                }
                let decision = node.gatekeeper.admit(ext, &node.filter);
                if decision.forward {
                    report.forwarded += 1;
                }
                report.decisions.push(NodeDecision {
                    node: node.id.clone(),
                    decision,
                });
                report
            })
    }
}

/// Publish hook: frames an admitted extension for the gossip topic.
pub fn publish_extension(ext: &Extension) -> Result<Vec<u8>, TeraError> {
    protocol::encode_extension(&ExtensionMessage::from_extension(ext))
}

/// Receive hook: decodes framed bytes and, for extension
/// announcements, runs them through the node's gatekeeper, storing
/// admitted edges.
///
/// Returns the admission decision for extensions and `None` for
/// query traffic (which the boundary service answers separately) or
/// when cancelled before any work started.
pub fn receive<B: KvBackend>(
    store: &TeraStore<B>,
    gatekeeper: &Gatekeeper,
    filter: &InterestFilter,
    raw: &[u8],
    cancel: &CancelToken,
) -> Result<Option<Decision>, TeraError> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    match protocol::decode(raw)? {
        Inbound::Extension(msg) => {
            let ext = msg.to_extension()?;
            let decision = gatekeeper.admit(&ext, filter);
            if decision.forward {
                store.add_extension(&ext)?;
            }
            Ok(Some(decision))
        }
        Inbound::Query(_) | Inbound::QueryResponse(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::BlockReason;
    use crate::types::Content;

    fn network() -> SimNetwork {
        let params = KernelParams {
            threshold: 0.3,
            ..KernelParams::default()
        };
        let mut net = SimNetwork::new();
        net.add_node(
            SimNode::new("ml-node", vec!["machine learning".to_string()], params)
                .expect("node"),
        );
        net.add_node(
            SimNode::new("food-node", vec!["italian cooking".to_string()], params)
                .expect("node"),
        );
        net.add_node(
            SimNode::new(
                "wide-node",
                vec![
                    "machine learning".to_string(),
                    "italian cooking".to_string(),
                ],
                params,
            )
            .expect("node"),
        );
        net
    }

    #[test]
    fn propagation_is_a_fold_over_per_node_gatekeepers() {
        let net = network();
        let root = Content::new("Machine learning basics");
        let (ext, _) = root.extend(b" and neural networks", None, None);

        let report = net.propagate(&ext, &CancelToken::new());

        assert_eq!(report.decisions.len(), 3);
        assert_eq!(report.forwarded, 2);
        assert!(!report.cancelled);

        let by_node: Vec<(&str, bool)> = report
            .decisions
            .iter()
            .map(|d| (d.node.as_str(), d.decision.forward))
            .collect();
        assert_eq!(
            by_node,
            [("ml-node", true), ("food-node", false), ("wide-node", true)]
        );
    }

    #[test]
    fn a_forged_extension_is_blocked_everywhere_as_crypto() {
        let net = network();
        let root = Content::new("Machine learning basics");
        let (mut ext, _) = root.extend(b" and neural networks", None, None);
        ext.child.crypto = crate::hash::element_hash(b"forged");

        let report = net.propagate(&ext, &CancelToken::new());
        assert_eq!(report.forwarded, 0);
        for d in &report.decisions {
            assert_eq!(d.decision.reason, Some(BlockReason::Crypto));
        }
    }

    #[test]
    fn cancellation_stops_between_nodes() {
        let net = network();
        let root = Content::new("Machine learning basics");
        let (ext, _) = root.extend(b" and more", None, None);

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = net.propagate(&ext, &cancel);

        assert!(report.cancelled);
        assert!(report.decisions.is_empty());
    }

    #[test]
    fn receive_admits_and_stores_a_relevant_extension() {
        let store = TeraStore::in_memory();
        let gatekeeper = Gatekeeper::new();
        let filter = InterestFilter::new(
            vec!["machine learning".to_string()],
            KernelParams {
                threshold: 0.3,
                ..KernelParams::default()
            },
        )
        .expect("filter");

        let root = Content::new("Machine learning basics");
        store.put(&root.data).expect("put root");
        let (ext, child) = root.extend(b" and neural networks", None, None);

        let framed = publish_extension(&ext).expect("publish");
        let decision = receive(&store, &gatekeeper, &filter, &framed, &CancelToken::new())
            .expect("receive")
            .expect("extension decision");

        assert!(decision.forward);
        assert!(store.has(&child.dual.crypto).expect("stored"));
        assert!(
            store
                .is_extension(&root.dual.crypto, &child.dual.crypto)
                .expect("edge recorded")
        );
    }

    #[test]
    fn receive_ignores_query_traffic() {
        let store: crate::store::MemoryStore = TeraStore::in_memory();
        let gatekeeper = Gatekeeper::new();
        let filter = InterestFilter::new(
            vec!["anything".to_string()],
            KernelParams::default(),
        )
        .expect("filter");

        let framed = protocol::encode_query(&crate::protocol::QueryMessage::new(
            b"machine learning",
            KernelParams::default(),
            "req-1",
        ))
        .expect("encode");

        let decision = receive(&store, &gatekeeper, &filter, &framed, &CancelToken::new())
            .expect("receive");
        assert!(decision.is_none());
        assert_eq!(gatekeeper.counters().total_seen, 0);
    }
}
