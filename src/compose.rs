//! # The Composition Engine
//!
//! This module ties the data model together into the pipeline users reason
//! about:
//!
//! 1. **Loading** ([`Loader`]): starting from a root repository, recursively
//!    clone every declared upstream. Siblings clone in parallel and each
//!    child's own upstreams start cloning as soon as its manifest is known,
//!    so cousins overlap too. Recursion is bounded by a depth budget rather
//!    than cycle detection; clone and parse failures accumulate instead of
//!    failing fast, and every successfully loaded branch stays in the tree.
//!
//! 2. **Flattening** ([`flatten`]): linearize the loaded tree post-order, so
//!    the list starts at the deepest upstream and ends with the root. On the
//!    way down, the include/exclude/rename rules a parent attached to an
//!    edge are appended onto that child's manifest, exactly once per edge.
//!
//! 3. **Compositing** ([`composite`]): merge every node's template variables
//!    (later nodes win per key), run the filter pipeline on every node, then
//!    fold the target sets into a single [`OutputMap`] in flattened order.
//!    The root is folded last and therefore has final authority on any path
//!    it also produces.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::debug;
use tokio::task::JoinSet;

use crate::config::{Manifest, RenameRule, TemplateVars, UpstreamEdge};
use crate::defaults;
use crate::error::{Error, ErrorSink, Result};
use crate::git::Transport;
use crate::snapshot::RepoSnapshot;
use crate::targets::{Target, TargetSet};

/// The final composed mapping from output path to target. Later writers
/// overwrite earlier ones during the fold; iteration order is unspecified.
pub type OutputMap = HashMap<String, Target>;

/// One composed repository: its snapshot, manifest, target set, and the
/// upstream nodes it inherits from.
///
/// `children` is pre-allocated to the length of the manifest's upstream
/// list, in declared order; a `None` slot marks an upstream that failed to
/// load.
#[derive(Debug)]
pub struct Node {
    pub snapshot: Arc<RepoSnapshot>,
    pub manifest: Manifest,
    pub targets: TargetSet,
    pub children: Vec<Option<Node>>,
}

impl Node {
    /// Build a node from a snapshot and an already-parsed manifest.
    pub fn new(snapshot: RepoSnapshot, manifest: Manifest) -> Self {
        let snapshot = Arc::new(snapshot);
        Self {
            targets: TargetSet::identity(snapshot.clone()),
            snapshot,
            manifest,
            children: Vec::new(),
        }
    }

    /// Build a node by discovering the manifest inside the snapshot.
    ///
    /// The parent's edge renames are applied to a scratch identity mapping
    /// first, so a downstream can rename an upstream's manifest into (or out
    /// of) the discovery glob's view. Among the renamed paths that match,
    /// the shortest wins; ties break lexicographically. The original file
    /// behind the winning path is parsed, and the target set is reset so the
    /// probe renames do not leak into the node's own filter pass.
    ///
    /// A snapshot without a matching manifest yields the empty manifest,
    /// which lets plain repositories participate as upstreams.
    pub fn from_snapshot(
        snapshot: RepoSnapshot,
        config_glob: &str,
        edge_renames: &[RenameRule],
    ) -> Result<Self> {
        let snapshot = Arc::new(snapshot);
        let mut targets = TargetSet::identity(snapshot.clone());
        targets.apply_renames(edge_renames);

        let mut matches = targets.glob(config_glob)?;
        matches.sort_by_key(String::len);

        let manifest = match matches.first() {
            Some(path) => {
                let source = &targets.get(path).expect("glob matched this path").name;
                debug!("loading manifest {} from {}", source, snapshot.url());
                Manifest::parse_bytes(snapshot.read(source)?)?
            }
            None => {
                debug!("no manifest in {}, using defaults", snapshot.url());
                Manifest::default()
            }
        };

        targets.reset();
        Ok(Self {
            snapshot,
            manifest,
            targets,
            children: Vec::new(),
        })
    }

    /// Number of loaded nodes in this subtree, self included.
    pub fn reachable_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(Node::reachable_count)
            .sum::<usize>()
    }
}

/// Recursive parallel upstream loader.
#[derive(Clone)]
pub struct Loader {
    transport: Arc<dyn Transport>,
    config_glob: String,
}

impl Loader {
    /// A loader using the default manifest discovery glob (respecting the
    /// `COMMON_CONFIG_GLOB` override).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config_glob(transport, defaults::config_file_glob())
    }

    /// A loader with an explicit discovery glob, mostly useful for tests.
    pub fn with_config_glob(transport: Arc<dyn Transport>, config_glob: String) -> Self {
        Self {
            transport,
            config_glob,
        }
    }

    /// Fetch a repository and build the root node via manifest discovery.
    pub async fn load_root(&self, url: &str, reference: &str) -> Result<Node> {
        let snapshot = self.transport.fetch(url, reference).await?;
        Node::from_snapshot(snapshot, &self.config_glob, &[])
    }

    /// Recursively clone all upstreams of `node`, at most `depth` levels.
    ///
    /// Clone and parse failures accumulate; whatever loaded successfully
    /// stays attached to the tree, and the combined error is returned at
    /// the end. A depth of zero fails immediately, whether or not the node
    /// declares any upstreams.
    pub async fn load_upstreams(&self, node: &mut Node, depth: usize) -> Result<()> {
        if depth < 1 {
            return Err(Error::DepthExceeded);
        }
        let sink = ErrorSink::new();
        node.children = self
            .clone()
            .load_children(node.manifest.upstream.clone(), depth, sink.clone())
            .await;
        sink.into_result()
    }

    /// Load one level of upstream edges in parallel, descending into each
    /// child as soon as it is available. Children land in their declared
    /// slot regardless of completion order.
    fn load_children(
        self,
        edges: Vec<UpstreamEdge>,
        depth: usize,
        sink: ErrorSink,
    ) -> BoxFuture<'static, Vec<Option<Node>>> {
        Box::pin(async move {
            let count = edges.len();
            let mut tasks = JoinSet::new();
            for (index, edge) in edges.into_iter().enumerate() {
                let loader = self.clone();
                let sink = sink.clone();
                tasks.spawn(async move {
                    let mut child = match loader.load_edge(&edge).await {
                        Ok(child) => child,
                        Err(err) => {
                            sink.push(err);
                            return (index, None);
                        }
                    };
                    if depth <= 1 {
                        // The child itself loaded, but its own upstream pass
                        // is out of budget.
                        sink.push(Error::DepthExceeded);
                    } else if !child.manifest.upstream.is_empty() {
                        child.children = loader
                            .load_children(child.manifest.upstream.clone(), depth - 1, sink)
                            .await;
                    }
                    (index, Some(child))
                });
            }

            let mut slots: Vec<Option<Node>> = (0..count).map(|_| None).collect();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, child)) => slots[index] = child,
                    Err(err) => sink.push(Error::Task {
                        message: err.to_string(),
                    }),
                }
            }
            slots
        })
    }

    async fn load_edge(&self, edge: &UpstreamEdge) -> Result<Node> {
        let snapshot = self.transport.fetch(&edge.url, &edge.r#ref).await?;
        Node::from_snapshot(snapshot, &self.config_glob, &edge.rename)
    }
}

/// Linearize a loaded tree into application order: post-order over the
/// declared edge list, each node after its descendants, the root last.
///
/// Flattening is where edge rules propagate: before a child's subtree is
/// emitted, the include/exclude/rename lists its parent attached to the
/// edge are appended onto the child's manifest.
pub fn flatten(root: Node) -> Vec<Node> {
    let mut flat = Vec::new();
    flatten_into(root, &mut flat);
    flat
}

fn flatten_into(mut node: Node, flat: &mut Vec<Node>) {
    let children = std::mem::take(&mut node.children);
    for (edge, child) in node.manifest.upstream.iter().zip(children) {
        if let Some(mut child) = child {
            child.manifest.append_edge_rules(edge);
            flatten_into(child, flat);
        }
    }
    flat.push(node);
}

/// Merge every node's template variables in flattened order, later
/// assignments winning per key.
pub fn merged_template_vars(flat: &[Node]) -> TemplateVars {
    let mut merged = TemplateVars::new();
    for node in flat {
        for (key, value) in &node.manifest.template_vars {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Run the full composition over a loaded tree: flatten, merge variables,
/// filter every node, and fold the target sets into one [`OutputMap`].
pub fn composite(root: Node) -> Result<OutputMap> {
    let mut flat = flatten(root);
    let vars = Arc::new(merged_template_vars(&flat));

    for node in &mut flat {
        node.targets.apply_manifest(&node.manifest, &vars)?;
    }

    let mut output = OutputMap::new();
    for node in flat {
        output.extend(node.targets.into_entries());
    }
    Ok(output)
}

/// Top-level facade: load a repository, its upstream tree, and produce the
/// composed output mapping.
pub struct Composer {
    loader: Loader,
    max_depth: usize,
}

impl Composer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            loader: Loader::new(transport),
            max_depth: defaults::MAX_UPSTREAM_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Compose the repository at `url`/`reference` into an output mapping.
    pub async fn compose(&self, url: &str, reference: &str) -> Result<OutputMap> {
        let mut root = self.loader.load_root(url, reference).await?;
        self.loader.load_upstreams(&mut root, self.max_depth).await?;
        composite(root)
    }
}
