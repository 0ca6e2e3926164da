//! Weighted dependency DAG.
//!
//! Nodes represent spec definitions and operations; an edge `parent→child`
//! means the child depends on the parent, so every child's weight (layer)
//! strictly exceeds its parent's. Edge insertion that would violate the
//! invariant re-layers the affected subtree, detecting cycles with a path
//! stack along the way.
//!
//! Nodes live in a slab and are addressed by [`NodeId`] indices; edges are
//! indices too, never owning pointers, so definition cycles in the source
//! document cannot produce ownership cycles here.

use std::collections::HashMap;

use apiprobe_error::{ProbeError, Result};

/// Maximum number of weight layers.
pub const DAG_DEPTH: usize = 1000;

/// Separator inside composite node keys. A unit separator cannot collide
/// with path templates or method names.
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// What a node stands for, encoded as the first field of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A named schema from the definitions table.
    Definition,
    /// An (HTTP method, path) pair.
    Operation,
}

impl NodeKind {
    const fn code(self) -> char {
        match self {
            Self::Definition => 'd',
            Self::Operation => 'o',
        }
    }
}

/// Build the composite node key `kind FS name FS method`.
pub fn dag_name(kind: NodeKind, name: &str, method: &str) -> String {
    let mut key = String::with_capacity(name.len() + method.len() + 3);
    key.push(kind.code());
    key.push(FIELD_SEPARATOR);
    key.push_str(name);
    key.push(FIELD_SEPARATOR);
    key.push_str(method);
    key
}

/// Ranking of HTTP methods inside one weight layer: creation first, reads
/// next, mutation, then deletion.
pub fn method_weight(method: &str) -> i64 {
    match method {
        "post" => 1,
        "get" | "head" | "options" => 2,
        "put" | "patch" => 3,
        "delete" => 4,
        _ => 5,
    }
}

/// Index of a node inside its owning [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// A single DAG node. The payload type is the graph user's business.
#[derive(Debug)]
pub struct DagNode<T> {
    name: String,
    pub weight: usize,
    pub priority: i64,
    pub data: T,
    children: Vec<NodeId>,
}

impl<T> DagNode<T> {
    /// The full composite key.
    pub fn key(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        if self.name.starts_with('d') {
            NodeKind::Definition
        } else {
            NodeKind::Operation
        }
    }

    /// The middle field of the key: definition name or path template.
    pub fn name(&self) -> &str {
        self.name.split(FIELD_SEPARATOR).nth(1).unwrap_or_default()
    }

    /// The last field of the key; empty for definitions.
    pub fn method(&self) -> &str {
        self.name.split(FIELD_SEPARATOR).nth(2).unwrap_or_default()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    fn describe(&self) -> String {
        format!("{} {}", self.name(), self.method())
    }

    /// Sort key within a layer.
    fn order_key(&self) -> (i64, &str) {
        (self.weight as i64 * DAG_DEPTH as i64 + self.priority, &self.name)
    }
}

/// The layered DAG: a slab of nodes, a name index and per-weight layers.
#[derive(Debug)]
pub struct Dag<T> {
    nodes: Vec<DagNode<T>>,
    name_map: HashMap<String, NodeId>,
    layers: Vec<Vec<NodeId>>,
}

impl<T> Dag<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            name_map: HashMap::new(),
            layers: vec![Vec::new(); DAG_DEPTH],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DagNode<T> {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DagNode<T> {
        &mut self.nodes[id.0]
    }

    /// Look a node up by its composite key.
    pub fn find(&self, key: &str) -> Option<NodeId> {
        self.name_map.get(key).copied()
    }

    /// Register a new node at weight 0. Fails on a duplicate key.
    pub fn new_node(&mut self, key: String, data: T) -> Result<NodeId> {
        if self.name_map.contains_key(&key) {
            return Err(ProbeError::DuplicateNode { name: key });
        }
        let id = NodeId(self.nodes.len());
        self.name_map.insert(key.clone(), id);
        self.nodes.push(DagNode {
            name: key,
            weight: 0,
            priority: 0,
            data,
            children: Vec::new(),
        });
        self.layers[0].push(id);
        Ok(id)
    }

    /// Add an edge `parent→child`, deduplicating by key and lifting the
    /// child's subtree when its weight does not exceed the parent's.
    ///
    /// A rejected insertion (cycle detected while re-layering) is rolled
    /// back completely — the edge and every weight move it caused — so a
    /// caller may drop the edge and keep using the graph.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.nodes[parent.0]
            .children
            .iter()
            .any(|c| self.nodes[c.0].name == self.nodes[child.0].name)
        {
            return Ok(());
        }
        self.nodes[parent.0].children.push(child);
        if self.nodes[child.0].weight <= self.nodes[parent.0].weight {
            let mut path = Vec::new();
            let mut journal = Vec::new();
            if let Err(err) = self.adjust_children_weight(parent, &mut path, &mut journal) {
                self.nodes[parent.0].children.pop();
                for (id, old_weight) in journal.into_iter().rev() {
                    self.move_to_layer(id, old_weight);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn move_to_layer(&mut self, id: NodeId, new_weight: usize) {
        let old_weight = self.nodes[id.0].weight;
        if let Some(pos) = self.layers[old_weight].iter().position(|&n| n == id) {
            self.layers[old_weight].swap_remove(pos);
        }
        self.nodes[id.0].weight = new_weight;
        self.layers[new_weight].push(id);
    }

    /// Lift every child of `id` above `id`, recursively. `path` is the
    /// chain of nodes currently being adjusted; re-entering it is a cycle.
    /// `journal` records every `(node, previous_weight)` move for rollback.
    fn adjust_children_weight(
        &mut self,
        id: NodeId,
        path: &mut Vec<NodeId>,
        journal: &mut Vec<(NodeId, usize)>,
    ) -> Result<()> {
        if let Some(pos) = path.iter().position(|&n| n == id) {
            let mut chain = String::new();
            for &n in &path[pos..] {
                chain.push('\t');
                chain.push_str(&self.nodes[n.0].describe());
                chain.push('\n');
            }
            chain.push('\t');
            chain.push_str(&self.nodes[id.0].describe());
            return Err(ProbeError::CycleDetected { chain });
        }
        path.push(id);
        let weight = self.nodes[id.0].weight;
        let children = self.nodes[id.0].children.clone();
        for c in children {
            if self.nodes[c.0].weight <= weight {
                self.adjust_node_weight(c, weight + 1, path, journal)?;
            }
        }
        path.pop();
        Ok(())
    }

    /// Move a node to a new layer, then lift its children.
    fn adjust_node_weight(
        &mut self,
        id: NodeId,
        new_weight: usize,
        path: &mut Vec<NodeId>,
        journal: &mut Vec<(NodeId, usize)>,
    ) -> Result<()> {
        if new_weight >= DAG_DEPTH {
            return Err(ProbeError::internal(format!(
                "DAG depth exceeded while lifting '{}'",
                self.nodes[id.0].name
            )));
        }
        if !self.layers[self.nodes[id.0].weight].contains(&id) {
            return Err(ProbeError::UnknownNode {
                name: self.nodes[id.0].name.clone(),
            });
        }
        journal.push((id, self.nodes[id.0].weight));
        self.move_to_layer(id, new_weight);
        self.adjust_children_weight(id, path, journal)
    }

    /// All node ids, layer 0 upward, preserving the order [`sort`](Self::sort)
    /// established within each layer.
    pub fn by_weight(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.layers.iter().flatten().copied()
    }

    /// Stable-sort each layer and every child list by
    /// `(weight·DEPTH + priority, key)`.
    pub fn sort(&mut self) {
        for w in 0..DAG_DEPTH {
            let mut layer = std::mem::take(&mut self.layers[w]);
            layer.sort_by(|&a, &b| self.nodes[a.0].order_key().cmp(&self.nodes[b.0].order_key()));
            self.layers[w] = layer;
        }
        for i in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[i].children);
            children
                .sort_by(|&a, &b| self.nodes[a.0].order_key().cmp(&self.nodes[b.0].order_key()));
            self.nodes[i].children = children;
        }
    }

    /// Sort operation nodes of one path by HTTP-method priority:
    /// `(method_weight, priority, key)`.
    pub fn sort_by_method_priority(&self, ids: &mut [NodeId]) {
        ids.sort_by(|&a, &b| {
            let na = &self.nodes[a.0];
            let nb = &self.nodes[b.0];
            (method_weight(na.method()), na.priority, &na.name)
                .cmp(&(method_weight(nb.method()), nb.priority, &nb.name))
        });
    }

    /// Verify the layering invariant: every child's weight strictly exceeds
    /// its parent's, and every node sits in the layer list of its weight.
    pub fn check_weights(&self) -> Result<()> {
        for node in &self.nodes {
            for &c in &node.children {
                if self.nodes[c.0].weight <= node.weight {
                    return Err(ProbeError::internal(format!(
                        "bad weight: '{}' ({}) does not exceed parent '{}' ({})",
                        self.nodes[c.0].name, self.nodes[c.0].weight, node.name, node.weight
                    )));
                }
            }
        }
        for (w, layer) in self.layers.iter().enumerate() {
            for &id in layer {
                if self.nodes[id.0].weight != w {
                    return Err(ProbeError::internal(format!(
                        "node '{}' filed under layer {w} but weighs {}",
                        self.nodes[id.0].name, self.nodes[id.0].weight
                    )));
                }
            }
        }
        Ok(())
    }
}
