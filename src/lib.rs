//! Vector animation complex: a versioned cellular topology core for 2D
//! vector animation. Cells (key or inbetween vertices, edges, and faces) and
//! transform-carrying groups share one id-addressed node table owned by
//! [`Complex`]; all structural edits go through the undoable
//! [`operations`] layer, and consumers observe batches of changes through
//! the pending [`Diff`].

pub mod cell;
pub mod cycle;
pub mod error;
pub mod groups;
pub mod model;
pub mod operations;

pub use cell::{Cell, InbetweenEdge, InbetweenFace, InbetweenVertex, KeyEdge, KeyFace, KeyVertex};
pub use cycle::{KeyCycle, KeyHalfedge};
pub use error::{Error, Result};
pub use groups::Group;
pub use model::{AnimTime, EdgeSampling, NodeId, SpatialKind, TemporalKind, TimeSpan};
pub use operations::{glue_key_vertices, Operation, OperationIndex};

use kurbo::{Affine, Rect};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

/// Structural changes accumulated since the last flush.
///
/// One `Diff` describes a whole batch of operations: nodes created, nodes
/// removed, nodes whose payload changed (substitution, transform), nodes
/// whose parent or sibling position changed, and per-node authored-attribute
/// names that changed. A node created and removed inside the same batch is
/// transient and cancels out of the payload entirely.
#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub created: HashSet<NodeId>,
    pub removed: HashSet<NodeId>,
    pub modified: HashSet<NodeId>,
    pub reparented: HashSet<NodeId>,
    pub attrs_changed: HashMap<NodeId, BTreeSet<String>>,
    /// Set by [`Complex::clear`]: everything changed, per-node entries are
    /// meaningless.
    pub full: bool,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        !self.full
            && self.created.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.reparented.is_empty()
            && self.attrs_changed.is_empty()
    }

    fn scrub(&mut self, id: NodeId) {
        self.modified.remove(&id);
        self.reparented.remove(&id);
        self.attrs_changed.remove(&id);
    }

    fn record_created(&mut self, id: NodeId) {
        if self.removed.remove(&id) {
            // Removed and restored within the same batch: the node was live at
            // the last flush and still is, so the net effect is a modification.
            self.modified.insert(id);
            return;
        }
        self.created.insert(id);
    }

    fn record_removed(&mut self, id: NodeId) {
        self.scrub(id);
        if self.created.remove(&id) {
            // Transient: created and removed within the same batch.
            return;
        }
        self.removed.insert(id);
    }

    fn record_modified(&mut self, id: NodeId) {
        if !self.created.contains(&id) {
            self.modified.insert(id);
        }
    }

    fn record_reparented(&mut self, id: NodeId) {
        if !self.created.contains(&id) {
            self.reparented.insert(id);
        }
    }

    fn record_attr(&mut self, id: NodeId, name: &str) {
        if !self.created.contains(&id) {
            self.attrs_changed
                .entry(id)
                .or_default()
                .insert(name.to_string());
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    Group(Group),
    Cell(Cell),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) data: NodeData,
}

type DiffObserver = Box<dyn FnMut(&Diff)>;

/// The vector animation complex: exclusive owner of all cell and group
/// nodes, id allocator, version counter, and pending-diff accumulator.
///
/// Single-writer by design: all mutation happens on one document-editing
/// context, through the [`operations`] layer. Queries never mutate.
pub struct Complex {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
    next_op_index: u64,
    version: u64,
    diff: Diff,
    observers: Vec<DiffObserver>,
}

impl Default for Complex {
    fn default() -> Self {
        Self::new()
    }
}

impl Complex {
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                attrs: BTreeMap::new(),
                data: NodeData::Group(Group::new()),
            },
        );
        Complex {
            nodes,
            root,
            next_id: 2,
            next_op_index: 1,
            version: 1,
            diff: Diff::default(),
            observers: Vec::new(),
        }
    }

    /// The root group. Always live; cannot be removed or moved.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Monotonic version, incremented on every structural mutation including
    /// [`clear`](Self::clear). Collaborators compare versions to detect
    /// staleness without deep comparison.
    pub fn version(&self) -> u64 {
        self.version
    }

    // -- Query surface --

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn is_group(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(&id),
            Some(Node {
                data: NodeData::Group(_),
                ..
            })
        )
    }

    pub fn is_cell(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(&id),
            Some(Node {
                data: NodeData::Cell(_),
                ..
            })
        )
    }

    /// Safe downcast to a cell. Returns `None` for missing nodes and groups;
    /// never fails.
    pub fn cell(&self, id: NodeId) -> Option<&Cell> {
        match self.nodes.get(&id) {
            Some(Node {
                data: NodeData::Cell(c),
                ..
            }) => Some(c),
            _ => None,
        }
    }

    /// Safe downcast to a group. Returns `None` for missing nodes and cells;
    /// never fails.
    pub fn group(&self, id: NodeId) -> Option<&Group> {
        match self.nodes.get(&id) {
            Some(Node {
                data: NodeData::Group(g),
                ..
            }) => Some(g),
            _ => None,
        }
    }

    pub fn key_vertex(&self, id: NodeId) -> Option<&KeyVertex> {
        self.cell(id).and_then(Cell::as_key_vertex)
    }

    pub fn key_edge(&self, id: NodeId) -> Option<&KeyEdge> {
        self.cell(id).and_then(Cell::as_key_edge)
    }

    pub fn key_face(&self, id: NodeId) -> Option<&KeyFace> {
        self.cell(id).and_then(Cell::as_key_face)
    }

    pub fn inbetween_vertex(&self, id: NodeId) -> Option<&InbetweenVertex> {
        self.cell(id).and_then(Cell::as_inbetween_vertex)
    }

    pub fn inbetween_edge(&self, id: NodeId) -> Option<&InbetweenEdge> {
        self.cell(id).and_then(Cell::as_inbetween_edge)
    }

    pub fn inbetween_face(&self, id: NodeId) -> Option<&InbetweenFace> {
        self.cell(id).and_then(Cell::as_inbetween_face)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children of a node in sibling order. Cells have no children.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        match self.nodes.get(&id) {
            Some(Node {
                data: NodeData::Group(g),
                ..
            }) => Ok(&g.children),
            Some(_) => Ok(&[]),
            None => Err(Error::NotFound(id)),
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn cells(&self) -> impl Iterator<Item = (NodeId, &Cell)> + '_ {
        self.nodes.iter().filter_map(|(id, n)| match &n.data {
            NodeData::Cell(c) => Some((*id, c)),
            NodeData::Group(_) => None,
        })
    }

    /// Authored attributes of a node, as maintained by the document layer
    /// through attribute operations.
    pub fn attributes(&self, id: NodeId) -> Result<&BTreeMap<String, String>> {
        self.nodes
            .get(&id)
            .map(|n| &n.attrs)
            .ok_or(Error::NotFound(id))
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&id)
            .and_then(|n| n.attrs.get(name))
            .map(String::as_str)
    }

    /// Bounding box of a cell at `t`, or the union of a group's subtree.
    pub fn bounding_box_at(&self, id: NodeId, t: AnimTime) -> Result<Rect> {
        match self.nodes.get(&id) {
            None => Err(Error::NotFound(id)),
            Some(Node {
                data: NodeData::Cell(c),
                ..
            }) => c.bounding_box_at(self, t),
            Some(Node {
                data: NodeData::Group(g),
                ..
            }) => {
                let mut bbox: Option<Rect> = None;
                for &child in &g.children {
                    let r = self.bounding_box_at(child, t)?;
                    bbox = Some(bbox.map_or(r, |b| b.union(r)));
                }
                Ok(bbox.unwrap_or(Rect::ZERO))
            }
        }
    }

    /// Cached root-relative transform of a group.
    pub fn transform_from_root(&self, id: NodeId) -> Result<Affine> {
        self.group(id)
            .map(Group::transform_from_root)
            .ok_or(Error::NotFound(id))
    }

    /// Composes inverse local transforms walking up from `id` to `ancestor`
    /// (exclusive), converting ancestor-local coordinates to `id`-local ones.
    /// Fails with `InvalidHierarchy` if the walk reaches the root without
    /// meeting `ancestor`.
    pub fn compute_inverse_transform_to(&self, id: NodeId, ancestor: NodeId) -> Result<Affine> {
        self.group(id).ok_or(Error::NotFound(id))?;
        self.group(ancestor).ok_or(Error::NotFound(ancestor))?;
        let mut acc = Affine::IDENTITY;
        let mut cur = id;
        while cur != ancestor {
            let g = self.group(cur).ok_or(Error::NotFound(cur))?;
            acc = acc * g.inverse_transform;
            match self.parent(cur) {
                Some(p) => cur = p,
                None => {
                    return Err(Error::InvalidHierarchy(format!(
                        "node {ancestor:?} is not an ancestor of {id:?}"
                    )))
                }
            }
        }
        Ok(acc)
    }

    // -- Notification surface --

    /// The diff accumulated since the last flush. Read-only peek; flushing
    /// goes through [`emit_pending_diff`](Self::emit_pending_diff).
    pub fn pending_diff(&self) -> &Diff {
        &self.diff
    }

    /// Registers an observer invoked synchronously with each flushed diff.
    pub fn add_diff_observer(&mut self, observer: impl FnMut(&Diff) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Flushes the pending diff: if non-empty, notifies every registered
    /// observer with the batch and resets the accumulator. Returns whether a
    /// notification was sent.
    ///
    /// This is the only notification path. Individual operations never notify
    /// synchronously, so a composite edit is observed as one coherent batch.
    pub fn emit_pending_diff(&mut self) -> bool {
        if self.diff.is_empty() {
            return false;
        }
        let diff = std::mem::take(&mut self.diff);
        debug!(
            created = diff.created.len(),
            removed = diff.removed.len(),
            modified = diff.modified.len(),
            full = diff.full,
            "emit pending diff"
        );
        let mut observers = std::mem::take(&mut self.observers);
        for obs in observers.iter_mut() {
            obs(&diff);
        }
        self.observers = observers;
        true
    }

    /// Removes every node except the root group, resets the root transforms
    /// to identity, resets the diff accumulator (flagging it full), and
    /// increments the version. Every previously issued id becomes invalid;
    /// neither the id allocator nor the operation-index allocator is reset,
    /// so no id is ever reissued.
    pub fn clear(&mut self) {
        self.nodes.retain(|id, _| *id == self.root);
        if let Some(node) = self.nodes.get_mut(&self.root) {
            node.attrs.clear();
            if let NodeData::Group(g) = &mut node.data {
                *g = Group::new();
            }
        }
        self.diff = Diff {
            full: true,
            ..Diff::default()
        };
        self.bump();
        debug!(version = self.version, "cleared complex");
    }

    // -- Internal mutation surface (operations layer only) --

    pub(crate) fn bump(&mut self) {
        self.version += 1;
    }

    pub(crate) fn gen_operation_index(&mut self) -> OperationIndex {
        let index = OperationIndex(self.next_op_index);
        self.next_op_index += 1;
        index
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                data: NodeData::Group(g),
                ..
            }) => &mut g.children,
            _ => panic!("node {id:?} is not a live group"),
        }
    }

    /// Allocates an id and appends a new node under `parent`. The caller has
    /// already validated the hierarchy.
    pub(crate) fn insert_node(&mut self, parent: NodeId, data: NodeData) -> (NodeId, usize) {
        let id = self.alloc_id();
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                attrs: BTreeMap::new(),
                data,
            },
        );
        let children = self.children_mut(parent);
        children.push(id);
        let index = children.len() - 1;
        if self.is_group(id) {
            self.refresh_transforms_from_root(id);
        }
        self.diff.record_created(id);
        self.bump();
        trace!(?id, ?parent, "inserted node");
        (id, index)
    }

    /// Clone of a node's full record, for operation replay.
    pub(crate) fn node_snapshot(&self, id: NodeId) -> Option<Node> {
        self.nodes.get(&id).cloned()
    }

    /// Detaches and removes a node, returning its payload and sibling index
    /// for later restoration.
    pub(crate) fn extract_node(&mut self, id: NodeId) -> (Node, usize) {
        let node = self
            .nodes
            .remove(&id)
            .expect("extract of a node that is not live");
        let parent = node.parent.expect("extract of the root group");
        let children = self.children_mut(parent);
        let index = children
            .iter()
            .position(|&c| c == id)
            .expect("node missing from its parent's child list");
        children.remove(index);
        self.diff.record_removed(id);
        self.bump();
        trace!(?id, "extracted node");
        (node, index)
    }

    /// Re-inserts a previously extracted node at its recorded sibling index.
    pub(crate) fn restore_node(&mut self, id: NodeId, node: Node, parent: NodeId, index: usize) {
        debug_assert_eq!(node.parent, Some(parent));
        self.nodes.insert(id, node);
        let children = self.children_mut(parent);
        let at = index.min(children.len());
        children.insert(at, id);
        if self.is_group(id) {
            self.refresh_transforms_from_root(id);
        }
        self.diff.record_created(id);
        self.bump();
    }

    /// Unlinks `id` from its current parent and inserts it under `parent` at
    /// `index` (clamped). Returns the previous parent, previous index, and
    /// the index actually applied.
    pub(crate) fn relink_node(
        &mut self,
        id: NodeId,
        parent: NodeId,
        index: usize,
    ) -> (NodeId, usize, usize) {
        let old_parent = self
            .parent(id)
            .expect("relink of the root group");
        let old_children = self.children_mut(old_parent);
        let old_index = old_children
            .iter()
            .position(|&c| c == id)
            .expect("node missing from its parent's child list");
        old_children.remove(old_index);

        let children = self.children_mut(parent);
        let at = index.min(children.len());
        children.insert(at, id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
        if self.is_group(id) {
            self.refresh_transforms_from_root(id);
        }
        self.diff.record_reparented(id);
        self.bump();
        (old_parent, old_index, at)
    }

    pub(crate) fn set_attr_internal(&mut self, id: NodeId, name: &str, value: &str) {
        let node = self
            .nodes
            .get_mut(&id)
            .expect("attribute write on a node that is not live");
        node.attrs.insert(name.to_string(), value.to_string());
        self.diff.record_attr(id, name);
        self.bump();
    }

    pub(crate) fn remove_attr_internal(&mut self, id: NodeId, name: &str) {
        let node = self
            .nodes
            .get_mut(&id)
            .expect("attribute removal on a node that is not live");
        node.attrs.remove(name);
        self.diff.record_attr(id, name);
        self.bump();
    }

    /// Sets a group's local transform and refreshes the cached inverse and
    /// the root-relative transforms of the whole subtree. Invertibility has
    /// been validated by the caller.
    pub(crate) fn apply_transform_internal(&mut self, id: NodeId, transform: Affine) {
        if let Some(Node {
            data: NodeData::Group(g),
            ..
        }) = self.nodes.get_mut(&id)
        {
            g.transform = transform;
            g.inverse_transform = transform.inverse();
        }
        self.refresh_transforms_from_root(id);
        self.diff.record_modified(id);
        self.bump();
    }

    /// Recomputes `transform_from_root` depth-first for `id` and all
    /// descendant groups.
    fn refresh_transforms_from_root(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(gid) = stack.pop() {
            let parent_tfr = self
                .parent(gid)
                .and_then(|p| self.group(p))
                .map_or(Affine::IDENTITY, Group::transform_from_root);
            if let Some(Node {
                data: NodeData::Group(g),
                ..
            }) = self.nodes.get_mut(&gid)
            {
                g.transform_from_root = parent_tfr * g.transform;
                stack.extend(g.children.iter().copied());
            }
        }
    }

    /// Rewrites every reference to key vertex `old` across the complex.
    /// Returns the affected cell ids, sorted.
    pub(crate) fn substitute_key_vertex_internal(
        &mut self,
        old: NodeId,
        new: NodeId,
    ) -> Vec<NodeId> {
        let mut affected = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            if let NodeData::Cell(cell) = &mut node.data {
                if cell.substitute_key_vertex(old, new) {
                    affected.push(*id);
                }
            }
        }
        affected.sort_unstable();
        for &id in &affected {
            self.diff.record_modified(id);
        }
        self.bump();
        affected
    }

    /// Replays a key-vertex substitution on exactly the given dependents.
    /// Used by undo/redo, which must not re-derive the affected set.
    pub(crate) fn substitute_key_vertex_on(
        &mut self,
        dependents: &[NodeId],
        from: NodeId,
        to: NodeId,
    ) {
        for id in dependents {
            let node = self
                .nodes
                .get_mut(id)
                .expect("substitution dependent is not live");
            if let NodeData::Cell(cell) = &mut node.data {
                cell.substitute_key_vertex(from, to);
            }
            self.diff.record_modified(*id);
        }
        self.bump();
    }

    /// Rewrites every reference to the key edge of `old` across the complex.
    /// Returns the affected cell ids, sorted.
    pub(crate) fn substitute_key_halfedge_internal(
        &mut self,
        old: KeyHalfedge,
        new: KeyHalfedge,
    ) -> Vec<NodeId> {
        let mut affected = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            if let NodeData::Cell(cell) = &mut node.data {
                if cell.substitute_key_halfedge(old, new) {
                    affected.push(*id);
                }
            }
        }
        affected.sort_unstable();
        for &id in &affected {
            self.diff.record_modified(id);
        }
        self.bump();
        affected
    }

    /// Replays a halfedge substitution on exactly the given dependents.
    pub(crate) fn substitute_key_halfedge_on(
        &mut self,
        dependents: &[NodeId],
        from: KeyHalfedge,
        to: KeyHalfedge,
    ) {
        for id in dependents {
            let node = self
                .nodes
                .get_mut(id)
                .expect("substitution dependent is not live");
            if let NodeData::Cell(cell) = &mut node.data {
                cell.substitute_key_halfedge(from, to);
            }
            self.diff.record_modified(*id);
        }
        self.bump();
    }

    /// First live cell that structurally references `id`, if any.
    pub(crate) fn find_dependent(&self, id: NodeId) -> Option<NodeId> {
        let mut deps: Vec<NodeId> = self
            .cells()
            .filter(|(_, c)| c.references(id))
            .map(|(i, _)| i)
            .collect();
        deps.sort_unstable();
        deps.first().copied()
    }

    /// Whether `node` is `ancestor` or a descendant of it.
    pub(crate) fn is_descendant_or_self(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.parent(id);
        }
        false
    }
}
