//! Atomic, undoable structural edits.
//!
//! Every constructor validates against the complex first and only then
//! applies its mutation, so a returned [`Operation`] has already happened
//! and can no longer fail: `undo`/`redo` replay precomputed inverse deltas.
//! Partial application is impossible; an operation that would violate an
//! invariant is rejected before anything is visible to the complex.
//!
//! Ordering of undo/redo calls is the responsibility of the log that stores
//! the operations; calling them out of sequence is a programming error and
//! asserts.

use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cell::{
    Cell, InbetweenEdge, InbetweenFace, InbetweenVertex, KeyEdge, KeyFace, KeyVertex,
};
use crate::cycle::{KeyCycle, KeyHalfedge};
use crate::error::{Error, Result};
use crate::groups::{Group, EPS_DET};
use crate::model::{AnimTime, EdgeSampling, NodeId};
use crate::{Complex, Node, NodeData};

/// Strictly increasing ordering index for operations, allocated by the
/// owning [`Complex`]. Scoped to the session; not persisted, not reused,
/// single-writer only.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OperationIndex(pub(crate) u64);

impl OperationIndex {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpState {
    Applied,
    Undone,
}

#[derive(Clone, Debug)]
enum OpKind {
    CreateNode {
        id: NodeId,
        parent: NodeId,
        index: usize,
        node: Node,
    },
    RemoveNode {
        id: NodeId,
        parent: NodeId,
        index: usize,
        node: Node,
    },
    MoveNode {
        id: NodeId,
        old_parent: NodeId,
        old_index: usize,
        new_parent: NodeId,
        new_index: usize,
    },
    CreateAttribute {
        id: NodeId,
        name: String,
        value: String,
    },
    RemoveAttribute {
        id: NodeId,
        name: String,
        value: String,
    },
    ChangeAttribute {
        id: NodeId,
        name: String,
        old: String,
        new: String,
    },
    SetTransform {
        id: NodeId,
        old: Affine,
        new: Affine,
    },
    SubstituteKeyVertex {
        old: NodeId,
        new: NodeId,
        dependents: Vec<NodeId>,
    },
    SubstituteKeyHalfedge {
        old: KeyHalfedge,
        new: KeyHalfedge,
        dependents: Vec<NodeId>,
    },
}

/// One structural edit, already applied, carrying everything needed to
/// replay it in either direction.
#[derive(Debug)]
pub struct Operation {
    index: OperationIndex,
    state: OpState,
    kind: OpKind,
}

fn require_group(complex: &Complex, id: NodeId) -> Result<()> {
    if complex.group(id).is_none() {
        return Err(Error::InvalidHierarchy(format!(
            "node {id:?} is not a live group"
        )));
    }
    Ok(())
}

fn require_key_vertex(complex: &Complex, id: NodeId) -> Result<AnimTime> {
    complex
        .key_vertex(id)
        .map(|v| v.time)
        .ok_or(Error::DanglingReference(id))
}

impl Operation {
    pub fn index(&self) -> OperationIndex {
        self.index
    }

    pub fn is_applied(&self) -> bool {
        self.state == OpState::Applied
    }

    fn applied(complex: &mut Complex, kind: OpKind) -> Operation {
        Operation {
            index: complex.gen_operation_index(),
            state: OpState::Applied,
            kind,
        }
    }

    // -- Structural operations --

    /// Creates an empty group under `parent`.
    pub fn create_group(complex: &mut Complex, parent: NodeId) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        Self::create_node(complex, parent, NodeData::Group(Group::new()))
    }

    /// Creates a key vertex under `parent`.
    pub fn create_key_vertex(
        complex: &mut Complex,
        parent: NodeId,
        time: AnimTime,
        position: Point,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        let cell = Cell::KeyVertex(KeyVertex { time, position });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    /// Creates a key edge under `parent`. Both endpoints must be live key
    /// vertices at `time`; `start == end` creates a closed loop edge.
    pub fn create_key_edge(
        complex: &mut Complex,
        parent: NodeId,
        time: AnimTime,
        start: NodeId,
        end: NodeId,
        sampling: EdgeSampling,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        let start_time = require_key_vertex(complex, start)?;
        let end_time = require_key_vertex(complex, end)?;
        if start_time != time || end_time != time {
            return Err(Error::InvalidHierarchy(
                "edge endpoints must exist at the edge's time".into(),
            ));
        }
        let cell = Cell::KeyEdge(KeyEdge {
            time,
            start,
            end,
            sampling,
        });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    /// Creates a key face under `parent`. Every cycle must be valid and every
    /// cell it references must exist at `time`; otherwise the complex is left
    /// unchanged.
    pub fn create_key_face(
        complex: &mut Complex,
        parent: NodeId,
        time: AnimTime,
        cycles: Vec<KeyCycle>,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        for cycle in &cycles {
            cycle.validate(complex)?;
            match cycle {
                KeyCycle::Steiner(v) => {
                    if require_key_vertex(complex, *v)? != time {
                        return Err(Error::InvalidCycle(
                            "Steiner vertex does not exist at the face's time".into(),
                        ));
                    }
                }
                KeyCycle::Halfedges(halfedges) => {
                    for h in halfedges {
                        let edge = complex
                            .key_edge(h.edge)
                            .ok_or(Error::DanglingReference(h.edge))?;
                        if edge.time != time {
                            return Err(Error::InvalidCycle(
                                "cycle edge does not exist at the face's time".into(),
                            ));
                        }
                    }
                }
            }
        }
        let cell = Cell::KeyFace(KeyFace { time, cycles });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    /// Creates an inbetween vertex interpolating `source` to `dest`.
    pub fn create_inbetween_vertex(
        complex: &mut Complex,
        parent: NodeId,
        source: NodeId,
        dest: NodeId,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        let t0 = require_key_vertex(complex, source)?;
        let t1 = require_key_vertex(complex, dest)?;
        if t0 >= t1 {
            return Err(Error::InvalidHierarchy(
                "inbetween endpoints must be in increasing time order".into(),
            ));
        }
        let cell = Cell::InbetweenVertex(InbetweenVertex { source, dest });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    /// Creates an inbetween edge interpolating `source` to `dest`.
    pub fn create_inbetween_edge(
        complex: &mut Complex,
        parent: NodeId,
        source: NodeId,
        dest: NodeId,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        let t0 = complex
            .key_edge(source)
            .map(|e| e.time)
            .ok_or(Error::DanglingReference(source))?;
        let t1 = complex
            .key_edge(dest)
            .map(|e| e.time)
            .ok_or(Error::DanglingReference(dest))?;
        if t0 >= t1 {
            return Err(Error::InvalidHierarchy(
                "inbetween endpoints must be in increasing time order".into(),
            ));
        }
        let cell = Cell::InbetweenEdge(InbetweenEdge { source, dest });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    /// Creates an inbetween face interpolating `source` to `dest`.
    pub fn create_inbetween_face(
        complex: &mut Complex,
        parent: NodeId,
        source: NodeId,
        dest: NodeId,
    ) -> Result<(Operation, NodeId)> {
        require_group(complex, parent)?;
        let t0 = complex
            .key_face(source)
            .map(|f| f.time)
            .ok_or(Error::DanglingReference(source))?;
        let t1 = complex
            .key_face(dest)
            .map(|f| f.time)
            .ok_or(Error::DanglingReference(dest))?;
        if t0 >= t1 {
            return Err(Error::InvalidHierarchy(
                "inbetween endpoints must be in increasing time order".into(),
            ));
        }
        let cell = Cell::InbetweenFace(InbetweenFace { source, dest });
        Self::create_node(complex, parent, NodeData::Cell(cell))
    }

    fn create_node(
        complex: &mut Complex,
        parent: NodeId,
        data: NodeData,
    ) -> Result<(Operation, NodeId)> {
        let (id, index) = complex.insert_node(parent, data);
        let node = complex
            .node_snapshot(id)
            .expect("just-inserted node is live");
        debug!(?id, ?parent, "create node");
        let op = Self::applied(
            complex,
            OpKind::CreateNode {
                id,
                parent,
                index,
                node,
            },
        );
        Ok((op, id))
    }

    /// Removes a node. Rejected if the node is the root, a group that still
    /// has children, or a cell that another live cell still references
    /// (substitute first).
    pub fn remove_node(complex: &mut Complex, id: NodeId) -> Result<Operation> {
        if !complex.contains(id) {
            return Err(Error::NotFound(id));
        }
        if id == complex.root() {
            return Err(Error::InvalidHierarchy("cannot remove the root group".into()));
        }
        if !complex.children(id)?.is_empty() {
            return Err(Error::InvalidHierarchy(
                "cannot remove a group that still has children".into(),
            ));
        }
        if let Some(dependent) = complex.find_dependent(id) {
            debug!(?id, ?dependent, "remove rejected: live dependent");
            return Err(Error::DanglingReference(id));
        }
        let (node, index) = complex.extract_node(id);
        let parent = node.parent.expect("non-root node has a parent");
        debug!(?id, "remove node");
        Ok(Self::applied(
            complex,
            OpKind::RemoveNode {
                id,
                parent,
                index,
                node,
            },
        ))
    }

    /// Moves a node under `new_parent` at `index` (clamped; `None` appends).
    /// Rejected if the move would make a node its own ancestor.
    pub fn move_node(
        complex: &mut Complex,
        id: NodeId,
        new_parent: NodeId,
        index: Option<usize>,
    ) -> Result<Operation> {
        if !complex.contains(id) {
            return Err(Error::NotFound(id));
        }
        if id == complex.root() {
            return Err(Error::InvalidHierarchy("cannot move the root group".into()));
        }
        require_group(complex, new_parent)?;
        if complex.is_descendant_or_self(new_parent, id) {
            return Err(Error::InvalidHierarchy(
                "move would create a cycle in the hierarchy".into(),
            ));
        }
        let requested = index.unwrap_or(usize::MAX);
        let (old_parent, old_index, new_index) = complex.relink_node(id, new_parent, requested);
        debug!(?id, ?new_parent, new_index, "move node");
        Ok(Self::applied(
            complex,
            OpKind::MoveNode {
                id,
                old_parent,
                old_index,
                new_parent,
                new_index,
            },
        ))
    }

    // -- Attribute operations --

    /// Creates an authored attribute. Rejected if the name is already set.
    pub fn create_attribute(
        complex: &mut Complex,
        id: NodeId,
        name: &str,
        value: &str,
    ) -> Result<Operation> {
        if !complex.contains(id) {
            return Err(Error::NotFound(id));
        }
        if complex.attribute(id, name).is_some() {
            return Err(Error::AttributeExists {
                node: id,
                name: name.to_string(),
            });
        }
        complex.set_attr_internal(id, name, value);
        Ok(Self::applied(
            complex,
            OpKind::CreateAttribute {
                id,
                name: name.to_string(),
                value: value.to_string(),
            },
        ))
    }

    /// Removes an authored attribute. Rejected if the name is not set.
    pub fn remove_attribute(complex: &mut Complex, id: NodeId, name: &str) -> Result<Operation> {
        if !complex.contains(id) {
            return Err(Error::NotFound(id));
        }
        let value = complex
            .attribute(id, name)
            .ok_or_else(|| Error::AttributeNotFound {
                node: id,
                name: name.to_string(),
            })?
            .to_string();
        complex.remove_attr_internal(id, name);
        Ok(Self::applied(
            complex,
            OpKind::RemoveAttribute {
                id,
                name: name.to_string(),
                value,
            },
        ))
    }

    /// Changes an existing authored attribute. Rejected if the name is not
    /// set.
    pub fn change_attribute(
        complex: &mut Complex,
        id: NodeId,
        name: &str,
        value: &str,
    ) -> Result<Operation> {
        if !complex.contains(id) {
            return Err(Error::NotFound(id));
        }
        let old = complex
            .attribute(id, name)
            .ok_or_else(|| Error::AttributeNotFound {
                node: id,
                name: name.to_string(),
            })?
            .to_string();
        complex.set_attr_internal(id, name, value);
        Ok(Self::applied(
            complex,
            OpKind::ChangeAttribute {
                id,
                name: name.to_string(),
                old,
                new: value.to_string(),
            },
        ))
    }

    // -- Transform operation --

    /// Sets a group's local transform. Rejected if the transform is not
    /// invertible within tolerance; no sentinel matrix is ever stored.
    pub fn set_transform(
        complex: &mut Complex,
        id: NodeId,
        transform: Affine,
    ) -> Result<Operation> {
        let group = complex.group(id).ok_or(Error::NotFound(id))?;
        if transform.determinant().abs() <= EPS_DET {
            return Err(Error::NotInvertible(id));
        }
        let old = group.transform();
        complex.apply_transform_internal(id, transform);
        Ok(Self::applied(
            complex,
            OpKind::SetTransform {
                id,
                old,
                new: transform,
            },
        ))
    }

    // -- Substitution operations --

    /// Rewrites every reference to key vertex `old` to point at `new`, across
    /// all dependent cells atomically. The replacement must exist at the same
    /// time as the vertex it stands in for; otherwise dependent edges would be
    /// left with endpoints outside their instant and inbetween spans could
    /// invert.
    pub fn substitute_key_vertex(
        complex: &mut Complex,
        old: NodeId,
        new: NodeId,
    ) -> Result<Operation> {
        let old_time = require_key_vertex(complex, old)?;
        let new_time = require_key_vertex(complex, new)?;
        if old == new {
            return Err(Error::InvalidHierarchy(
                "substitution endpoints must be distinct".into(),
            ));
        }
        if new_time != old_time {
            return Err(Error::InvalidHierarchy(
                "substitution must preserve the vertex's time".into(),
            ));
        }
        let dependents = complex.substitute_key_vertex_internal(old, new);
        debug!(?old, ?new, affected = dependents.len(), "substitute key vertex");
        Ok(Self::applied(
            complex,
            OpKind::SubstituteKeyVertex {
                old,
                new,
                dependents,
            },
        ))
    }

    /// Rewrites every reference to the key edge of `old` (in either
    /// orientation) to the edge of `new`, across all dependent cells
    /// atomically. The replacement must connect the same vertices in the same
    /// direction, so every cycle walking through `old` still closes after the
    /// rewrite. Matching endpoints also pin the time: an edge and its
    /// endpoints always share an instant.
    pub fn substitute_key_halfedge(
        complex: &mut Complex,
        old: KeyHalfedge,
        new: KeyHalfedge,
    ) -> Result<Operation> {
        if complex.key_edge(old.edge).is_none() {
            return Err(Error::DanglingReference(old.edge));
        }
        if complex.key_edge(new.edge).is_none() {
            return Err(Error::DanglingReference(new.edge));
        }
        if old.edge == new.edge {
            return Err(Error::InvalidHierarchy(
                "substitution endpoints must be distinct".into(),
            ));
        }
        if new.start_vertex(complex)? != old.start_vertex(complex)?
            || new.end_vertex(complex)? != old.end_vertex(complex)?
        {
            return Err(Error::InvalidCycle(
                "replacement halfedge must connect the same vertices".into(),
            ));
        }
        let dependents = complex.substitute_key_halfedge_internal(old, new);
        debug!(
            old = ?old.edge,
            new = ?new.edge,
            affected = dependents.len(),
            "substitute key halfedge"
        );
        Ok(Self::applied(
            complex,
            OpKind::SubstituteKeyHalfedge {
                old,
                new,
                dependents,
            },
        ))
    }

    // -- Undo / redo --

    /// Reverts this operation. Must only be called in Applied state, in the
    /// reverse order the log applied things; replays the recorded inverse
    /// delta and cannot fail.
    pub fn undo(&mut self, complex: &mut Complex) {
        assert!(
            self.state == OpState::Applied,
            "undo called on an operation that is not applied"
        );
        match &self.kind {
            OpKind::CreateNode { id, .. } => {
                complex.extract_node(*id);
            }
            OpKind::RemoveNode {
                id,
                parent,
                index,
                node,
            } => {
                complex.restore_node(*id, node.clone(), *parent, *index);
            }
            OpKind::MoveNode {
                id,
                old_parent,
                old_index,
                ..
            } => {
                complex.relink_node(*id, *old_parent, *old_index);
            }
            OpKind::CreateAttribute { id, name, .. } => {
                complex.remove_attr_internal(*id, name);
            }
            OpKind::RemoveAttribute { id, name, value } => {
                complex.set_attr_internal(*id, name, value);
            }
            OpKind::ChangeAttribute { id, name, old, .. } => {
                complex.set_attr_internal(*id, name, old);
            }
            OpKind::SetTransform { id, old, .. } => {
                complex.apply_transform_internal(*id, *old);
            }
            OpKind::SubstituteKeyVertex {
                old,
                new,
                dependents,
            } => {
                complex.substitute_key_vertex_on(dependents, *new, *old);
            }
            OpKind::SubstituteKeyHalfedge {
                old,
                new,
                dependents,
            } => {
                complex.substitute_key_halfedge_on(dependents, *new, *old);
            }
        }
        self.state = OpState::Undone;
    }

    /// Re-applies this operation after an undo. Must only be called in
    /// Undone state; replays the recorded delta and cannot fail.
    pub fn redo(&mut self, complex: &mut Complex) {
        assert!(
            self.state == OpState::Undone,
            "redo called on an operation that is not undone"
        );
        match &self.kind {
            OpKind::CreateNode {
                id,
                parent,
                index,
                node,
            } => {
                complex.restore_node(*id, node.clone(), *parent, *index);
            }
            OpKind::RemoveNode { id, .. } => {
                complex.extract_node(*id);
            }
            OpKind::MoveNode {
                id,
                new_parent,
                new_index,
                ..
            } => {
                complex.relink_node(*id, *new_parent, *new_index);
            }
            OpKind::CreateAttribute { id, name, value } => {
                complex.set_attr_internal(*id, name, value);
            }
            OpKind::RemoveAttribute { id, name, .. } => {
                complex.remove_attr_internal(*id, name);
            }
            OpKind::ChangeAttribute { id, name, new, .. } => {
                complex.set_attr_internal(*id, name, new);
            }
            OpKind::SetTransform { id, new, .. } => {
                complex.apply_transform_internal(*id, *new);
            }
            OpKind::SubstituteKeyVertex {
                old,
                new,
                dependents,
            } => {
                complex.substitute_key_vertex_on(dependents, *old, *new);
            }
            OpKind::SubstituteKeyHalfedge {
                old,
                new,
                dependents,
            } => {
                complex.substitute_key_halfedge_on(dependents, *old, *new);
            }
        }
        self.state = OpState::Applied;
    }
}

/// Merges two key vertices into a fresh one at their midpoint, rewriting
/// every dependent cell, then removes the originals. Transactional: on any
/// validation failure the already-applied steps are undone and the complex
/// is left untouched. Returns the applied operations (for the undo log) and
/// the merged vertex id.
///
/// One diff batch: the merged vertex is created, the originals are removed,
/// dependents are marked modified; edge count is unchanged.
pub fn glue_key_vertices(
    complex: &mut Complex,
    a: NodeId,
    b: NodeId,
) -> Result<(Vec<Operation>, NodeId)> {
    let time_a = require_key_vertex(complex, a)?;
    let time_b = require_key_vertex(complex, b)?;
    if a == b {
        return Err(Error::InvalidHierarchy(
            "glue requires two distinct vertices".into(),
        ));
    }
    if time_a != time_b {
        return Err(Error::InvalidHierarchy(
            "glued vertices must exist at the same time".into(),
        ));
    }
    let pos_a = complex
        .key_vertex(a)
        .map(|v| v.position)
        .ok_or(Error::DanglingReference(a))?;
    let pos_b = complex
        .key_vertex(b)
        .map(|v| v.position)
        .ok_or(Error::DanglingReference(b))?;
    let parent = complex.parent(a).ok_or(Error::NotFound(a))?;

    let mut ops: Vec<Operation> = Vec::new();
    let result = (|| -> Result<NodeId> {
        let (op, merged) = Operation::create_key_vertex(
            complex,
            parent,
            time_a,
            pos_a.midpoint(pos_b),
        )?;
        ops.push(op);
        ops.push(Operation::substitute_key_vertex(complex, a, merged)?);
        ops.push(Operation::substitute_key_vertex(complex, b, merged)?);
        ops.push(Operation::remove_node(complex, a)?);
        ops.push(Operation::remove_node(complex, b)?);
        Ok(merged)
    })();

    match result {
        Ok(merged) => {
            debug!(?a, ?b, ?merged, "glued key vertices");
            Ok((ops, merged))
        }
        Err(e) => {
            for op in ops.iter_mut().rev() {
                op.undo(complex);
            }
            Err(e)
        }
    }
}
