use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::NodeId;
use crate::Complex;

/// An oriented reference to a key edge.
///
/// Pure value type: it borrows the identity of the edge it names and owns
/// nothing. Two halfedges are equal iff they name the same edge with the same
/// direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHalfedge {
    pub edge: NodeId,
    /// `true` walks the edge from its start vertex to its end vertex.
    pub direction: bool,
}

impl KeyHalfedge {
    pub fn new(edge: NodeId, direction: bool) -> Self {
        KeyHalfedge { edge, direction }
    }

    pub fn opposite(self) -> Self {
        KeyHalfedge {
            edge: self.edge,
            direction: !self.direction,
        }
    }

    /// The vertex this halfedge starts at, per its direction.
    pub fn start_vertex(&self, complex: &Complex) -> Result<NodeId> {
        let edge = complex
            .key_edge(self.edge)
            .ok_or(Error::DanglingReference(self.edge))?;
        Ok(if self.direction { edge.start } else { edge.end })
    }

    /// The vertex this halfedge ends at, per its direction.
    pub fn end_vertex(&self, complex: &Complex) -> Result<NodeId> {
        let edge = complex
            .key_edge(self.edge)
            .ok_or(Error::DanglingReference(self.edge))?;
        Ok(if self.direction { edge.end } else { edge.start })
    }

    /// Whether the underlying edge is a closed loop (start == end).
    pub fn is_closed(&self, complex: &Complex) -> Result<bool> {
        let edge = complex
            .key_edge(self.edge)
            .ok_or(Error::DanglingReference(self.edge))?;
        Ok(edge.is_closed())
    }
}

/// A closed boundary loop of a key face.
///
/// Either a single Steiner vertex (a point boundary with no edges) or a
/// non-empty halfedge chain where each halfedge's end vertex is the next
/// one's start vertex, cyclically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyCycle {
    Steiner(NodeId),
    Halfedges(Vec<KeyHalfedge>),
}

impl KeyCycle {
    /// Checks the closure / Steiner invariant against the complex. An invalid
    /// cycle must never be attached to a key face.
    pub fn validate(&self, complex: &Complex) -> Result<()> {
        match self {
            KeyCycle::Steiner(v) => {
                if complex.key_vertex(*v).is_none() {
                    return Err(Error::DanglingReference(*v));
                }
                Ok(())
            }
            KeyCycle::Halfedges(halfedges) => {
                if halfedges.is_empty() {
                    return Err(Error::InvalidCycle("cycle has no halfedges".into()));
                }
                for w in halfedges.windows(2) {
                    if w[0].end_vertex(complex)? != w[1].start_vertex(complex)? {
                        return Err(Error::InvalidCycle(
                            "halfedge chain does not connect".into(),
                        ));
                    }
                }
                let first = &halfedges[0];
                let last = &halfedges[halfedges.len() - 1];
                if last.end_vertex(complex)? != first.start_vertex(complex)? {
                    return Err(Error::InvalidCycle("halfedge chain does not close".into()));
                }
                Ok(())
            }
        }
    }

    /// Ids of the key edges this cycle walks, in order.
    pub fn edges(&self) -> Vec<NodeId> {
        match self {
            KeyCycle::Steiner(_) => Vec::new(),
            KeyCycle::Halfedges(halfedges) => halfedges.iter().map(|h| h.edge).collect(),
        }
    }

    /// Whether the cycle references `id` as its Steiner vertex or through a
    /// halfedge.
    pub fn references(&self, id: NodeId) -> bool {
        match self {
            KeyCycle::Steiner(v) => *v == id,
            KeyCycle::Halfedges(halfedges) => halfedges.iter().any(|h| h.edge == id),
        }
    }

    pub(crate) fn substitute_key_vertex(&mut self, old: NodeId, new: NodeId) -> bool {
        match self {
            KeyCycle::Steiner(v) if *v == old => {
                *v = new;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn substitute_key_halfedge(&mut self, old: KeyHalfedge, new: KeyHalfedge) -> bool {
        let mut changed = false;
        if let KeyCycle::Halfedges(halfedges) = self {
            for h in halfedges.iter_mut() {
                if *h == old {
                    *h = new;
                    changed = true;
                } else if *h == old.opposite() {
                    *h = new.opposite();
                    changed = true;
                }
            }
        }
        changed
    }
}
