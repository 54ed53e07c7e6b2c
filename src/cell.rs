use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::cycle::{KeyCycle, KeyHalfedge};
use crate::error::{Error, Result};
use crate::model::{AnimTime, EdgeSampling, NodeId, SpatialKind, TemporalKind, TimeSpan};
use crate::Complex;

/// A 0-cell existing at a single instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyVertex {
    pub time: AnimTime,
    pub position: Point,
}

/// A 1-cell existing at a single instant. Closed iff `start == end`.
///
/// The sampling payload is opaque to the complex: stored on creation,
/// forwarded on query, never computed here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyEdge {
    pub time: AnimTime,
    pub start: NodeId,
    pub end: NodeId,
    pub sampling: EdgeSampling,
}

impl KeyEdge {
    pub fn is_closed(&self) -> bool {
        self.start == self.end
    }
}

/// A 2-cell existing at a single instant, bounded by an ordered list of
/// cycles (holes are extra cycles).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyFace {
    pub time: AnimTime,
    pub cycles: Vec<KeyCycle>,
}

/// A 0-cell spanning the open interval between two key vertices.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InbetweenVertex {
    pub source: NodeId,
    pub dest: NodeId,
}

/// A 1-cell spanning the open interval between two key edges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InbetweenEdge {
    pub source: NodeId,
    pub dest: NodeId,
}

/// A 2-cell spanning the open interval between two key faces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InbetweenFace {
    pub source: NodeId,
    pub dest: NodeId,
}

impl InbetweenVertex {
    /// Interpolated position at `t`, clamped to the span. Linear blend of the
    /// bounding key positions; richer temporal easing belongs to collaborators.
    pub fn position_at(&self, complex: &Complex, t: AnimTime) -> Result<Point> {
        let src = complex
            .key_vertex(self.source)
            .ok_or(Error::DanglingReference(self.source))?;
        let dst = complex
            .key_vertex(self.dest)
            .ok_or(Error::DanglingReference(self.dest))?;
        let u = TimeSpan::new(src.time, dst.time).normalized(t);
        Ok(src.position.lerp(dst.position, u))
    }
}

/// The closed set of cell variants.
///
/// Every capability (spatial kind, temporal kind, bounding box, substitution,
/// dependency check, description) is an exhaustive match over the six
/// variants, so adding a capability is compile-time checked everywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    KeyVertex(KeyVertex),
    KeyEdge(KeyEdge),
    KeyFace(KeyFace),
    InbetweenVertex(InbetweenVertex),
    InbetweenEdge(InbetweenEdge),
    InbetweenFace(InbetweenFace),
}

fn lerp_rect(a: Rect, b: Rect, u: f64) -> Rect {
    Rect::new(
        a.x0 + (b.x0 - a.x0) * u,
        a.y0 + (b.y0 - a.y0) * u,
        a.x1 + (b.x1 - a.x1) * u,
        a.y1 + (b.y1 - a.y1) * u,
    )
}

fn key_face_bbox(complex: &Complex, f: &KeyFace) -> Result<Rect> {
    let mut bbox: Option<Rect> = None;
    for cycle in &f.cycles {
        match cycle {
            KeyCycle::Steiner(v) => {
                let vertex = complex
                    .key_vertex(*v)
                    .ok_or(Error::DanglingReference(*v))?;
                let r = Rect::from_points(vertex.position, vertex.position);
                bbox = Some(bbox.map_or(r, |b| b.union(r)));
            }
            KeyCycle::Halfedges(halfedges) => {
                for h in halfedges {
                    let edge = complex
                        .key_edge(h.edge)
                        .ok_or(Error::DanglingReference(h.edge))?;
                    let r = edge.sampling.bounding_box();
                    bbox = Some(bbox.map_or(r, |b| b.union(r)));
                }
            }
        }
    }
    Ok(bbox.unwrap_or(Rect::ZERO))
}

impl Cell {
    pub fn spatial_kind(&self) -> SpatialKind {
        match self {
            Cell::KeyVertex(_) | Cell::InbetweenVertex(_) => SpatialKind::Vertex,
            Cell::KeyEdge(_) | Cell::InbetweenEdge(_) => SpatialKind::Edge,
            Cell::KeyFace(_) | Cell::InbetweenFace(_) => SpatialKind::Face,
        }
    }

    pub fn temporal_kind(&self) -> TemporalKind {
        match self {
            Cell::KeyVertex(_) | Cell::KeyEdge(_) | Cell::KeyFace(_) => TemporalKind::Key,
            Cell::InbetweenVertex(_) | Cell::InbetweenEdge(_) | Cell::InbetweenFace(_) => {
                TemporalKind::Inbetween
            }
        }
    }

    /// Time extent of the cell. Inbetween spans are resolved through the key
    /// cells that bound the interpolation.
    pub fn time_span(&self, complex: &Complex) -> Result<TimeSpan> {
        match self {
            Cell::KeyVertex(v) => Ok(TimeSpan::instant(v.time)),
            Cell::KeyEdge(e) => Ok(TimeSpan::instant(e.time)),
            Cell::KeyFace(f) => Ok(TimeSpan::instant(f.time)),
            Cell::InbetweenVertex(v) => {
                let src = complex
                    .key_vertex(v.source)
                    .ok_or(Error::DanglingReference(v.source))?;
                let dst = complex
                    .key_vertex(v.dest)
                    .ok_or(Error::DanglingReference(v.dest))?;
                Ok(TimeSpan::new(src.time, dst.time))
            }
            Cell::InbetweenEdge(e) => {
                let src = complex
                    .key_edge(e.source)
                    .ok_or(Error::DanglingReference(e.source))?;
                let dst = complex
                    .key_edge(e.dest)
                    .ok_or(Error::DanglingReference(e.dest))?;
                Ok(TimeSpan::new(src.time, dst.time))
            }
            Cell::InbetweenFace(f) => {
                let src = complex
                    .key_face(f.source)
                    .ok_or(Error::DanglingReference(f.source))?;
                let dst = complex
                    .key_face(f.dest)
                    .ok_or(Error::DanglingReference(f.dest))?;
                Ok(TimeSpan::new(src.time, dst.time))
            }
        }
    }

    pub fn exists_at(&self, complex: &Complex, t: AnimTime) -> Result<bool> {
        Ok(self.time_span(complex)?.contains(t))
    }

    /// Bounding box at `t`.
    ///
    /// Key cells ignore `t` (they are defined at a single instant but accept
    /// any input for API uniformity). Inbetween cells blend the boxes of
    /// their key endpoints, with `t` clamped to the span.
    pub fn bounding_box_at(&self, complex: &Complex, t: AnimTime) -> Result<Rect> {
        match self {
            Cell::KeyVertex(v) => Ok(Rect::from_points(v.position, v.position)),
            Cell::KeyEdge(e) => Ok(e.sampling.bounding_box()),
            Cell::KeyFace(f) => key_face_bbox(complex, f),
            Cell::InbetweenVertex(v) => {
                let p = v.position_at(complex, t)?;
                Ok(Rect::from_points(p, p))
            }
            Cell::InbetweenEdge(e) => {
                let src = complex
                    .key_edge(e.source)
                    .ok_or(Error::DanglingReference(e.source))?;
                let dst = complex
                    .key_edge(e.dest)
                    .ok_or(Error::DanglingReference(e.dest))?;
                let u = TimeSpan::new(src.time, dst.time).normalized(t);
                Ok(lerp_rect(
                    src.sampling.bounding_box(),
                    dst.sampling.bounding_box(),
                    u,
                ))
            }
            Cell::InbetweenFace(f) => {
                let src = complex
                    .key_face(f.source)
                    .ok_or(Error::DanglingReference(f.source))?;
                let dst = complex
                    .key_face(f.dest)
                    .ok_or(Error::DanglingReference(f.dest))?;
                let u = TimeSpan::new(src.time, dst.time).normalized(t);
                let a = key_face_bbox(complex, src)?;
                let b = key_face_bbox(complex, dst)?;
                Ok(lerp_rect(a, b, u))
            }
        }
    }

    /// Whether this cell holds a structural reference to `id` (endpoint,
    /// cycle member, or interpolation endpoint).
    pub fn references(&self, id: NodeId) -> bool {
        match self {
            Cell::KeyVertex(_) => false,
            Cell::KeyEdge(e) => e.start == id || e.end == id,
            Cell::KeyFace(f) => f.cycles.iter().any(|c| c.references(id)),
            Cell::InbetweenVertex(v) => v.source == id || v.dest == id,
            Cell::InbetweenEdge(e) => e.source == id || e.dest == id,
            Cell::InbetweenFace(f) => f.source == id || f.dest == id,
        }
    }

    /// Rewrites every reference to key vertex `old` to point at `new`.
    /// Returns whether anything changed.
    pub(crate) fn substitute_key_vertex(&mut self, old: NodeId, new: NodeId) -> bool {
        match self {
            Cell::KeyVertex(_) => false,
            Cell::KeyEdge(e) => {
                let mut changed = false;
                if e.start == old {
                    e.start = new;
                    changed = true;
                }
                if e.end == old {
                    e.end = new;
                    changed = true;
                }
                changed
            }
            Cell::KeyFace(f) => {
                let mut changed = false;
                for cycle in f.cycles.iter_mut() {
                    changed |= cycle.substitute_key_vertex(old, new);
                }
                changed
            }
            Cell::InbetweenVertex(v) => {
                let mut changed = false;
                if v.source == old {
                    v.source = new;
                    changed = true;
                }
                if v.dest == old {
                    v.dest = new;
                    changed = true;
                }
                changed
            }
            Cell::InbetweenEdge(_) | Cell::InbetweenFace(_) => false,
        }
    }

    /// Rewrites every reference to the key edge named by `old` (in either
    /// orientation) to the edge named by `new`. Returns whether anything
    /// changed.
    pub(crate) fn substitute_key_halfedge(&mut self, old: KeyHalfedge, new: KeyHalfedge) -> bool {
        match self {
            Cell::KeyVertex(_) | Cell::KeyEdge(_) | Cell::InbetweenVertex(_) => false,
            Cell::KeyFace(f) => {
                let mut changed = false;
                for cycle in f.cycles.iter_mut() {
                    changed |= cycle.substitute_key_halfedge(old, new);
                }
                changed
            }
            Cell::InbetweenEdge(e) => {
                let mut changed = false;
                if e.source == old.edge {
                    e.source = new.edge;
                    changed = true;
                }
                if e.dest == old.edge {
                    e.dest = new.edge;
                    changed = true;
                }
                changed
            }
            Cell::InbetweenFace(_) => false,
        }
    }

    /// Short human-readable description, for logs and debugging.
    pub fn describe(&self) -> String {
        match self {
            Cell::KeyVertex(v) => format!(
                "KeyVertex @ t={} ({}, {})",
                v.time.0, v.position.x, v.position.y
            ),
            Cell::KeyEdge(e) => {
                if e.is_closed() {
                    format!("KeyEdge @ t={} closed on {:?}", e.time.0, e.start)
                } else {
                    format!("KeyEdge @ t={} {:?} -> {:?}", e.time.0, e.start, e.end)
                }
            }
            Cell::KeyFace(f) => format!("KeyFace @ t={} ({} cycles)", f.time.0, f.cycles.len()),
            Cell::InbetweenVertex(v) => {
                format!("InbetweenVertex {:?} .. {:?}", v.source, v.dest)
            }
            Cell::InbetweenEdge(e) => format!("InbetweenEdge {:?} .. {:?}", e.source, e.dest),
            Cell::InbetweenFace(f) => format!("InbetweenFace {:?} .. {:?}", f.source, f.dest),
        }
    }

    pub fn as_key_vertex(&self) -> Option<&KeyVertex> {
        match self {
            Cell::KeyVertex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_key_edge(&self) -> Option<&KeyEdge> {
        match self {
            Cell::KeyEdge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_key_face(&self) -> Option<&KeyFace> {
        match self {
            Cell::KeyFace(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_inbetween_vertex(&self) -> Option<&InbetweenVertex> {
        match self {
            Cell::InbetweenVertex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_inbetween_edge(&self) -> Option<&InbetweenEdge> {
        match self {
            Cell::InbetweenEdge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inbetween_face(&self) -> Option<&InbetweenFace> {
        match self {
            Cell::InbetweenFace(f) => Some(f),
            _ => None,
        }
    }
}
