use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Identity of a node (cell or group) inside a [`Complex`](crate::Complex).
///
/// Ids are allocated monotonically and never reused while the complex is
/// alive, including across [`clear`](crate::Complex::clear). An id is the only
/// valid long-lived handle to a node; references obtained through the query
/// surface are valid only within a single call.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// An instant on the animation timeline.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct AnimTime(pub f64);

/// Time extent of a cell: a single instant for key cells, an interval for
/// inbetween cells. Inbetween cells exist on the open interval; the endpoints
/// belong to the bounding key cells.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: AnimTime,
    pub end: AnimTime,
}

impl TimeSpan {
    pub fn instant(t: AnimTime) -> Self {
        TimeSpan { start: t, end: t }
    }

    pub fn new(start: AnimTime, end: AnimTime) -> Self {
        TimeSpan { start, end }
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, t: AnimTime) -> bool {
        if self.is_instant() {
            t == self.start
        } else {
            self.start < t && t < self.end
        }
    }

    /// Normalized position of `t` within the span, clamped to `[0, 1]`.
    /// An instant span maps everything to `0`.
    pub fn normalized(&self, t: AnimTime) -> f64 {
        let len = self.end.0 - self.start.0;
        if len <= 0.0 {
            return 0.0;
        }
        ((t.0 - self.start.0) / len).clamp(0.0, 1.0)
    }
}

/// Topological dimension of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialKind {
    Vertex,
    Edge,
    Face,
}

/// Temporal nature of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalKind {
    Key,
    Inbetween,
}

/// Opaque sampled centerline attached to a key edge.
///
/// The complex stores and forwards this payload; it never computes or
/// interprets the geometry. Collaborators use it for bounding-box and
/// intersection queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeSampling {
    centerline: Vec<Point>,
    bbox: Rect,
}

impl EdgeSampling {
    pub fn from_centerline(centerline: Vec<Point>) -> Self {
        let bbox = centerline
            .iter()
            .map(|p| Rect::from_points(*p, *p))
            .reduce(|a, b| a.union(b))
            .unwrap_or(Rect::ZERO);
        EdgeSampling { centerline, bbox }
    }

    pub fn empty() -> Self {
        EdgeSampling {
            centerline: Vec::new(),
            bbox: Rect::ZERO,
        }
    }

    pub fn centerline(&self) -> &[Point] {
        &self.centerline
    }

    pub fn bounding_box(&self) -> Rect {
        self.bbox
    }
}
