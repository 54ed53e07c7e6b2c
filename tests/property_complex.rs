use kurbo::{Affine, Point};
use proptest::prelude::*;
use vacomplex::{
    glue_key_vertices, AnimTime, Cell, Complex, EdgeSampling, KeyCycle, NodeId, Operation,
};

#[derive(Clone, Debug)]
enum Op {
    AddVertex { late: bool, x: i16, y: i16 },
    AddEdge { a: u16, b: u16 },
    AddSteinerFace { v: u16 },
    AddInbetween { a: u16, b: u16 },
    AddGroup { parent: u16 },
    Remove { idx: u16 },
    Glue { a: u16, b: u16 },
    Translate { idx: u16, dx: i8, dy: i8 },
    MoveInto { idx: u16, parent: u16 },
    SetAttr { idx: u16, value: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<bool>(), any::<i16>(), any::<i16>())
            .prop_map(|(late, x, y)| Op::AddVertex { late, x, y }),
        (any::<u16>(), any::<u16>()).prop_map(|(a, b)| Op::AddEdge { a, b }),
        any::<u16>().prop_map(|v| Op::AddSteinerFace { v }),
        (any::<u16>(), any::<u16>()).prop_map(|(a, b)| Op::AddInbetween { a, b }),
        any::<u16>().prop_map(|parent| Op::AddGroup { parent }),
        any::<u16>().prop_map(|idx| Op::Remove { idx }),
        (any::<u16>(), any::<u16>()).prop_map(|(a, b)| Op::Glue { a, b }),
        (any::<u16>(), any::<i8>(), any::<i8>())
            .prop_map(|(idx, dx, dy)| Op::Translate { idx, dx, dy }),
        (any::<u16>(), any::<u16>()).prop_map(|(idx, parent)| Op::MoveInto { idx, parent }),
        (any::<u16>(), any::<u8>()).prop_map(|(idx, value)| Op::SetAttr { idx, value }),
    ]
}

/// Deterministic shadow of the live ids, kept outside the complex so that
/// index-modulo picks do not depend on hash iteration order.
#[derive(Default)]
struct ModelState {
    vertices: Vec<NodeId>,
    groups: Vec<NodeId>,
    all: Vec<NodeId>,
}

impl ModelState {
    fn created(&mut self, complex: &Complex, id: NodeId) {
        self.all.push(id);
        if complex.key_vertex(id).is_some() {
            self.vertices.push(id);
        } else if complex.is_group(id) {
            self.groups.push(id);
        }
    }

    fn removed(&mut self, id: NodeId) {
        self.vertices.retain(|&v| v != id);
        self.groups.retain(|&g| g != id);
        self.all.retain(|&n| n != id);
    }

    fn pick(pool: &[NodeId], idx: u16) -> Option<NodeId> {
        if pool.is_empty() {
            None
        } else {
            Some(pool[(idx as usize) % pool.len()])
        }
    }
}

fn apply_op(complex: &mut Complex, state: &mut ModelState, log: &mut Vec<Operation>, op: Op) {
    let root = complex.root();
    match op {
        Op::AddVertex { late, x, y } => {
            let t = AnimTime(if late { 1.0 } else { 0.0 });
            let p = Point::new(x as f64 * 0.1, y as f64 * 0.1);
            if let Ok((op, id)) = Operation::create_key_vertex(complex, root, t, p) {
                state.created(complex, id);
                log.push(op);
            }
        }
        Op::AddEdge { a, b } => {
            let (Some(a), Some(b)) = (
                ModelState::pick(&state.vertices, a),
                ModelState::pick(&state.vertices, b),
            ) else {
                return;
            };
            let Some(t) = complex.key_vertex(a).map(|v| v.time) else {
                return;
            };
            if let Ok((op, id)) =
                Operation::create_key_edge(complex, root, t, a, b, EdgeSampling::empty())
            {
                state.created(complex, id);
                log.push(op);
            }
        }
        Op::AddSteinerFace { v } => {
            let Some(v) = ModelState::pick(&state.vertices, v) else {
                return;
            };
            let Some(t) = complex.key_vertex(v).map(|v| v.time) else {
                return;
            };
            if let Ok((op, id)) =
                Operation::create_key_face(complex, root, t, vec![KeyCycle::Steiner(v)])
            {
                state.created(complex, id);
                log.push(op);
            }
        }
        Op::AddInbetween { a, b } => {
            let (Some(a), Some(b)) = (
                ModelState::pick(&state.vertices, a),
                ModelState::pick(&state.vertices, b),
            ) else {
                return;
            };
            if let Ok((op, id)) = Operation::create_inbetween_vertex(complex, root, a, b) {
                state.created(complex, id);
                log.push(op);
            }
        }
        Op::AddGroup { parent } => {
            let parent = ModelState::pick(&state.groups, parent).unwrap_or(root);
            if let Ok((op, id)) = Operation::create_group(complex, parent) {
                state.created(complex, id);
                log.push(op);
            }
        }
        Op::Remove { idx } => {
            let Some(id) = ModelState::pick(&state.all, idx) else {
                return;
            };
            if let Ok(op) = Operation::remove_node(complex, id) {
                state.removed(id);
                log.push(op);
            }
        }
        Op::Glue { a, b } => {
            let (Some(a), Some(b)) = (
                ModelState::pick(&state.vertices, a),
                ModelState::pick(&state.vertices, b),
            ) else {
                return;
            };
            if let Ok((ops, merged)) = glue_key_vertices(complex, a, b) {
                state.removed(a);
                state.removed(b);
                state.created(complex, merged);
                log.extend(ops);
            }
        }
        Op::Translate { idx, dx, dy } => {
            let Some(g) = ModelState::pick(&state.groups, idx) else {
                return;
            };
            let t = Affine::translate((dx as f64 * 0.5, dy as f64 * 0.5));
            if let Ok(op) = Operation::set_transform(complex, g, t) {
                log.push(op);
            }
        }
        Op::MoveInto { idx, parent } => {
            let (Some(id), Some(parent)) = (
                ModelState::pick(&state.all, idx),
                ModelState::pick(&state.groups, parent),
            ) else {
                return;
            };
            if let Ok(op) = Operation::move_node(complex, id, parent, None) {
                log.push(op);
            }
        }
        Op::SetAttr { idx, value } => {
            let Some(id) = ModelState::pick(&state.all, idx) else {
                return;
            };
            let value = value.to_string();
            let op = if complex.attribute(id, "label").is_some() {
                Operation::change_attribute(complex, id, "label", &value)
            } else {
                Operation::create_attribute(complex, id, "label", &value)
            };
            if let Ok(op) = op {
                log.push(op);
            }
        }
    }
}

fn assert_invariants(complex: &Complex) {
    let root = complex.root();
    for id in complex.node_ids() {
        // Parent/child symmetry.
        match complex.parent(id) {
            None => assert_eq!(id, root, "only the root may be parentless"),
            Some(p) => {
                let siblings = complex.children(p).unwrap();
                assert_eq!(
                    siblings.iter().filter(|&&c| c == id).count(),
                    1,
                    "node {id:?} must appear exactly once under its parent"
                );
            }
        }
        for &child in complex.children(id).unwrap() {
            assert_eq!(complex.parent(child), Some(id));
        }
        // Cached root transforms stay consistent with the chain.
        if let Some(g) = complex.group(id) {
            let parent_tfr = complex
                .parent(id)
                .map_or(Affine::IDENTITY, |p| complex.transform_from_root(p).unwrap());
            let expect = (parent_tfr * g.transform()).as_coeffs();
            let got = g.transform_from_root().as_coeffs();
            for i in 0..6 {
                assert!(
                    (expect[i] - got[i]).abs() < 1e-9,
                    "stale cached transform on {id:?}"
                );
            }
        }
    }
    // No structural reference dangles.
    for (id, cell) in complex.cells() {
        match cell {
            Cell::KeyVertex(_) => {}
            Cell::KeyEdge(e) => {
                for v in [e.start, e.end] {
                    let vertex = complex
                        .key_vertex(v)
                        .unwrap_or_else(|| panic!("edge {id:?} dangles on {v:?}"));
                    assert_eq!(vertex.time, e.time);
                }
            }
            Cell::KeyFace(f) => {
                for cycle in &f.cycles {
                    cycle.validate(complex).unwrap();
                }
            }
            Cell::InbetweenVertex(iv) => {
                let t0 = complex.key_vertex(iv.source).expect("dangling source").time;
                let t1 = complex.key_vertex(iv.dest).expect("dangling dest").time;
                assert!(t0 < t1);
            }
            Cell::InbetweenEdge(ie) => {
                assert!(complex.key_edge(ie.source).is_some());
                assert!(complex.key_edge(ie.dest).is_some());
            }
            Cell::InbetweenFace(ifc) => {
                assert!(complex.key_face(ifc.source).is_some());
                assert!(complex.key_face(ifc.dest).is_some());
            }
        }
    }
}

fn sequence_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 5..40)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 512, .. ProptestConfig::default() })]

    #[test]
    fn edit_sequences_preserve_invariants(seq in sequence_strategy()) {
        let mut complex = Complex::new();
        let mut state = ModelState::default();
        let mut log = Vec::new();
        for op in seq {
            apply_op(&mut complex, &mut state, &mut log, op);
            assert_invariants(&complex);
        }
    }

    #[test]
    fn undoing_the_whole_log_restores_the_initial_complex(seq in sequence_strategy()) {
        let mut complex = Complex::new();
        let root = complex.root();
        let mut state = ModelState::default();
        let mut log = Vec::new();
        for op in seq {
            apply_op(&mut complex, &mut state, &mut log, op);
        }

        for op in log.iter_mut().rev() {
            op.undo(&mut complex);
        }
        prop_assert_eq!(complex.node_ids().count(), 1);
        prop_assert!(complex.contains(root));
        prop_assert!(complex.attributes(root).unwrap().is_empty());
        prop_assert_eq!(
            complex.group(root).unwrap().transform(),
            Affine::IDENTITY
        );
        // Every transient create/remove pair cancelled out of the diff.
        prop_assert!(complex.pending_diff().is_empty());
    }

    #[test]
    fn version_never_decreases(seq in sequence_strategy()) {
        let mut complex = Complex::new();
        let mut state = ModelState::default();
        let mut log = Vec::new();
        let mut last = complex.version();
        for op in seq {
            apply_op(&mut complex, &mut state, &mut log, op);
            prop_assert!(complex.version() >= last);
            last = complex.version();
        }
        for op in log.iter_mut().rev() {
            op.undo(&mut complex);
            prop_assert!(complex.version() > last);
            last = complex.version();
        }
    }
}
