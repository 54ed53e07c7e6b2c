use kurbo::{Affine, Point};
use vacomplex::{AnimTime, Complex, Error, Operation};

fn assert_affine_eq(a: Affine, b: Affine) {
    let (ca, cb) = (a.as_coeffs(), b.as_coeffs());
    for i in 0..6 {
        assert!(
            (ca[i] - cb[i]).abs() < 1e-9,
            "affine mismatch at coeff {i}: {ca:?} vs {cb:?}"
        );
    }
}

#[test]
fn transform_from_root_composes_down_the_chain() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, g1).unwrap();
    let (_, g3) = Operation::create_group(&mut complex, g2).unwrap();

    let t1 = Affine::translate((10.0, 0.0));
    let t2 = Affine::scale(2.0);
    let t3 = Affine::rotate(std::f64::consts::FRAC_PI_2);
    Operation::set_transform(&mut complex, g1, t1).unwrap();
    Operation::set_transform(&mut complex, g2, t2).unwrap();
    Operation::set_transform(&mut complex, g3, t3).unwrap();

    assert_affine_eq(complex.transform_from_root(g1).unwrap(), t1);
    assert_affine_eq(complex.transform_from_root(g2).unwrap(), t1 * t2);
    assert_affine_eq(complex.transform_from_root(g3).unwrap(), t1 * t2 * t3);
}

#[test]
fn ancestor_edit_propagates_to_descendants() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, g1).unwrap();

    let t2 = Affine::scale(3.0);
    Operation::set_transform(&mut complex, g2, t2).unwrap();
    assert_affine_eq(complex.transform_from_root(g2).unwrap(), t2);

    let t1 = Affine::translate((5.0, -5.0));
    Operation::set_transform(&mut complex, g1, t1).unwrap();
    assert_affine_eq(complex.transform_from_root(g2).unwrap(), t1 * t2);
}

#[test]
fn reparenting_refreshes_root_transforms() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, root).unwrap();
    Operation::set_transform(&mut complex, g1, Affine::translate((1.0, 0.0))).unwrap();
    Operation::set_transform(&mut complex, g2, Affine::translate((0.0, 1.0))).unwrap();

    Operation::move_node(&mut complex, g2, g1, None).unwrap();
    assert_affine_eq(
        complex.transform_from_root(g2).unwrap(),
        Affine::translate((1.0, 1.0)),
    );
}

#[test]
fn inverse_transform_to_ancestor() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, g1).unwrap();
    Operation::set_transform(&mut complex, g1, Affine::translate((10.0, 0.0))).unwrap();
    Operation::set_transform(&mut complex, g2, Affine::scale(2.0)).unwrap();

    // Converting g1-local coordinates into g2-local space undoes g2's scale.
    let inv = complex.compute_inverse_transform_to(g2, g1).unwrap();
    assert_affine_eq(inv, Affine::scale(0.5));

    // Walking all the way to the root inverts the full chain.
    let inv = complex.compute_inverse_transform_to(g2, root).unwrap();
    let p = inv * (Affine::translate((10.0, 0.0)) * Affine::scale(2.0) * Point::new(3.0, 4.0));
    assert!((p.x - 3.0).abs() < 1e-9 && (p.y - 4.0).abs() < 1e-9);
}

#[test]
fn inverse_transform_to_non_ancestor_fails() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, root).unwrap();
    let err = complex.compute_inverse_transform_to(g1, g2).unwrap_err();
    assert!(matches!(err, Error::InvalidHierarchy(_)));
}

#[test]
fn singular_transform_is_rejected() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g) = Operation::create_group(&mut complex, root).unwrap();
    let err = Operation::set_transform(&mut complex, g, Affine::scale(0.0)).unwrap_err();
    assert_eq!(err, Error::NotInvertible(g));
    // Nothing was stored.
    assert_affine_eq(complex.group(g).unwrap().transform(), Affine::IDENTITY);
}

#[test]
fn move_into_own_subtree_is_rejected() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g1) = Operation::create_group(&mut complex, root).unwrap();
    let (_, g2) = Operation::create_group(&mut complex, g1).unwrap();

    let err = Operation::move_node(&mut complex, g1, g2, None).unwrap_err();
    assert!(matches!(err, Error::InvalidHierarchy(_)));
    let err = Operation::move_node(&mut complex, g1, g1, None).unwrap_err();
    assert!(matches!(err, Error::InvalidHierarchy(_)));
    assert_eq!(complex.parent(g2), Some(g1));
}

#[test]
fn group_bounding_box_unions_subtree() {
    let mut complex = Complex::new();
    let root = complex.root();
    let (_, g) = Operation::create_group(&mut complex, root).unwrap();
    Operation::create_key_vertex(&mut complex, g, AnimTime(0.0), Point::new(-1.0, -2.0)).unwrap();
    Operation::create_key_vertex(&mut complex, g, AnimTime(0.0), Point::new(3.0, 5.0)).unwrap();

    let bbox = complex.bounding_box_at(g, AnimTime(0.0)).unwrap();
    assert_eq!(bbox, kurbo::Rect::new(-1.0, -2.0, 3.0, 5.0));
}
