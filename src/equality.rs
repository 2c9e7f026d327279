//! Structural equality over plain data, and the shallow equality used to
//! decide whether a freshly queried cluster list differs from the last one.
//!
//! Options and viewport snapshots are rebuilt on every evaluation, so identity
//! is never a useful change signal for them. [`DeepEq`] compares by value and
//! treats `NaN` as equal to itself, which keeps a snapshot containing `NaN`
//! from looking "changed" forever. Shared pointers short-circuit on identity
//! before falling back to their contents.

use std::rc::Rc;
use std::sync::Arc;

use crate::feature::Cluster;
use crate::geo::Geometry;

/// Structural equality.
pub trait DeepEq {
    fn deep_eq(&self, other: &Self) -> bool;
}

/// Compare two values structurally.
#[inline]
pub fn deep_equal<T: DeepEq + ?Sized>(a: &T, b: &T) -> bool {
    return a.deep_eq(b);
}

impl DeepEq for f64 {
    #[inline]
    fn deep_eq(&self, other: &Self) -> bool {
        return self == other || (self.is_nan() && other.is_nan());
    }
}

impl DeepEq for f32 {
    #[inline]
    fn deep_eq(&self, other: &Self) -> bool {
        return self == other || (self.is_nan() && other.is_nan());
    }
}

macro_rules! deep_eq_by_partial_eq {
    ($($ty:ty),*) => {
        $(
            impl DeepEq for $ty {
                #[inline]
                fn deep_eq(&self, other: &Self) -> bool {
                    return self == other;
                }
            }
        )*
    };
}

deep_eq_by_partial_eq!(bool, char, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, str, String);

impl<T: DeepEq> DeepEq for [T] {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.deep_eq(b));
    }
}

impl<T: DeepEq, const N: usize> DeepEq for [T; N] {
    fn deep_eq(&self, other: &Self) -> bool {
        return self[..].deep_eq(&other[..]);
    }
}

impl<T: DeepEq> DeepEq for Vec<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        return self[..].deep_eq(&other[..]);
    }
}

impl<T: DeepEq> DeepEq for Option<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        return match (self, other) {
            (Some(a), Some(b)) => a.deep_eq(b),
            (None, None) => true,
            _ => false,
        };
    }
}

impl<A: DeepEq, B: DeepEq> DeepEq for (A, B) {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.0.deep_eq(&other.0) && self.1.deep_eq(&other.1);
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Box<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        return (**self).deep_eq(&**other);
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Rc<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        return Rc::ptr_eq(self, other) || (**self).deep_eq(&**other);
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Arc<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        return Arc::ptr_eq(self, other) || (**self).deep_eq(&**other);
    }
}

#[cfg(feature = "serde")]
impl DeepEq for serde_json::Value {
    fn deep_eq(&self, other: &Self) -> bool {
        use serde_json::Value;
        return match (self, other) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.deep_eq(&y),
                _ => a == b,
            },
            (Value::Array(a), Value::Array(b)) => a.deep_eq(b),
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| b.get(key).is_some_and(|v| value.deep_eq(v)))
            }
            _ => self == other,
        };
    }
}

/// Compare two cluster lists by identity, kind, id and geometry only.
///
/// Entries match pairwise when they are the same allocation, or when they
/// have the same kind, the same id and equal geometry. Aggregate properties
/// of cluster features are NOT compared: a cluster whose reduced properties
/// changed while its id and centroid stayed put counts as unchanged.
pub fn clusters_shallow_equal<P, C>(list1: &[Cluster<P, C>], list2: &[Cluster<P, C>]) -> bool {
    if list1.len() != list2.len() {
        return false;
    }

    return list1.iter().zip(list2).all(|(a, b)| {
        a.ptr_eq(b) || (a.kind() == b.kind() && a.id() == b.id() && geometry_equal(a.geometry(), b.geometry()))
    });
}

fn geometry_equal(a: &Geometry, b: &Geometry) -> bool {
    return std::ptr::eq(a, b) || (a.kind() == b.kind() && a.coordinates().deep_eq(b.coordinates()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{ClusterFeature, PointFeature, PointRef};

    fn point(id: u64, lng: f64, lat: f64) -> Cluster<(), ()> {
        return Cluster::Point(PointRef::single(PointFeature::new(lng, lat, ()).with_id(id)));
    }

    fn cluster(cluster_id: u64, count: usize, lng: f64, lat: f64, sum: u32) -> Cluster<(), u32> {
        return Cluster::Cluster(Arc::new(ClusterFeature::new(
            cluster_id,
            count,
            Geometry::point(lng, lat),
            Some(sum),
        )));
    }

    #[test]
    fn floats_treat_nan_as_equal() {
        assert!(deep_equal(&f64::NAN, &f64::NAN));
        assert!(!deep_equal(&0.0, &f64::NAN));
        assert!(deep_equal(&[1.0, f64::NAN], &[1.0, f64::NAN]));
    }

    #[test]
    fn nested_structures() {
        let a = vec![Some((1u32, "x".to_string())), None];
        let b = vec![Some((1u32, "x".to_string())), None];
        let c = vec![Some((2u32, "x".to_string())), None];
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&a, &c));
        assert!(!deep_equal(&a, &vec![None]));
    }

    #[test]
    fn shared_pointers_compare_contents() {
        let a = Arc::new([0.0, 1.0]);
        let b = Arc::new([0.0, 1.0]);
        assert!(deep_equal(&a, &a.clone()));
        assert!(deep_equal(&a, &b));
        assert!(!deep_equal(&Rc::new(1u8), &Rc::new(2u8)));
    }

    #[test]
    fn shallow_equal_requires_same_length() {
        let a = vec![point(1, 0.0, 0.0)];
        let b = vec![point(1, 0.0, 0.0), point(2, 1.0, 1.0)];
        assert!(!clusters_shallow_equal(&a, &b));
        assert!(clusters_shallow_equal::<(), ()>(&[], &[]));
    }

    #[test]
    fn shallow_equal_distinct_allocations_with_equal_fields() {
        let a = vec![point(1, 0.0, 0.0)];
        let b = vec![point(1, 0.0, 0.0)];
        assert!(!a[0].ptr_eq(&b[0]));
        assert!(clusters_shallow_equal(&a, &b));

        let moved = vec![point(1, 0.0, 1.0)];
        assert!(!clusters_shallow_equal(&a, &moved));

        let renamed = vec![point(2, 0.0, 0.0)];
        assert!(!clusters_shallow_equal(&a, &renamed));
    }

    #[test]
    fn shallow_equal_ignores_aggregate_properties() {
        let a = vec![cluster(99, 3, 5.0, 5.0, 10)];
        let b = vec![cluster(99, 3, 5.0, 5.0, 11)];
        assert!(clusters_shallow_equal(&a, &b));
    }

    #[test]
    fn shallow_equal_distinguishes_kind() {
        let p: Cluster<(), u32> = Cluster::Point(PointRef::single(
            PointFeature::new(5.0, 5.0, ()).with_id(99),
        ));
        let c = cluster(99, 3, 5.0, 5.0, 10);
        assert!(!clusters_shallow_equal(&[p], &[c]));
    }
}
