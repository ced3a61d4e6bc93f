//! Named per-element properties.
//!
//! A property is a side table holding one value per vertex, edge or face. The
//! tables grow when elements are added and are permuted together with the
//! element arrays when the mesh is compacted, so algorithms can attach
//! their own state (error quadrics, normal cones, selection flags) without
//! baking fields into the element structs.
//!
//! Properties are addressed by a typed handle:
//!
//! ```
//! use whittle::prelude::*;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
//!
//! let selected = mesh.vertex_property("v:selected", false).unwrap();
//! mesh.vertex_prop_mut(selected)[1] = true;
//! assert_eq!(mesh.vertex_prop(selected), &[false, true, false]);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{MeshError, Result};

/// Type-erased storage of one property table.
trait PropertyStorage {
    fn name(&self) -> &str;
    fn push(&mut self);
    fn compact(&mut self, keep: &[usize]);
    fn clone_box(&self) -> Box<dyn PropertyStorage>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct PropertyArray<T> {
    name: String,
    default: T,
    values: Vec<T>,
}

impl<T: Clone + 'static> PropertyStorage for PropertyArray<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self) {
        self.values.push(self.default.clone());
    }

    fn compact(&mut self, keep: &[usize]) {
        let old = std::mem::take(&mut self.values);
        self.values = keep.iter().map(|&i| old[i].clone()).collect();
    }

    fn clone_box(&self) -> Box<dyn PropertyStorage> {
        Box::new(PropertyArray {
            name: self.name.clone(),
            default: self.default.clone(),
            values: self.values.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Element kind marker for vertex properties.
#[derive(Debug)]
pub enum VertexKind {}

/// Element kind marker for edge properties.
#[derive(Debug)]
pub enum EdgeKind {}

/// Element kind marker for face properties.
#[derive(Debug)]
pub enum FaceKind {}

/// Typed handle to a property table of element kind `K` with values `T`.
///
/// Handles stay valid until the property is removed; compaction does not
/// invalidate them.
pub struct Property<K, T> {
    slot: usize,
    _marker: PhantomData<fn() -> (K, T)>,
}

/// Handle to a per-vertex property.
pub type VertexProperty<T> = Property<VertexKind, T>;

/// Handle to a per-edge property.
pub type EdgeProperty<T> = Property<EdgeKind, T>;

/// Handle to a per-face property.
pub type FaceProperty<T> = Property<FaceKind, T>;

impl<K, T> Property<K, T> {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }
}

impl<K, T> Clone for Property<K, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, T> Copy for Property<K, T> {}

impl<K, T> PartialEq for Property<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<K, T> Eq for Property<K, T> {}

impl<K, T> fmt::Debug for Property<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.slot)
    }
}

/// All property tables of one element kind.
#[derive(Default)]
pub(crate) struct PropertyRegistry {
    slots: Vec<Option<Box<dyn PropertyStorage>>>,
    len: usize,
}

impl PropertyRegistry {
    /// Append one default value to every table.
    pub(crate) fn push(&mut self) {
        self.len += 1;
        for storage in self.slots.iter_mut().flatten() {
            storage.push();
        }
    }

    /// Keep only the rows listed in `keep`, in that order.
    pub(crate) fn compact(&mut self, keep: &[usize]) {
        self.len = keep.len();
        for storage in self.slots.iter_mut().flatten() {
            storage.compact(keep);
        }
    }

    /// Find a table by name.
    pub(crate) fn find<K, T: 'static>(&self, name: &str) -> Result<Option<Property<K, T>>> {
        for (slot, storage) in self.slots.iter().enumerate() {
            let Some(storage) = storage else { continue };
            if storage.name() != name {
                continue;
            }
            return if storage.as_any().is::<PropertyArray<T>>() {
                Ok(Some(Property::new(slot)))
            } else {
                Err(MeshError::PropertyTypeMismatch {
                    name: name.to_string(),
                })
            };
        }
        Ok(None)
    }

    /// Attach a new table filled with `default`.
    pub(crate) fn add<K, T: Clone + 'static>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<Property<K, T>> {
        if self.names().any(|n| n == name) {
            return Err(MeshError::DuplicateProperty {
                name: name.to_string(),
            });
        }

        // Slots are never reused so a stale handle cannot alias a newer table.
        let slot = self.slots.len();
        self.slots.push(Some(Box::new(PropertyArray {
            name: name.to_string(),
            values: vec![default.clone(); self.len],
            default,
        })));
        Ok(Property::new(slot))
    }

    /// Return the table named `name`, attaching it when missing.
    pub(crate) fn get_or_add<K, T: Clone + 'static>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<Property<K, T>> {
        match self.find(name)? {
            Some(p) => Ok(p),
            None => self.add(name, default),
        }
    }

    pub(crate) fn remove<K, T>(&mut self, property: Property<K, T>) {
        if let Some(slot) = self.slots.get_mut(property.slot) {
            *slot = None;
        }
    }

    pub(crate) fn contains<K, T>(&self, property: Property<K, T>) -> bool {
        matches!(self.slots.get(property.slot), Some(Some(_)))
    }

    pub(crate) fn values<K, T: 'static>(&self, property: Property<K, T>) -> &[T] {
        self.slots
            .get(property.slot)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.as_any().downcast_ref::<PropertyArray<T>>())
            .map(|array| array.values.as_slice())
            .unwrap_or_else(|| panic!("stale property handle {:?}", property))
    }

    pub(crate) fn values_mut<K, T: 'static>(&mut self, property: Property<K, T>) -> &mut [T] {
        self.slots
            .get_mut(property.slot)
            .and_then(|s| s.as_mut())
            .and_then(|s| s.as_any_mut().downcast_mut::<PropertyArray<T>>())
            .map(|array| array.values.as_mut_slice())
            .unwrap_or_else(|| panic!("stale property handle {:?}", property))
    }

    /// Names of all attached tables.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().flatten().map(|s| s.name())
    }
}

impl Clone for PropertyRegistry {
    fn clone(&self) -> Self {
        Self {
            slots: self
                .slots
                .iter()
                .map(|s| s.as_ref().map(|s| s.clone_box()))
                .collect(),
            len: self.len,
        }
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(len: usize) -> PropertyRegistry {
        let mut r = PropertyRegistry::default();
        for _ in 0..len {
            r.push();
        }
        r
    }

    #[test]
    fn test_add_fills_existing_rows() {
        let mut r = registry(3);
        let p: VertexProperty<f64> = r.add("v:weight", 1.5).unwrap();
        assert_eq!(r.values(p), &[1.5, 1.5, 1.5]);

        r.push();
        assert_eq!(r.values(p).len(), 4);
    }

    #[test]
    fn test_duplicate_and_mismatch() {
        let mut r = registry(2);
        let _: VertexProperty<bool> = r.add("v:selected", false).unwrap();

        let dup: Result<VertexProperty<bool>> = r.add("v:selected", true);
        assert!(matches!(dup, Err(MeshError::DuplicateProperty { .. })));

        let wrong: Result<Option<VertexProperty<f32>>> = r.find("v:selected");
        assert!(matches!(wrong, Err(MeshError::PropertyTypeMismatch { .. })));
    }

    #[test]
    fn test_compact_permutes_values() {
        let mut r = registry(4);
        let p: FaceProperty<usize> = r.add("f:id", 0).unwrap();
        for (i, v) in r.values_mut(p).iter_mut().enumerate() {
            *v = i * 10;
        }

        r.compact(&[0, 2, 3]);
        assert_eq!(r.values(p), &[0, 20, 30]);
    }

    #[test]
    fn test_remove_keeps_other_handles() {
        let mut r = registry(1);
        let a: EdgeProperty<bool> = r.add("e:a", true).unwrap();
        let b: EdgeProperty<u8> = r.add("e:b", 7).unwrap();

        r.remove(a);
        assert!(!r.contains(a));
        assert_eq!(r.values(b), &[7]);

        // Re-adding never reuses the freed slot.
        let a2: EdgeProperty<bool> = r.add("e:a", false).unwrap();
        assert_ne!(a, a2);
    }

    #[test]
    fn test_get_or_add_returns_existing() {
        let mut r = registry(2);
        let first: VertexProperty<i32> = r.get_or_add("v:x", 3).unwrap();
        r.values_mut(first)[0] = 9;

        let second: VertexProperty<i32> = r.get_or_add("v:x", 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(r.values(second), &[9, 3]);
    }
}
