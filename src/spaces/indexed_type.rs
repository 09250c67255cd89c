use super::{FiniteSpace, SampleSpace, Space};
use crate::Prng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any;
use std::fmt;
use std::marker::PhantomData;

/// An indexed set of finitely many possiblities.
pub trait Indexed {
    /// The number of possible values this type can represent.
    const SIZE: usize;

    /// Convert into an index.
    fn as_index(&self) -> usize;

    /// Create from an index.
    fn from_index(index: usize) -> Option<Self>
    where
        Self: Sized;
}

/// A space defined over an indexed type.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct IndexedTypeSpace<T> {
    #[serde(skip)]
    element_type: PhantomData<fn() -> T>,
}

impl<T> IndexedTypeSpace<T> {
    pub const fn new() -> Self {
        Self {
            element_type: PhantomData,
        }
    }
}

impl<T> Default for IndexedTypeSpace<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IndexedTypeSpace<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for IndexedTypeSpace<T> {}

impl<T> PartialEq for IndexedTypeSpace<T> {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl<T> fmt::Debug for IndexedTypeSpace<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IndexedTypeSpace<{}>", any::type_name::<T>())
    }
}

impl<T: Indexed> Space for IndexedTypeSpace<T> {
    type Element = T;

    fn contains(&self, element: &Self::Element) -> bool {
        element.as_index() < T::SIZE
    }
}

impl<T: Indexed> SampleSpace for IndexedTypeSpace<T> {
    fn sample(&self, rng: &mut Prng) -> T {
        // Every index below SIZE is valid by the contract of Indexed
        loop {
            if let Some(element) = T::from_index(rng.gen_range(0..T::SIZE)) {
                return element;
            }
        }
    }
}

impl<T: Indexed> FiniteSpace for IndexedTypeSpace<T> {
    fn size(&self) -> usize {
        T::SIZE
    }

    fn to_index(&self, element: &Self::Element) -> usize {
        element.as_index()
    }

    fn from_index(&self, index: usize) -> Option<Self::Element> {
        T::from_index(index)
    }
}
