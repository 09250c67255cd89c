//! Spaces: sets with structure that describe observations and actions.
mod indexed_type;

pub use indexed_type::{Indexed, IndexedTypeSpace};

use crate::Prng;
use std::fmt::Debug;

/// A mathematical space
pub trait Space: Debug {
    type Element;

    /// Check if the space contains a particular value
    fn contains(&self, value: &Self::Element) -> bool;
}

/// A space from which elements can be sampled uniformly at random.
pub trait SampleSpace: Space {
    /// Sample a random element.
    fn sample(&self, rng: &mut Prng) -> Self::Element;
}

/// A space containing finitely many elements.
pub trait FiniteSpace: Space {
    /// The number of elements in the space.
    fn size(&self) -> usize;

    /// Get the index of an element.
    fn to_index(&self, element: &Self::Element) -> usize;

    /// Try to convert an index to an element.
    ///
    /// The return value is `None` if and only if `index >= self.size()`.
    fn from_index(&self, index: usize) -> Option<Self::Element>;
}

/// A space whose elements can be encoded as fixed-length real feature vectors.
pub trait FeatureSpace: Space {
    /// Length of the feature vectors.
    fn num_features(&self) -> usize;

    /// Write the features of an element into `out`.
    ///
    /// # Panics
    /// If `out.len() != self.num_features()`.
    fn features_out(&self, element: &Self::Element, out: &mut [f32]);

    /// The features of an element as a new vector.
    fn features(&self, element: &Self::Element) -> Vec<f32> {
        let mut out = vec![0.0; self.num_features()];
        self.features_out(element, &mut out);
        out
    }

    /// Write the features of several elements into a row-major batch buffer.
    fn batch_features<'a, I>(&self, elements: I) -> Vec<f32>
    where
        I: IntoIterator<Item = &'a Self::Element>,
        Self::Element: 'a,
    {
        let n = self.num_features();
        let mut out = Vec::new();
        for element in elements {
            let start = out.len();
            out.resize(start + n, 0.0);
            self.features_out(element, &mut out[start..]);
        }
        out
    }
}
