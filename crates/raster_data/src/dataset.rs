use crate::error::DataModuleError;
use crate::sample::Sample;
use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;

/// An indexable, length-queryable view producing [`Sample`]s.
///
/// Implementations must be `Send + Sync` so one view can be shared by all
/// loader worker threads.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the sample at `index`. Fails when `index >= len()`.
    fn get_sample(&self, index: usize) -> Result<Sample>;
}

/// Shared handle to any dataset view.
pub type DatasetRef = Arc<dyn Dataset>;

/// ============================================================================
/// A view restricted to an explicit, ordered list of indices of its parent.
///
/// Order and duplicates are kept exactly as given, so `Subset::new(d, vec![3, 1, 1])`
/// yields parent samples 3, 1, 1.
///
/// # Example
/// ```ignore
/// let subset = Subset::new(dataset, vec![3, 1, 4, 1, 5])?;
/// assert_eq!(subset.len(), 5);
/// assert_eq!(subset.parent_index(3), Some(1));
/// ```
#[derive(Clone)]
pub struct Subset {
    dataset: DatasetRef,
    indices: Arc<[usize]>,
}

impl Subset {
    /// Fails if any index is out of range for `dataset`.
    pub fn new(dataset: DatasetRef, indices: Vec<usize>) -> Result<Self> {
        let len = dataset.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(DataModuleError::IndexOutOfBounds { index, len }.into());
        }
        Ok(Self {
            dataset,
            indices: indices.into(),
        })
    }

    /// Indices into the parent view, in iteration order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Parent index behind position `index` of this subset.
    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.indices.get(index).copied()
    }

    pub fn parent(&self) -> &DatasetRef {
        &self.dataset
    }
}

impl Dataset for Subset {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get_sample(&self, index: usize) -> Result<Sample> {
        let parent_index = self
            .parent_index(index)
            .ok_or(DataModuleError::IndexOutOfBounds {
                index,
                len: self.indices.len(),
            })?;
        self.dataset.get_sample(parent_index)
    }
}

/// ============================================================================
/// Randomly partitions `dataset` into disjoint subsets of the given lengths.
///
/// `lengths` must sum to `dataset.len()`. The union of the returned subsets
/// covers every parent index exactly once. With `seed = Some(s)` the
/// partition is reproducible; with `None` a fresh random seed is drawn.
///
/// # Example
/// ```ignore
/// let parts = random_split(dataset, &[80, 20], Some(7))?;
/// let (train, val) = (&parts[0], &parts[1]);
/// ```
pub fn random_split(dataset: DatasetRef, lengths: &[usize], seed: Option<u64>) -> Result<Vec<Subset>> {
    let total: usize = lengths.iter().sum();
    ensure!(
        total == dataset.len(),
        "Sum of split lengths ({}) does not equal the dataset length ({})",
        total,
        dataset.len()
    );

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let mut permutation: Vec<usize> = (0..total).collect();
    permutation.shuffle(&mut rng);

    let mut parts = Vec::with_capacity(lengths.len());
    let mut offset = 0;
    for &length in lengths {
        parts.push(Subset {
            dataset: dataset.clone(),
            indices: permutation[offset..offset + length].into(),
        });
        offset += length;
    }
    Ok(parts)
}

#[cfg(test)]
mod dataset_tests {
    use super::*;
    use std::collections::HashSet;
    use tch::Tensor;

    /// Yields `index` as its only feature.
    struct Counting(usize);

    impl Dataset for Counting {
        fn len(&self) -> usize {
            self.0
        }

        fn get_sample(&self, index: usize) -> Result<Sample> {
            ensure!(index < self.0, "index {} out of range", index);
            Ok(Sample::from_single("index", Tensor::from_slice(&[index as i64])))
        }
    }

    fn value(dataset: &dyn Dataset, index: usize) -> Result<i64> {
        Ok(dataset.get_sample(index)?.get("index")?.int64_value(&[0]))
    }

    #[test]
    fn test_subset_preserves_order_and_duplicates() -> Result<()> {
        let subset = Subset::new(Arc::new(Counting(10)), vec![3, 1, 4, 1, 5])?;

        assert_eq!(subset.len(), 5);
        let seen = (0..subset.len())
            .map(|i| value(&subset, i))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(seen, vec![3, 1, 4, 1, 5]);
        assert!(subset.get_sample(5).is_err());
        Ok(())
    }

    #[test]
    fn test_subset_rejects_out_of_range() {
        let err = Subset::new(Arc::new(Counting(3)), vec![0, 3]).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<DataModuleError>(),
            Some(DataModuleError::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_random_split_is_disjoint_and_complete() -> Result<()> {
        let parts = random_split(Arc::new(Counting(50)), &[35, 15], None)?;
        assert_eq!(parts[0].len(), 35);
        assert_eq!(parts[1].len(), 15);

        let train: HashSet<usize> = parts[0].indices().iter().copied().collect();
        let val: HashSet<usize> = parts[1].indices().iter().copied().collect();
        assert!(train.is_disjoint(&val));
        let union: HashSet<usize> = train.union(&val).copied().collect();
        assert_eq!(union, (0..50).collect::<HashSet<usize>>());
        Ok(())
    }

    #[test]
    fn test_random_split_seeded_is_reproducible() -> Result<()> {
        let dataset: DatasetRef = Arc::new(Counting(20));
        let a = random_split(dataset.clone(), &[10, 10], Some(42))?;
        let b = random_split(dataset.clone(), &[10, 10], Some(42))?;
        let c = random_split(dataset, &[10, 10], Some(43))?;

        assert_eq!(a[0].indices(), b[0].indices());
        assert_ne!(a[0].indices(), c[0].indices());
        Ok(())
    }

    #[test]
    fn test_random_split_on_subset_maps_through() -> Result<()> {
        let subset: DatasetRef = Arc::new(Subset::new(Arc::new(Counting(10)), vec![9, 8, 7])?);
        let parts = random_split(subset, &[2, 1], Some(0))?;

        let mut seen = Vec::new();
        for part in &parts {
            for i in 0..part.len() {
                seen.push(value(part, i)?);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![7, 8, 9]);
        Ok(())
    }

    #[test]
    fn test_random_split_rejects_bad_lengths() {
        assert!(random_split(Arc::new(Counting(5)), &[3, 3], None).is_err());
        assert!(random_split(Arc::new(Counting(0)), &[0, 0], None).is_ok());
    }
}
