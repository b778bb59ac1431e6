use crate::minibatch::MiniBatch;
use crate::sample::Sample;
use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet};
use tch::Tensor;

/// A `Collator` combines several [`Sample`]s into a [`MiniBatch`].
pub trait Collator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch>;
}

/// Stacks tensors of identical shape along dim 0.
///
/// Every sample must carry the same feature names, and each feature must have
/// the same shape across samples; rasters from a single rasterizer always do.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackCollator;

impl Collator for StackCollator {
    fn collate(&self, samples: &[Sample]) -> Result<MiniBatch> {
        let Some(first) = samples.first() else {
            bail!("Cannot collate empty sample list");
        };

        let first_keys: HashSet<&String> = first.features.keys().collect();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            let keys: HashSet<&String> = sample.features.keys().collect();
            if keys != first_keys {
                let missing: Vec<_> = first_keys.difference(&keys).collect();
                let extra: Vec<_> = keys.difference(&first_keys).collect();
                bail!(
                    "Sample #{} has mismatch feature keys:\n -Missing: {:?}\n -Extra: {:?}",
                    i,
                    missing,
                    extra
                );
            }
        }

        let mut tensors = HashMap::with_capacity(first_keys.len());
        for key in first_keys {
            let to_stack = samples
                .iter()
                .map(|s| {
                    s.features
                        .get(key)
                        .ok_or_else(|| anyhow!("Feature '{}' vanished during collation", key))
                })
                .collect::<Result<Vec<&Tensor>>>()?;

            let reference_shape = to_stack[0].size();
            for (i, tensor) in to_stack.iter().enumerate() {
                if tensor.size() != reference_shape {
                    bail!(
                        "Shape mismatch in sample {} for feature '{}': expected {:?}, got {:?}",
                        i,
                        key,
                        reference_shape,
                        tensor.size()
                    );
                }
            }

            tensors.insert(key.clone(), Tensor::stack(&to_stack, 0));
        }
        Ok(MiniBatch { tensors })
    }
}

#[cfg(test)]
mod collator_tests {
    use super::*;
    use tch::{Device, Kind};

    fn raster(value: f64) -> Tensor {
        Tensor::full([2, 4, 4], value, (Kind::Float, Device::Cpu))
    }

    #[test]
    fn test_stack_rasters() -> Result<()> {
        let samples = vec![
            Sample::from_single("image", raster(0.0)),
            Sample::from_single("image", raster(1.0)),
            Sample::from_single("image", raster(0.0)),
        ];
        let batch = StackCollator.collate(&samples)?;

        assert_eq!(batch.get("image")?.size(), vec![3, 2, 4, 4]);
        assert_eq!(batch.get("image")?.double_value(&[1, 0, 0, 0]), 1.0);
        Ok(())
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(StackCollator.collate(&[]).is_err());
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let samples = vec![
            Sample::from_single("image", raster(0.0)),
            Sample::from_single("image", Tensor::zeros([2, 4, 5], (Kind::Float, Device::Cpu))),
        ];
        assert!(StackCollator.collate(&samples).is_err());
    }

    #[test]
    fn test_key_mismatch_fails() {
        let samples = vec![
            Sample::from_single("image", raster(0.0)),
            Sample::from_single("yaw", Tensor::from_slice(&[0.0f32])),
        ];
        let err = StackCollator.collate(&samples).unwrap_err();
        assert!(err.to_string().contains("mismatch feature keys"));
    }
}
