//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks. Here they are always dense, row-major
//! arrays of `f32`.

use std::fmt;

use tinyvec::TinyVec;

use crate::iter::zip_exact;

/// A dynamically shaped `f32` tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: TinyVec<[usize; 4]>,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// `f` is invoked with successive indices to fill, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));

            // Advance the index like an odometer, last dimension first.
            for (i, size) in zip_exact(index.iter_mut(), shape.iter()).rev() {
                *i += 1;
                if *i < *size {
                    break;
                }
                *i = 0;
            }
        }

        Self {
            shape: TinyVec::from(&shape[..]),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor of the given shape by pulling elements from an iterator.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many elements as specified by `shape`, otherwise this method
    /// will panic.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data = iter.into_iter().collect::<Box<[f32]>>();
        let expected = shape.iter().product::<usize>();
        assert_eq!(
            data.len(),
            expected,
            "iterator yielded {} elements, but shape {:?} requires {}",
            data.len(),
            shape,
            expected,
        );

        Self {
            shape: TinyVec::from(shape),
            data,
        }
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            self.shape(),
            &self.data,
        )?)
    }

    /// Returns the shape of this tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns all elements of this tensor in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the single element of a tensor with exactly 1 element (eg. of shape `[1, 1]`).
    ///
    /// Returns an error if the tensor has more or less than 1 element.
    pub fn as_singular(&self) -> anyhow::Result<f32> {
        match *self.data {
            [value] => Ok(value),
            _ => anyhow::bail!("expected a single value, got tensor of shape {:?}", self.shape()),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", self.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shape_fn() {
        let indices = [
            [0, 0, 0],
            [0, 0, 1],
            [0, 0, 2],
            [0, 1, 0],
            [0, 1, 1],
            [0, 1, 2],
        ];

        let mut iter = indices.into_iter();
        let tensor = Tensor::from_array_shape_fn([1, 2, 3], |index| {
            assert_eq!(iter.next(), Some(index));
            index[2] as f32
        });
        assert_eq!(iter.next(), None);
        assert_eq!(tensor.rank(), 3);
        assert_eq!(tensor.shape(), &[1, 2, 3]);
        assert_eq!(tensor.as_slice(), &[0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn empty() {
        let tensor = Tensor::from_array_shape_fn([1, 2, 0, 3], |idx| unreachable!("{idx:?}"));
        assert_eq!(tensor.shape(), &[1, 2, 0, 3]);
        assert!(tensor.as_slice().is_empty());
    }

    #[test]
    fn singular() {
        let tensor = Tensor::from_iter(&[1, 1], [0.25]);
        assert_eq!(tensor.as_singular().unwrap(), 0.25);

        let tensor = Tensor::from_iter(&[2], [0.25, 0.5]);
        assert!(tensor.as_singular().is_err());
    }

    #[test]
    #[should_panic = "requires 4"]
    fn from_iter_length_mismatch() {
        Tensor::from_iter(&[2, 2], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn tract_round_trip() {
        let tensor = Tensor::from_array_shape_fn([1, 3, 2], |[_, y, x]| (y * 2 + x) as f32);
        let tract = tensor.to_tract().unwrap();
        assert_eq!(tract.shape(), &[1, 3, 2]);
        assert_eq!(Tensor::from_tract(&tract).unwrap(), tensor);
    }
}
