//! Fixed-capacity tensor shape used by every graph slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgument;

/// Largest rank a [`TensorShape`] can hold.
pub const MAX_NUM_OF_TENSOR_DIMENSIONS: usize = 5;

/// Ordered tensor extents with rank between 1 and [`MAX_NUM_OF_TENSOR_DIMENSIONS`].
///
/// The [`Default`] value has rank 0 and stands for a shape that has not been resolved yet
/// (for example an output slot before shape inference). It cannot be produced by any of the
/// validating constructors, and reports zero elements.
///
/// Extents past `rank` are kept at zero so derived equality and hashing only observe the
/// declared dimensions.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct TensorShape {
    rank: usize,
    dims: [usize; MAX_NUM_OF_TENSOR_DIMENSIONS],
}

impl TensorShape {
    /// Builds a shape from an explicit list of extents.
    pub fn new(dims: &[usize]) -> Result<Self, InvalidArgument> {
        Self::from_parts(dims.len(), dims)
    }

    /// Builds a shape from a dimension count and a size list that must cover that count.
    pub fn from_parts(num_dimensions: usize, sizes: &[usize]) -> Result<Self, InvalidArgument> {
        check_rank(num_dimensions)?;
        if sizes.len() < num_dimensions {
            return Err(InvalidArgument::MissingDimensionSizes {
                expected: num_dimensions,
                found: sizes.len(),
            });
        }
        let mut dims = [0; MAX_NUM_OF_TENSOR_DIMENSIONS];
        dims[..num_dimensions].copy_from_slice(&sizes[..num_dimensions]);
        Ok(Self {
            rank: num_dimensions,
            dims,
        })
    }

    /// Builds a shape of the given rank with every extent set to zero.
    pub fn with_rank(num_dimensions: usize) -> Result<Self, InvalidArgument> {
        check_rank(num_dimensions)?;
        Ok(Self {
            rank: num_dimensions,
            dims: [0; MAX_NUM_OF_TENSOR_DIMENSIONS],
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Borrow the declared extents.
    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.rank]
    }

    /// Returns `false` for the rank-0 placeholder.
    pub fn is_specified(&self) -> bool {
        self.rank > 0
    }

    pub fn dim(&self, index: usize) -> Result<usize, InvalidArgument> {
        self.check_dimension_index(index)?;
        Ok(self.dims[index])
    }

    pub fn dim_mut(&mut self, index: usize) -> Result<&mut usize, InvalidArgument> {
        self.check_dimension_index(index)?;
        Ok(&mut self.dims[index])
    }

    pub fn set_dim(&mut self, index: usize, value: usize) -> Result<(), InvalidArgument> {
        *self.dim_mut(index)? = value;
        Ok(())
    }

    /// Product of all extents; zero for the unspecified placeholder.
    pub fn num_elements(&self) -> usize {
        if self.rank == 0 {
            return 0;
        }
        self.dims().iter().product()
    }

    fn check_dimension_index(&self, index: usize) -> Result<(), InvalidArgument> {
        if index >= self.rank {
            return Err(InvalidArgument::DimensionIndex {
                index,
                rank: self.rank,
            });
        }
        Ok(())
    }
}

fn check_rank(num_dimensions: usize) -> Result<(), InvalidArgument> {
    if num_dimensions < 1 {
        return Err(InvalidArgument::ZeroRank);
    }
    if num_dimensions > MAX_NUM_OF_TENSOR_DIMENSIONS {
        return Err(InvalidArgument::RankTooLarge {
            rank: num_dimensions,
            max: MAX_NUM_OF_TENSOR_DIMENSIONS,
        });
    }
    Ok(())
}

impl TryFrom<&[usize]> for TensorShape {
    type Error = InvalidArgument;

    fn try_from(dims: &[usize]) -> Result<Self, Self::Error> {
        TensorShape::new(dims)
    }
}

impl<const N: usize> TryFrom<[usize; N]> for TensorShape {
    type Error = InvalidArgument;

    fn try_from(dims: [usize; N]) -> Result<Self, Self::Error> {
        TensorShape::new(&dims)
    }
}

impl TryFrom<Vec<usize>> for TensorShape {
    type Error = InvalidArgument;

    fn try_from(dims: Vec<usize>) -> Result<Self, Self::Error> {
        if dims.is_empty() {
            return Ok(TensorShape::default());
        }
        TensorShape::new(&dims)
    }
}

impl From<TensorShape> for Vec<usize> {
    fn from(shape: TensorShape) -> Self {
        shape.dims().to_vec()
    }
}

impl fmt::Debug for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorShape{:?}", self.dims())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_specified() {
            return f.write_str("[?]");
        }
        write!(f, "{:?}", self.dims())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_elements_is_product_of_extents() {
        let shape = TensorShape::new(&[1, 1, 4, 4]).unwrap();
        assert_eq!(shape.num_elements(), 16);
        assert_eq!(shape.rank(), 4);
        let wide = TensorShape::new(&[2, 3, 5, 7, 11]).unwrap();
        assert_eq!(wide.num_elements(), 2 * 3 * 5 * 7 * 11);
    }

    #[test]
    fn placeholder_reports_zero_elements() {
        let shape = TensorShape::default();
        assert_eq!(shape.num_elements(), 0);
        assert!(!shape.is_specified());
    }

    #[test]
    fn rank_bounds_are_enforced() {
        assert_eq!(TensorShape::new(&[]), Err(InvalidArgument::ZeroRank));
        assert_eq!(
            TensorShape::new(&[1, 2, 3, 4, 5, 6]),
            Err(InvalidArgument::RankTooLarge { rank: 6, max: 5 })
        );
        assert_eq!(
            TensorShape::from_parts(3, &[1, 2]),
            Err(InvalidArgument::MissingDimensionSizes {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn indexing_checks_read_and_write_identically() {
        let mut shape = TensorShape::new(&[2, 3]).unwrap();
        let expected = InvalidArgument::DimensionIndex { index: 2, rank: 2 };
        assert_eq!(shape.dim(2), Err(expected.clone()));
        assert_eq!(shape.set_dim(2, 9), Err(expected));
        shape.set_dim(1, 9).unwrap();
        assert_eq!(shape.dims(), &[2, 9]);
    }

    #[test]
    fn equality_ignores_unused_capacity() {
        let a = TensorShape::new(&[4, 4]).unwrap();
        let mut b = TensorShape::with_rank(2).unwrap();
        b.set_dim(0, 4).unwrap();
        b.set_dim(1, 4).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, TensorShape::new(&[4, 4, 1]).unwrap());
    }

    #[test]
    fn serde_validates_rank() {
        let shape: TensorShape = serde_json::from_str("[1,2,3]").unwrap();
        assert_eq!(shape.dims(), &[1, 2, 3]);
        assert!(serde_json::from_str::<TensorShape>("[1,1,1,1,1,1]").is_err());
        assert_eq!(serde_json::to_string(&shape).unwrap(), "[1,2,3]");
    }
}
