//! Native tensor representation and the slicing primitives run on it.
//!
//! Native tensors list their dimensions innermost first, so a row-major `[n, c, h, w]` tensor
//! is described as `(w, h, c, n)`. The two innermost dimensions of a native tensor form a
//! column-major faer matrix, which unit-stride slices copy through submatrix views.
//! Primitives report failures through [`Status`] instead of returning errors.

use std::fmt;

use faer::mat::{MatMut, MatRef};
use infer_rs::backend::{decode_f32, encode_f32};
use infer_rs::error::InvalidArgument;
use infer_rs::tensor::{TensorInfo, MAX_NUM_OF_TENSOR_DIMENSIONS};
use smallvec::SmallVec;

/// Per-dimension values in native (innermost-first) order.
pub type Coordinates = SmallVec<[i64; MAX_NUM_OF_TENSOR_DIMENSIONS]>;

/// Result of a native primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub ok: bool,
    pub description: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            ok: true,
            description: String::new(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            ok: false,
            description: description.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok {
            f.write_str("ok")
        } else {
            f.write_str(&self.description)
        }
    }
}

/// Dense `f32` tensor in native dimension order.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTensor {
    shape: Coordinates,
    data: Vec<f32>,
}

impl NativeTensor {
    /// Native shape of `info`: its extents reversed.
    pub fn describe(info: &TensorInfo) -> Coordinates {
        info.shape().dims().iter().rev().map(|&d| d as i64).collect()
    }

    pub fn allocate(info: &TensorInfo) -> Self {
        Self {
            shape: Self::describe(info),
            data: vec![0.0; info.num_elements()],
        }
    }

    /// Wraps values already decoded in the row-major order of `info`.
    pub fn from_values(info: &TensorInfo, values: Vec<f32>) -> Result<Self, InvalidArgument> {
        if values.len() != info.num_elements() {
            return Err(InvalidArgument::ElementCount {
                expected: info.num_elements(),
                found: values.len(),
            });
        }
        Ok(Self {
            shape: Self::describe(info),
            data: values,
        })
    }

    /// Decodes host bytes laid out as `info` describes.
    pub fn import(info: &TensorInfo, data: &[u8]) -> Result<Self, InvalidArgument> {
        Self::from_values(info, decode_f32(info, data)?)
    }

    /// Encodes the values into host bytes laid out as `info` describes.
    pub fn export(&self, info: &TensorInfo, data: &mut [u8]) -> Result<(), InvalidArgument> {
        encode_f32(info, &self.data, data)
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }

    pub fn into_values(self) -> Vec<f32> {
        self.data
    }

    fn strides(&self) -> Coordinates {
        let mut strides = Coordinates::with_capacity(self.shape.len());
        let mut acc = 1;
        for &extent in &self.shape {
            strides.push(acc);
            acc *= extent;
        }
        strides
    }
}

/// Native `(starts, ends)` for a slice given as row-major `begin` and `size`.
///
/// Each end is `begin + size`. Values past `i64::MAX` saturate, which leaves the window
/// out of bounds for any real tensor.
pub fn slice_coordinates(begin: &[usize], size: &[usize]) -> (Coordinates, Coordinates) {
    let native = |value: usize| i64::try_from(value).unwrap_or(i64::MAX);
    let starts = begin.iter().rev().map(|&b| native(b)).collect();
    let ends = begin
        .iter()
        .zip(size)
        .rev()
        .map(|(&b, &s)| native(b.saturating_add(s)))
        .collect();
    (starts, ends)
}

/// Native `(starts, ends, strides)` for a strided slice given in row-major order.
pub fn strided_slice_coordinates(
    begin: &[i32],
    end: &[i32],
    stride: &[i32],
) -> (Coordinates, Coordinates, Coordinates) {
    let reverse = |values: &[i32]| -> Coordinates {
        values.iter().rev().map(|&v| i64::from(v)).collect()
    };
    (reverse(begin), reverse(end), reverse(stride))
}

/// Native primitives the backend dispatches by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Slice {
        starts: Coordinates,
        ends: Coordinates,
    },
    StridedSlice {
        starts: Coordinates,
        ends: Coordinates,
        strides: Coordinates,
    },
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Slice { .. } => "slice",
            Primitive::StridedSlice { .. } => "strided_slice",
        }
    }

    fn windows(&self) -> (&[i64], &[i64], Option<&[i64]>) {
        match self {
            Primitive::Slice { starts, ends } => (starts.as_slice(), ends.as_slice(), None),
            Primitive::StridedSlice {
                starts,
                ends,
                strides,
            } => (starts.as_slice(), ends.as_slice(), Some(strides.as_slice())),
        }
    }

    /// Native output shape for `input`, or the reason the primitive cannot run.
    pub fn output_shape(&self, input: &[i64]) -> Result<Coordinates, Status> {
        let (starts, ends, strides) = self.windows();
        if starts.len() != input.len()
            || ends.len() != input.len()
            || strides.is_some_and(|s| s.len() != input.len())
        {
            return Err(Status::error(format!(
                "{}: expected {} coordinates per bound",
                self.name(),
                input.len()
            )));
        }
        let mut shape = Coordinates::with_capacity(input.len());
        for dim in 0..input.len() {
            let (start, end) = (starts[dim], ends[dim]);
            let stride = strides.map_or(1, |s| s[dim]);
            if stride == 0 {
                return Err(Status::error(format!("{}: zero stride", self.name())));
            }
            let in_bounds = |c: i64| (0..input[dim]).contains(&c);
            let count = if stride > 0 {
                ceil_div(end.saturating_sub(start).max(0), stride)
            } else {
                ceil_div(start.saturating_sub(end).max(0), stride.saturating_neg())
            };
            let last = (count - 1)
                .checked_mul(stride)
                .and_then(|offset| start.checked_add(offset));
            if count > 0 && (!in_bounds(start) || !last.is_some_and(in_bounds)) {
                return Err(Status::error(format!(
                    "{}: window [{start}, {end}) leaves native dimension {dim} of extent {}",
                    self.name(),
                    input[dim]
                )));
            }
            shape.push(count);
        }
        Ok(shape)
    }
}

fn ceil_div(count: i64, step: i64) -> i64 {
    count / step + i64::from(count % step != 0)
}

/// Runs `primitive` on `input` into `output`, whose native shape must match.
pub fn run(primitive: &Primitive, input: &NativeTensor, output: &mut NativeTensor) -> Status {
    let shape = match primitive.output_shape(&input.shape) {
        Ok(shape) => shape,
        Err(status) => return status,
    };
    if shape != output.shape {
        return Status::error(format!(
            "{}: output shape {:?} does not match {:?}",
            primitive.name(),
            output.shape.as_slice(),
            shape.as_slice()
        ));
    }
    match primitive {
        Primitive::Slice { starts, .. } => copy_window(starts, input, output),
        Primitive::StridedSlice {
            starts, strides, ..
        } => walk_window(starts, strides, input, output),
    }
    Status::ok()
}

/// Rows and columns of the innermost native plane.
fn plane(shape: &[i64]) -> (usize, usize) {
    let extent = |dim: usize| shape.get(dim).map_or(1, |&d| d as usize);
    (extent(0), extent(1))
}

/// Copies a unit-stride window one innermost plane at a time.
fn copy_window(starts: &[i64], input: &NativeTensor, output: &mut NativeTensor) {
    if output.data.is_empty() {
        return;
    }
    let (in_rows, in_cols) = plane(&input.shape);
    let (out_rows, out_cols) = plane(&output.shape);
    let start = |dim: usize| starts.get(dim).map_or(0, |&s| s as usize);
    let in_strides = input.strides();
    let out_strides = output.strides();
    let in_plane = in_rows * in_cols;
    let out_plane = out_rows * out_cols;
    for target in (0..output.data.len()).step_by(out_plane) {
        let mut source = 0i64;
        for dim in 2..output.shape.len() {
            let coord = (target as i64 / out_strides[dim]) % output.shape[dim];
            source += (starts[dim] + coord) * in_strides[dim];
        }
        let source = source as usize;
        let window = MatRef::from_column_major_slice(
            &input.data[source..source + in_plane],
            in_rows,
            in_cols,
        )
        .submatrix(start(0), start(1), out_rows, out_cols);
        let mut dst = MatMut::from_column_major_slice_mut(
            &mut output.data[target..target + out_plane],
            out_rows,
            out_cols,
        );
        dst.copy_from(window);
    }
}

fn walk_window(starts: &[i64], strides: &[i64], input: &NativeTensor, output: &mut NativeTensor) {
    let in_strides = input.strides();
    let out_strides = output.strides();
    for flat in 0..output.data.len() {
        let mut source = 0;
        for dim in 0..output.shape.len() {
            let coord = (flat as i64 / out_strides[dim]) % output.shape[dim];
            source += (starts[dim] + coord * strides[dim]) * in_strides[dim];
        }
        output.data[flat] = input.data[source as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infer_rs::tensor::DataType;

    fn info(dims: &[usize]) -> TensorInfo {
        TensorInfo::from_dims(dims, DataType::Float32).unwrap()
    }

    #[test]
    fn coordinates_are_innermost_first() {
        assert_eq!(NativeTensor::describe(&info(&[1, 2, 3, 4])).as_slice(), &[4, 3, 2, 1]);
        let (starts, ends) = slice_coordinates(&[0, 1, 2], &[1, 2, 3]);
        assert_eq!(starts.as_slice(), &[2, 1, 0]);
        assert_eq!(ends.as_slice(), &[5, 3, 1]);
        let (starts, ends, strides) = strided_slice_coordinates(&[0, 4], &[2, -1], &[1, -2]);
        assert_eq!(starts.as_slice(), &[4, 0]);
        assert_eq!(ends.as_slice(), &[-1, 2]);
        assert_eq!(strides.as_slice(), &[-2, 1]);
    }

    #[test]
    fn strided_slice_walks_backwards() {
        let input = NativeTensor::from_values(&info(&[2, 5]), (0..10).map(|v| v as f32).collect())
            .unwrap();
        let (starts, ends, strides) = strided_slice_coordinates(&[0, 4], &[2, -1], &[1, -2]);
        let primitive = Primitive::StridedSlice {
            starts,
            ends,
            strides,
        };
        let mut output = NativeTensor::allocate(&info(&[2, 3]));
        let status = run(&primitive, &input, &mut output);
        assert!(status.ok, "{status}");
        assert_eq!(output.values(), &[4.0, 2.0, 0.0, 9.0, 7.0, 5.0]);
    }

    #[test]
    fn failures_come_back_as_status() {
        let input = NativeTensor::allocate(&info(&[2, 2]));
        let (starts, ends) = slice_coordinates(&[1, 1], &[2, 1]);
        let mut output = NativeTensor::allocate(&info(&[2, 1]));
        let status = run(&Primitive::Slice { starts, ends }, &input, &mut output);
        assert!(!status.ok);
        assert!(status.description.starts_with("slice:"), "{status}");

        let primitive = Primitive::StridedSlice {
            starts: Coordinates::from_slice(&[0]),
            ends: Coordinates::from_slice(&[1]),
            strides: Coordinates::from_slice(&[0]),
        };
        assert_eq!(
            primitive.output_shape(&[3]).unwrap_err(),
            Status::error("strided_slice: zero stride")
        );
    }

    #[test]
    fn slice_copies_each_outer_plane() {
        let input =
            NativeTensor::from_values(&info(&[2, 3, 4]), (0..24).map(|v| v as f32).collect())
                .unwrap();
        let (starts, ends) = slice_coordinates(&[0, 1, 1], &[2, 2, 2]);
        let mut output = NativeTensor::allocate(&info(&[2, 2, 2]));
        let status = run(&Primitive::Slice { starts, ends }, &input, &mut output);
        assert!(status.ok, "{status}");
        assert_eq!(output.values(), &[5.0, 6.0, 9.0, 10.0, 17.0, 18.0, 21.0, 22.0]);
    }

    #[test]
    fn oversized_window_saturates_instead_of_wrapping() {
        let (starts, ends) = slice_coordinates(&[usize::MAX], &[2]);
        assert_eq!(starts.as_slice(), &[i64::MAX]);
        assert_eq!(ends.as_slice(), &[i64::MAX]);
        let primitive = Primitive::Slice { starts, ends };
        assert_eq!(primitive.output_shape(&[4]).unwrap().as_slice(), &[0]);

        let (starts, ends) = slice_coordinates(&[3], &[usize::MAX]);
        let primitive = Primitive::Slice { starts, ends };
        assert!(primitive.output_shape(&[4]).is_err());
    }
}
