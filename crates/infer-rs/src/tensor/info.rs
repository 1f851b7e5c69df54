//! Tensor descriptor coupling shape, element type and quantization.

use serde::{Deserialize, Serialize};

use super::{DataType, QuantizationParams, TensorShape};
use crate::error::InvalidArgument;

/// Shape, element type and quantization metadata attached to every graph slot.
///
/// Descriptors are plain values: they are cloned into workloads and never mutated behind a
/// workload's back. Quantization setters validate their invariants immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorInfoRepr")]
pub struct TensorInfo {
    shape: TensorShape,
    data_type: DataType,
    quantization: QuantizationParams,
}

impl Default for TensorInfo {
    fn default() -> Self {
        Self::new(TensorShape::default(), DataType::Float32)
    }
}

impl TensorInfo {
    /// Descriptor without quantization parameters; legacy defaults apply on read.
    pub fn new(shape: TensorShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            quantization: QuantizationParams::default(),
        }
    }

    /// Convenience constructor from raw extents.
    pub fn from_dims(dims: &[usize], data_type: DataType) -> Result<Self, InvalidArgument> {
        Ok(Self::new(TensorShape::new(dims)?, data_type))
    }

    /// Single-scale constructor matching the legacy two-argument quantization form.
    pub fn quantized(shape: TensorShape, data_type: DataType, scale: f32, offset: i32) -> Self {
        Self {
            shape,
            data_type,
            quantization: QuantizationParams::per_tensor(scale, offset),
        }
    }

    /// Per-axis constructor: one scale per slice along `axis`.
    pub fn per_axis(
        shape: TensorShape,
        data_type: DataType,
        scales: Vec<f32>,
        axis: usize,
    ) -> Result<Self, InvalidArgument> {
        let mut info = Self::new(shape, data_type);
        info.set_per_axis_quantization(scales, axis)?;
        Ok(info)
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Replaces the shape, re-checking that any quantization axis still fits.
    pub fn set_shape(&mut self, shape: TensorShape) -> Result<(), InvalidArgument> {
        if let Some(axis) = self.quantization.axis {
            check_axis(axis, &shape)?;
        }
        self.shape = shape;
        Ok(())
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: DataType) -> Result<(), InvalidArgument> {
        if self.quantization.axis.is_some() && !data_type.is_integer() {
            return Err(InvalidArgument::PerAxisOnNonInteger(data_type));
        }
        self.data_type = data_type;
        Ok(())
    }

    pub fn num_dimensions(&self) -> usize {
        self.shape.rank()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    pub fn num_bytes(&self) -> usize {
        self.data_type.size_in_bytes() * self.num_elements()
    }

    pub fn is_quantized(&self) -> bool {
        self.data_type.is_quantized()
    }

    pub fn quantization(&self) -> &QuantizationParams {
        &self.quantization
    }

    pub fn has_multiple_quantization_scales(&self) -> bool {
        self.quantization.has_multiple_scales()
    }

    pub fn has_per_axis_quantization(&self) -> bool {
        self.has_multiple_quantization_scales() || self.quantization.axis.is_some()
    }

    pub fn quantization_scales(&self) -> &[f32] {
        &self.quantization.scales
    }

    /// Replaces the scale list. More than one scale requires an axis to already be set.
    pub fn set_quantization_scales(&mut self, scales: Vec<f32>) -> Result<(), InvalidArgument> {
        if scales.is_empty() {
            return Err(InvalidArgument::EmptyScales);
        }
        if scales.len() > 1 && self.quantization.axis.is_none() {
            return Err(InvalidArgument::MissingQuantizationAxis {
                count: scales.len(),
            });
        }
        self.quantization.scales = scales;
        Ok(())
    }

    /// Per-tensor scale. Reads `1.0` when no scale was ever set.
    ///
    /// # Panics
    ///
    /// Panics when the descriptor carries several per-axis scales; use
    /// [`try_quantization_scale`](Self::try_quantization_scale) when that is a possibility.
    pub fn quantization_scale(&self) -> f32 {
        assert!(
            !self.has_multiple_quantization_scales(),
            "quantization_scale() called on a per-axis quantized {} tensor with {} scales",
            self.data_type,
            self.quantization.scales.len()
        );
        self.try_quantization_scale().unwrap_or(1.0)
    }

    /// Per-tensor scale, or `None` when the descriptor is quantized per axis.
    pub fn try_quantization_scale(&self) -> Option<f32> {
        match self.quantization.scales.as_slice() {
            [] => Some(1.0),
            [scale] => Some(*scale),
            _ => None,
        }
    }

    pub fn set_quantization_scale(&mut self, scale: f32) {
        self.quantization.scales = vec![scale];
    }

    /// Zero point. Reads `0` when none was set.
    pub fn quantization_offset(&self) -> i32 {
        self.quantization.offset.unwrap_or(0)
    }

    pub fn set_quantization_offset(&mut self, offset: i32) {
        self.quantization.offset = Some(offset);
    }

    pub fn quantization_axis(&self) -> Option<usize> {
        self.quantization.axis
    }

    pub fn set_quantization_axis(&mut self, axis: Option<usize>) -> Result<(), InvalidArgument> {
        match axis {
            Some(axis) => {
                if !self.data_type.is_integer() {
                    return Err(InvalidArgument::PerAxisOnNonInteger(self.data_type));
                }
                check_axis(axis, &self.shape)?;
            }
            None if self.has_multiple_quantization_scales() => {
                return Err(InvalidArgument::MissingQuantizationAxis {
                    count: self.quantization.scales.len(),
                });
            }
            None => {}
        }
        self.quantization.axis = axis;
        Ok(())
    }

    /// Sets scales and axis together so neither intermediate state is observable.
    pub fn set_per_axis_quantization(
        &mut self,
        scales: Vec<f32>,
        axis: usize,
    ) -> Result<(), InvalidArgument> {
        if scales.is_empty() {
            return Err(InvalidArgument::EmptyScales);
        }
        if !self.data_type.is_integer() {
            return Err(InvalidArgument::PerAxisOnNonInteger(self.data_type));
        }
        check_axis(axis, &self.shape)?;
        self.quantization.scales = scales;
        self.quantization.axis = Some(axis);
        Ok(())
    }

    /// Returns `true` when both descriptors hold values in the same numeric space.
    ///
    /// Element types must agree. Quantized single-scale descriptors must also agree on scale and
    /// offset; per-axis descriptors must agree on the whole parameter block.
    pub fn is_type_space_match(&self, other: &TensorInfo) -> bool {
        if self.data_type != other.data_type {
            return false;
        }
        if !self.is_quantized() {
            return true;
        }
        if self.has_per_axis_quantization() || other.has_per_axis_quantization() {
            return self.quantization_scales() == other.quantization_scales()
                && self.quantization_axis() == other.quantization_axis()
                && self.quantization_offset() == other.quantization_offset();
        }
        self.quantization_scale() == other.quantization_scale()
            && self.quantization_offset() == other.quantization_offset()
    }
}

fn check_axis(axis: usize, shape: &TensorShape) -> Result<(), InvalidArgument> {
    if shape.is_specified() && axis >= shape.rank() {
        return Err(InvalidArgument::Axis {
            axis: axis as i64,
            rank: shape.rank(),
        });
    }
    Ok(())
}

#[derive(Deserialize)]
struct TensorInfoRepr {
    shape: TensorShape,
    data_type: DataType,
    #[serde(default)]
    quantization: QuantizationParams,
}

impl TryFrom<TensorInfoRepr> for TensorInfo {
    type Error = InvalidArgument;

    fn try_from(repr: TensorInfoRepr) -> Result<Self, Self::Error> {
        let mut info = TensorInfo::new(repr.shape, repr.data_type);
        let QuantizationParams {
            scales,
            offset,
            axis,
        } = repr.quantization;
        match axis {
            Some(axis) => info.set_per_axis_quantization(scales, axis)?,
            None if !scales.is_empty() => info.set_quantization_scales(scales)?,
            None => {}
        }
        if let Some(offset) = offset {
            info.set_quantization_offset(offset);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::new(dims).unwrap()
    }

    #[test]
    fn legacy_defaults_apply_without_quantization() {
        let info = TensorInfo::new(shape(&[2, 2]), DataType::QAsymmU8);
        assert_eq!(info.quantization_scale(), 1.0);
        assert_eq!(info.quantization_offset(), 0);
        assert!(!info.has_per_axis_quantization());
    }

    #[test]
    fn single_scale_round_trips() {
        let info = TensorInfo::quantized(shape(&[4]), DataType::QAsymmU8, 0.125, 7);
        assert_eq!(info.quantization_scale(), 0.125);
        assert_eq!(info.quantization_offset(), 7);
        assert_eq!(info.num_bytes(), 4);
    }

    #[test]
    fn per_axis_requires_an_axis() {
        let mut info = TensorInfo::new(shape(&[3, 2]), DataType::QSymmS8);
        assert_eq!(
            info.set_quantization_scales(vec![0.1, 0.2, 0.3]),
            Err(InvalidArgument::MissingQuantizationAxis { count: 3 })
        );
        info.set_per_axis_quantization(vec![0.1, 0.2, 0.3], 0).unwrap();
        assert!(info.has_per_axis_quantization());
        assert_eq!(info.try_quantization_scale(), None);
        assert_eq!(
            info.set_quantization_axis(None),
            Err(InvalidArgument::MissingQuantizationAxis { count: 3 })
        );
    }

    #[test]
    fn per_axis_rejects_float_and_bad_axis() {
        assert_eq!(
            TensorInfo::per_axis(shape(&[2, 2]), DataType::Float32, vec![1.0, 2.0], 0),
            Err(InvalidArgument::PerAxisOnNonInteger(DataType::Float32))
        );
        assert_eq!(
            TensorInfo::per_axis(shape(&[2, 2]), DataType::QSymmS8, vec![1.0, 2.0], 2),
            Err(InvalidArgument::Axis { axis: 2, rank: 2 })
        );
    }

    #[test]
    #[should_panic(expected = "per-axis quantized")]
    fn per_tensor_scale_on_per_axis_descriptor_panics() {
        let info =
            TensorInfo::per_axis(shape(&[2, 2]), DataType::QSymmS8, vec![1.0, 2.0], 1).unwrap();
        let _ = info.quantization_scale();
    }

    #[test]
    fn type_space_match_is_reflexive_and_symmetric() {
        let infos = [
            TensorInfo::new(shape(&[4]), DataType::Float32),
            TensorInfo::quantized(shape(&[4]), DataType::QAsymmU8, 0.5, 3),
            TensorInfo::quantized(shape(&[4]), DataType::QAsymmU8, 0.25, 3),
            TensorInfo::per_axis(shape(&[2, 2]), DataType::QSymmS8, vec![1.0, 2.0], 0).unwrap(),
            TensorInfo::per_axis(shape(&[2, 2]), DataType::QSymmS8, vec![1.0, 3.0], 0).unwrap(),
            TensorInfo::quantized(shape(&[2, 2]), DataType::QSymmS8, 1.0, 0),
        ];
        for a in &infos {
            assert!(a.is_type_space_match(a));
            assert!(a.is_type_space_match(&a.clone()));
            for b in &infos {
                assert_eq!(a.is_type_space_match(b), b.is_type_space_match(a));
            }
        }
        assert!(!infos[1].is_type_space_match(&infos[2]));
        assert!(!infos[3].is_type_space_match(&infos[4]));
        assert!(!infos[3].is_type_space_match(&infos[5]));
        // Shapes do not take part in the type space.
        assert!(infos[0].is_type_space_match(&TensorInfo::new(shape(&[9, 9]), DataType::Float32)));
    }

    #[test]
    fn deserialization_enforces_quantization_invariants() {
        let json = r#"{"shape":[2,3],"data_type":"QSymmS8","#.to_string()
            + r#""quantization":{"scales":[0.5,0.25],"axis":0}}"#;
        let ok: TensorInfo = serde_json::from_str(&json).unwrap();
        assert!(ok.has_per_axis_quantization());

        let missing_axis = serde_json::from_str::<TensorInfo>(
            r#"{"shape":[2,3],"data_type":"QSymmS8","quantization":{"scales":[0.5,0.25]}}"#,
        );
        assert!(missing_axis.is_err());
    }
}
