//! Element decoders and encoders.
//!
//! Kernels compute in `f32`. A [`Decoder`] turns stored elements of any [`DataType`] into
//! `f32`, applying the descriptor's quantization (per-tensor or per-axis); an [`Encoder`] does
//! the reverse with round-to-nearest and saturation. Values are stored little-endian.

use half::{bf16, f16};

use crate::error::InvalidArgument;
use crate::tensor::layout::per_axis_params;
use crate::tensor::{DataType, TensorInfo};

pub trait Decoder: Send + Sync {
    fn element_size(&self) -> usize;

    /// Real value of element `index`.
    fn get(&self, data: &[u8], index: usize) -> f32;

    fn decode(&self, data: &[u8]) -> Vec<f32> {
        let count = data.len() / self.element_size();
        (0..count).map(|index| self.get(data, index)).collect()
    }
}

pub trait Encoder: Send + Sync {
    fn element_size(&self) -> usize;

    fn set(&self, data: &mut [u8], index: usize, value: f32);

    fn encode(&self, values: &[f32], data: &mut [u8]) {
        for (index, &value) in values.iter().enumerate() {
            self.set(data, index, value);
        }
    }
}

macro_rules! build_codec {
    ($info:expr, $target:ty) => {{
        let info: &TensorInfo = $info;
        let codec: $target = match info.data_type() {
            DataType::Float32 => Box::new(F32Codec),
            DataType::Float16 => Box::new(F16Codec),
            DataType::BFloat16 => Box::new(Bf16Codec),
            DataType::Boolean => Box::new(BoolCodec),
            DataType::QAsymmU8 => Box::new(IntegerCodec::<u8>::new(info)?),
            DataType::QAsymmS8 | DataType::QSymmS8 => Box::new(IntegerCodec::<i8>::new(info)?),
            DataType::QSymmS16 => Box::new(IntegerCodec::<i16>::new(info)?),
            DataType::Signed32 => Box::new(IntegerCodec::<i32>::new(info)?),
            DataType::Signed64 => Box::new(IntegerCodec::<i64>::new(info)?),
        };
        codec
    }};
}

pub fn make_decoder(info: &TensorInfo) -> Result<Box<dyn Decoder>, InvalidArgument> {
    Ok(build_codec!(info, Box<dyn Decoder>))
}

pub fn make_encoder(info: &TensorInfo) -> Result<Box<dyn Encoder>, InvalidArgument> {
    Ok(build_codec!(info, Box<dyn Encoder>))
}

/// Decodes a whole buffer described by `info`.
pub fn decode_f32(info: &TensorInfo, data: &[u8]) -> Result<Vec<f32>, InvalidArgument> {
    check_len(info, data.len())?;
    Ok(make_decoder(info)?.decode(data))
}

/// Encodes `values` into a buffer described by `info`.
pub fn encode_f32(
    info: &TensorInfo,
    values: &[f32],
    data: &mut [u8],
) -> Result<(), InvalidArgument> {
    check_len(info, data.len())?;
    if values.len() != info.num_elements() {
        return Err(InvalidArgument::ElementCount {
            expected: info.num_elements(),
            found: values.len(),
        });
    }
    make_encoder(info)?.encode(values, data);
    Ok(())
}

fn check_len(info: &TensorInfo, len: usize) -> Result<(), InvalidArgument> {
    if len != info.num_bytes() {
        return Err(InvalidArgument::DataSize {
            expected: info.num_bytes(),
            found: len,
        });
    }
    Ok(())
}

#[inline]
fn chunk<const N: usize>(data: &[u8], index: usize) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&data[index * N..(index + 1) * N]);
    raw
}

#[derive(Debug, Clone, Copy)]
struct F32Codec;

impl Decoder for F32Codec {
    fn element_size(&self) -> usize {
        4
    }

    fn get(&self, data: &[u8], index: usize) -> f32 {
        f32::from_le_bytes(chunk(data, index))
    }
}

impl Encoder for F32Codec {
    fn element_size(&self) -> usize {
        4
    }

    fn set(&self, data: &mut [u8], index: usize, value: f32) {
        data[index * 4..(index + 1) * 4].copy_from_slice(&value.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy)]
struct F16Codec;

impl Decoder for F16Codec {
    fn element_size(&self) -> usize {
        2
    }

    fn get(&self, data: &[u8], index: usize) -> f32 {
        f16::from_le_bytes(chunk(data, index)).to_f32()
    }
}

impl Encoder for F16Codec {
    fn element_size(&self) -> usize {
        2
    }

    fn set(&self, data: &mut [u8], index: usize, value: f32) {
        data[index * 2..(index + 1) * 2].copy_from_slice(&f16::from_f32(value).to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy)]
struct Bf16Codec;

impl Decoder for Bf16Codec {
    fn element_size(&self) -> usize {
        2
    }

    fn get(&self, data: &[u8], index: usize) -> f32 {
        bf16::from_le_bytes(chunk(data, index)).to_f32()
    }
}

impl Encoder for Bf16Codec {
    fn element_size(&self) -> usize {
        2
    }

    fn set(&self, data: &mut [u8], index: usize, value: f32) {
        data[index * 2..(index + 1) * 2].copy_from_slice(&bf16::from_f32(value).to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy)]
struct BoolCodec;

impl Decoder for BoolCodec {
    fn element_size(&self) -> usize {
        1
    }

    fn get(&self, data: &[u8], index: usize) -> f32 {
        if data[index] != 0 {
            1.0
        } else {
            0.0
        }
    }
}

impl Encoder for BoolCodec {
    fn element_size(&self) -> usize {
        1
    }

    fn set(&self, data: &mut [u8], index: usize, value: f32) {
        data[index] = u8::from(value != 0.0);
    }
}

/// Integer storage backing the affine codecs.
trait Storage: Copy + Send + Sync + 'static {
    const SIZE: usize;
    const MIN: f32;
    const MAX: f32;

    fn read(data: &[u8], index: usize) -> f32;

    /// `value` is already rounded and clamped to `[MIN, MAX]`.
    fn write(data: &mut [u8], index: usize, value: f32);
}

macro_rules! impl_storage {
    ($($ty:ty),*) => {$(
        impl Storage for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            const MIN: f32 = <$ty>::MIN as f32;
            const MAX: f32 = <$ty>::MAX as f32;

            fn read(data: &[u8], index: usize) -> f32 {
                <$ty>::from_le_bytes(chunk(data, index)) as f32
            }

            fn write(data: &mut [u8], index: usize, value: f32) {
                let start = index * Self::SIZE;
                data[start..start + Self::SIZE].copy_from_slice(&(value as $ty).to_le_bytes());
            }
        }
    )*};
}

impl_storage!(u8, i8, i16, i32, i64);

/// Affine integer codec: `real = scale * (stored - offset)`.
///
/// With several scales the scale of element `i` is
/// `scales[(i % axis_factor) / (axis_factor / scales.len())]`.
#[derive(Debug, Clone)]
struct IntegerCodec<S> {
    scales: Vec<f32>,
    offset: i32,
    axis_factor: usize,
    _storage: std::marker::PhantomData<S>,
}

impl<S: Storage> IntegerCodec<S> {
    fn new(info: &TensorInfo) -> Result<Self, InvalidArgument> {
        let (scales, axis_factor) = if info.has_multiple_quantization_scales() {
            let (axis_factor, scales) = per_axis_params(info)?;
            if let Some(axis) = info.quantization_axis() {
                let extent = info.shape().dim(axis)?;
                if extent != scales.len() {
                    return Err(InvalidArgument::ScaleCount {
                        axis,
                        expected: extent,
                        found: scales.len(),
                    });
                }
            }
            (scales, axis_factor)
        } else {
            (vec![info.quantization_scale()], 1)
        };
        Ok(Self {
            scales,
            offset: info.quantization_offset(),
            axis_factor,
            _storage: std::marker::PhantomData,
        })
    }

    #[inline]
    fn scale(&self, index: usize) -> f32 {
        match self.scales.as_slice() {
            [scale] => *scale,
            scales => {
                let per_channel = self.axis_factor / scales.len();
                scales[(index % self.axis_factor) / per_channel]
            }
        }
    }
}

impl<S: Storage> Decoder for IntegerCodec<S> {
    fn element_size(&self) -> usize {
        S::SIZE
    }

    fn get(&self, data: &[u8], index: usize) -> f32 {
        (S::read(data, index) - self.offset as f32) * self.scale(index)
    }
}

impl<S: Storage> Encoder for IntegerCodec<S> {
    fn element_size(&self) -> usize {
        S::SIZE
    }

    fn set(&self, data: &mut [u8], index: usize, value: f32) {
        let quantized = (value / self.scale(index)).round() + self.offset as f32;
        let clamped = if quantized.is_nan() {
            self.offset as f32
        } else {
            quantized.clamp(S::MIN, S::MAX)
        };
        S::write(data, index, clamped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorShape;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::new(dims).unwrap()
    }

    #[test]
    fn float_types_round_trip() {
        for data_type in [DataType::Float32, DataType::Float16, DataType::BFloat16] {
            let info = TensorInfo::new(shape(&[3]), data_type);
            let mut data = vec![0u8; info.num_bytes()];
            encode_f32(&info, &[1.0, -2.5, 0.0], &mut data).unwrap();
            assert_eq!(decode_f32(&info, &data).unwrap(), vec![1.0, -2.5, 0.0]);
        }
    }

    #[test]
    fn quantized_encoding_rounds_and_saturates() {
        let info = TensorInfo::quantized(shape(&[4]), DataType::QAsymmU8, 0.5, 10);
        let mut data = vec![0u8; 4];
        encode_f32(&info, &[1.0, 1.2, -100.0, 1000.0], &mut data).unwrap();
        assert_eq!(data, vec![12, 12, 0, 255]);
        assert_eq!(decode_f32(&info, &data).unwrap(), vec![1.0, 1.0, -5.0, 122.5]);
    }

    #[test]
    fn legacy_defaults_decode_plain_integers() {
        let info = TensorInfo::new(shape(&[2]), DataType::Signed32);
        let mut data = Vec::new();
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&(-3i32).to_le_bytes());
        assert_eq!(decode_f32(&info, &data).unwrap(), vec![7.0, -3.0]);
    }

    #[test]
    fn per_axis_scales_follow_the_axis() {
        // Scales along axis 1 of a [2, 3] tensor.
        let info =
            TensorInfo::per_axis(shape(&[2, 3]), DataType::QSymmS8, vec![1.0, 2.0, 4.0], 1)
                .unwrap();
        let data: Vec<u8> = [1i8, 1, 1, 2, 2, 2].iter().map(|&v| v as u8).collect();
        assert_eq!(
            decode_f32(&info, &data).unwrap(),
            vec![1.0, 2.0, 4.0, 2.0, 4.0, 8.0]
        );

        // Scales along axis 0.
        let info =
            TensorInfo::per_axis(shape(&[2, 3]), DataType::QSymmS8, vec![1.0, 10.0], 0).unwrap();
        assert_eq!(
            decode_f32(&info, &data).unwrap(),
            vec![1.0, 1.0, 1.0, 20.0, 20.0, 20.0]
        );
    }

    #[test]
    fn per_axis_scale_count_must_match_extent() {
        let info =
            TensorInfo::per_axis(shape(&[2, 3]), DataType::QSymmS8, vec![1.0, 2.0], 1).unwrap();
        assert!(matches!(
            make_decoder(&info),
            Err(InvalidArgument::ScaleCount { axis: 1, expected: 3, found: 2 })
        ));
    }

    #[test]
    fn boolean_decodes_nonzero_as_one() {
        let info = TensorInfo::new(shape(&[3]), DataType::Boolean);
        assert_eq!(decode_f32(&info, &[0, 5, 1]).unwrap(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let info = TensorInfo::new(shape(&[2]), DataType::Float32);
        assert_eq!(
            decode_f32(&info, &[0; 7]),
            Err(InvalidArgument::DataSize {
                expected: 8,
                found: 7
            })
        );
    }
}
