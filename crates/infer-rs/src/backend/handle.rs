use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::codec::{decode_f32, encode_f32};
use crate::error::InvalidArgument;
use crate::tensor::TensorInfo;

/// Host tensor memory shared between the runtime and the workloads bound to it.
///
/// Clones alias the same buffer. Workloads never own the allocation's lifetime; they hold a
/// handle only as long as they are bound.
#[derive(Debug, Clone)]
pub struct TensorHandle {
    info: TensorInfo,
    data: Arc<RwLock<Vec<u8>>>,
}

impl TensorHandle {
    /// Zero-filled allocation sized for `info`.
    pub fn allocate(info: TensorInfo) -> Self {
        let data = vec![0u8; info.num_bytes()];
        Self {
            info,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn from_bytes(info: TensorInfo, data: Vec<u8>) -> Result<Self, InvalidArgument> {
        if data.len() != info.num_bytes() {
            return Err(InvalidArgument::DataSize {
                expected: info.num_bytes(),
                found: data.len(),
            });
        }
        Ok(Self {
            info,
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Allocates and encodes `values` into the element type of `info`.
    pub fn from_f32(info: TensorInfo, values: &[f32]) -> Result<Self, InvalidArgument> {
        let handle = Self::allocate(info);
        handle.write_f32(values)?;
        Ok(handle)
    }

    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read_f32(&self) -> Result<Vec<f32>, InvalidArgument> {
        decode_f32(&self.info, &self.read())
    }

    pub fn write_f32(&self, values: &[f32]) -> Result<(), InvalidArgument> {
        encode_f32(&self.info, values, &mut self.write())
    }

    /// True when both handles alias the same buffer.
    pub fn same_buffer(&self, other: &TensorHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, TensorShape};

    #[test]
    fn clones_alias_the_buffer() {
        let info = TensorInfo::new(TensorShape::new(&[2]).unwrap(), DataType::Float32);
        let handle = TensorHandle::allocate(info.clone());
        let alias = handle.clone();
        alias.write_f32(&[3.0, 4.0]).unwrap();
        assert_eq!(handle.read_f32().unwrap(), vec![3.0, 4.0]);
        assert!(handle.same_buffer(&alias));
        assert!(!handle.same_buffer(&TensorHandle::allocate(info)));
    }

    #[test]
    fn element_count_is_checked() {
        let info = TensorInfo::new(TensorShape::new(&[2]).unwrap(), DataType::Float32);
        assert_eq!(
            TensorHandle::from_f32(info, &[1.0]).unwrap_err(),
            InvalidArgument::ElementCount {
                expected: 2,
                found: 1
            }
        );
    }
}
