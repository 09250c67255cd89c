//! Serialization of network weights and devices
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::borrow::Cow;
use std::convert::TryFrom;
use std::mem;
use tch::{Device, Kind, Tensor};
use thiserror::Error;

/// Remote serialization definition for [`tch::Device`].
///
/// Use `#[serde(with = "DeviceDef")]` on fields of type [`Device`].
#[derive(Serialize, Deserialize)]
#[serde(remote = "Device")]
pub enum DeviceDef {
    Cpu,
    Cuda(usize),
}

/// Error converting a [`TensorDef`] into a [`Tensor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorDefError {
    #[error("invalid tensor shape {0:?}")]
    Shape(Vec<i64>),
    #[error("shape {shape:?} requires {expected} bytes of data but there are {actual}")]
    DataSize {
        shape: Vec<i64>,
        expected: usize,
        actual: usize,
    },
}

/// Serialized form of a floating point [`Tensor`].
///
/// Values are stored as little-endian `f32` regardless of the tensor kind or host byte order.
/// The data is borrowed from the input when deserializing from a byte slice.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDef<'a> {
    pub shape: Vec<i64>,
    #[serde_as(as = "Bytes")]
    #[serde(borrow)]
    pub data: Cow<'a, [u8]>,
}

impl TensorDef<'_> {
    fn num_elements(&self) -> Option<usize> {
        self.shape
            .iter()
            .map(|&d| usize::try_from(d).ok())
            .product()
    }
}

/// Copy the values of a tensor, converting them to `f32`.
impl From<&Tensor> for TensorDef<'_> {
    fn from(tensor: &Tensor) -> Self {
        let values = tensor.to_device(Device::Cpu).to_kind(Kind::Float);
        let num_elements = usize::try_from(values.numel()).unwrap_or_default();
        let mut buffer = vec![0.0_f32; num_elements];
        values.copy_data(&mut buffer, num_elements);
        let data = buffer.iter().flat_map(|x| x.to_le_bytes()).collect();
        Self {
            shape: tensor.size(),
            data: Cow::Owned(data),
        }
    }
}

/// Create a CPU `f32` tensor from the stored values.
impl TryFrom<&TensorDef<'_>> for Tensor {
    type Error = TensorDefError;

    fn try_from(def: &TensorDef<'_>) -> Result<Self, Self::Error> {
        let num_elements = def
            .num_elements()
            .ok_or_else(|| TensorDefError::Shape(def.shape.clone()))?;
        let expected = num_elements * mem::size_of::<f32>();
        if def.data.len() != expected {
            return Err(TensorDefError::DataSize {
                shape: def.shape.clone(),
                expected,
                actual: def.data.len(),
            });
        }
        let values: Vec<f32> = def
            .data
            .chunks_exact(mem::size_of::<f32>())
            .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();
        Ok(Self::of_slice(&values).reshape(&def.shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};

    #[test]
    fn tokens_are_little_endian() {
        let tensor = Tensor::of_slice(&[1.0_f32]).reshape(&[]);
        let def = TensorDef::from(&tensor);
        assert_tokens(
            &def,
            &[
                Token::Struct {
                    name: "TensorDef",
                    len: 2,
                },
                Token::Str("shape"),
                Token::Seq { len: Some(0) },
                Token::SeqEnd,
                Token::Str("data"),
                Token::BorrowedBytes(&[0x00, 0x00, 0x80, 0x3f]),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn weights_through_cbor() {
        let tensor = Tensor::of_slice(&[1.0_f32, -2.0, 3.5, 0.25, 8.0, -1.0]).reshape(&[2, 3]);
        let bytes = serde_cbor::to_vec(&TensorDef::from(&tensor)).unwrap();
        let def: TensorDef = serde_cbor::from_slice(&bytes).unwrap();
        assert!(matches!(def.data, Cow::Borrowed(_)));
        let restored = Tensor::try_from(&def).unwrap();
        assert_eq!(restored.size(), vec![2, 3]);
        assert_eq!(restored, tensor);
    }

    #[test]
    fn double_tensor_stored_as_float() {
        let tensor = Tensor::of_slice(&[0.5_f64, -4.0]);
        let restored = Tensor::try_from(&TensorDef::from(&tensor)).unwrap();
        assert_eq!(restored.kind(), Kind::Float);
        assert_eq!(restored, Tensor::of_slice(&[0.5_f32, -4.0]));
    }

    #[test]
    fn data_size_mismatch() {
        let mut def = TensorDef::from(&Tensor::of_slice(&[1.0_f32, 2.0]));
        def.shape = vec![3];
        assert_eq!(
            Tensor::try_from(&def),
            Err(TensorDefError::DataSize {
                shape: vec![3],
                expected: 12,
                actual: 8
            })
        );
    }

    #[test]
    fn negative_dimension() {
        let def = TensorDef {
            shape: vec![-1],
            data: Cow::Borrowed(&[]),
        };
        assert_eq!(
            Tensor::try_from(&def),
            Err(TensorDefError::Shape(vec![-1]))
        );
    }

    #[test]
    fn device_serde() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct WithDevice(#[serde(with = "DeviceDef")] Device);

        let json = serde_json::to_string(&WithDevice(Device::Cuda(1))).unwrap();
        assert_eq!(json, r#"{"Cuda":1}"#);
        let parsed: WithDevice = serde_json::from_str(r#""Cpu""#).unwrap();
        assert_eq!(parsed, WithDevice(Device::Cpu));
    }
}
