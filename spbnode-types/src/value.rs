use std::string::FromUtf8Error;

use crate::payload::{data_set::data_set_value, metric, template::parameter, DataType};
use crate::{traits, DataSet, Template};

use paste::paste;
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct DateTime {
    /* milliseconds since epoch (Jan 1, 1970) */
    pub date_time: u64,
}

impl DateTime {
    pub fn new(date_time: u64) -> Self {
        Self { date_time }
    }

    #[allow(clippy::wrong_self_convention)]
    fn to_le_bytes(self) -> [u8; 8] {
        self.date_time.to_le_bytes()
    }

    fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self::new(u64::from_le_bytes(bytes))
    }
}

/// A typed metric value.
///
/// There is one variant per supported Sparkplug datatype. A null metric is
/// represented by the absence of a `Value`, never by a variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    DateTime(DateTime),
    Text(String),
    Uuid(String),
    DataSet(DataSet),
    Bytes(Vec<u8>),
    File(Vec<u8>),
    Template(Template),
    Int8Array(Vec<i8>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    UInt8Array(Vec<u8>),
    UInt16Array(Vec<u16>),
    UInt32Array(Vec<u32>),
    UInt64Array(Vec<u64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    BooleanArray(Vec<bool>),
    StringArray(Vec<String>),
    DateTimeArray(Vec<DateTime>),
}

impl Value {
    /// The Sparkplug datatype this value is encoded as.
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt8(_) => DataType::UInt8,
            Value::UInt16(_) => DataType::UInt16,
            Value::UInt32(_) => DataType::UInt32,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Boolean(_) => DataType::Boolean,
            Value::String(_) => DataType::String,
            Value::DateTime(_) => DataType::DateTime,
            Value::Text(_) => DataType::Text,
            Value::Uuid(_) => DataType::Uuid,
            Value::DataSet(_) => DataType::DataSet,
            Value::Bytes(_) => DataType::Bytes,
            Value::File(_) => DataType::File,
            Value::Template(_) => DataType::Template,
            Value::Int8Array(_) => DataType::Int8Array,
            Value::Int16Array(_) => DataType::Int16Array,
            Value::Int32Array(_) => DataType::Int32Array,
            Value::Int64Array(_) => DataType::Int64Array,
            Value::UInt8Array(_) => DataType::UInt8Array,
            Value::UInt16Array(_) => DataType::UInt16Array,
            Value::UInt32Array(_) => DataType::UInt32Array,
            Value::UInt64Array(_) => DataType::UInt64Array,
            Value::FloatArray(_) => DataType::FloatArray,
            Value::DoubleArray(_) => DataType::DoubleArray,
            Value::BooleanArray(_) => DataType::BooleanArray,
            Value::StringArray(_) => DataType::StringArray,
            Value::DateTimeArray(_) => DataType::DateTimeArray,
        }
    }

    /// Re-tag a value as another datatype sharing the same representation
    /// (String/Text/UUID and Bytes/File/UInt8Array).
    ///
    /// Returns the value unchanged as the error if no such re-tagging exists.
    pub fn retag(self, datatype: DataType) -> Result<Value, Value> {
        if self.datatype() == datatype {
            return Ok(self);
        }
        match (self, datatype) {
            (Value::String(s) | Value::Text(s) | Value::Uuid(s), DataType::String) => {
                Ok(Value::String(s))
            }
            (Value::String(s) | Value::Text(s) | Value::Uuid(s), DataType::Text) => {
                Ok(Value::Text(s))
            }
            (Value::String(s) | Value::Text(s) | Value::Uuid(s), DataType::Uuid) => {
                Ok(Value::Uuid(s))
            }
            (Value::Bytes(b) | Value::File(b) | Value::UInt8Array(b), DataType::Bytes) => {
                Ok(Value::Bytes(b))
            }
            (Value::Bytes(b) | Value::File(b) | Value::UInt8Array(b), DataType::File) => {
                Ok(Value::File(b))
            }
            (Value::Bytes(b) | Value::File(b) | Value::UInt8Array(b), DataType::UInt8Array) => {
                Ok(Value::UInt8Array(b))
            }
            (value, _) => Err(value),
        }
    }
}

fn bool_to_proto(val: bool) -> bool {
    val
}
fn u8_to_proto(val: u8) -> u32 {
    val as u32
}
fn u16_to_proto(val: u16) -> u32 {
    val as u32
}
fn u32_to_proto(val: u32) -> u32 {
    val
}
fn u64_to_proto(val: u64) -> u64 {
    val
}
fn i8_to_proto(val: i8) -> u32 {
    let b = val.to_le_bytes();
    u32::from_le_bytes([b[0], 0, 0, 0])
}
fn i16_to_proto(val: i16) -> u32 {
    let b = val.to_le_bytes();
    u32::from_le_bytes([b[0], b[1], 0, 0])
}
fn i32_to_proto(val: i32) -> u32 {
    u32::from_le_bytes(val.to_le_bytes())
}
fn i64_to_proto(val: i64) -> u64 {
    u64::from_le_bytes(val.to_le_bytes())
}
fn f32_to_proto(val: f32) -> f32 {
    val
}
fn f64_to_proto(val: f64) -> f64 {
    val
}
fn string_to_proto(val: String) -> String {
    val
}
fn datetime_to_proto(val: DateTime) -> u64 {
    val.date_time
}

fn proto_to_bool(val: bool) -> bool {
    val
}
fn proto_to_u8(val: u32) -> u8 {
    val as u8
}
fn proto_to_u16(val: u32) -> u16 {
    val as u16
}
fn proto_to_u32(val: u32) -> u32 {
    val
}
fn proto_to_u64(val: u64) -> u64 {
    val
}
fn proto_to_i8(val: u32) -> i8 {
    let bytes = val.to_le_bytes();
    i8::from_le_bytes([bytes[0]])
}
fn proto_to_i16(val: u32) -> i16 {
    let bytes = val.to_le_bytes();
    i16::from_le_bytes([bytes[0], bytes[1]])
}
fn proto_to_i32(val: u32) -> i32 {
    i32::from_le_bytes(val.to_le_bytes())
}
fn proto_to_i64(val: u64) -> i64 {
    i64::from_le_bytes(val.to_le_bytes())
}
fn proto_to_f32(val: f32) -> f32 {
    val
}
fn proto_to_f64(val: f64) -> f64 {
    val
}
fn proto_to_string(val: String) -> String {
    val
}
fn proto_to_datetime(val: u64) -> DateTime {
    DateTime { date_time: val }
}

/* Array type conversions */

#[derive(Debug, Error, PartialEq)]
pub enum FromBytesError {
    #[error("Invalid format")]
    InvalidFormat,
    #[error("Invalid bytes size")]
    InvalidSize,
    #[error("StringArray string decoding error {0}")]
    BadStringElement(#[from] FromUtf8Error),
}

macro_rules! define_array_proto_conversions {
  ($ty:ty) => {
    paste! {
      pub(crate) fn [<$ty:lower _vec_to_proto>](vec: Vec<$ty>) -> Vec<u8> {
        let mut out = Vec::with_capacity(vec.len() * std::mem::size_of::<$ty>());
        vec.into_iter().for_each(|x| out.extend(x.to_le_bytes()));
        out
      }

      pub(crate) fn [<proto_to_$ty:lower _vec>](vec: Vec<u8>) -> Result<Vec<$ty>, FromBytesError> {
        const WIDTH: usize = std::mem::size_of::<$ty>();
        if vec.len() % WIDTH != 0 { return Err(FromBytesError::InvalidFormat) }
        let out = vec.chunks_exact(WIDTH).map(|x| {
          let mut buf = [0u8; WIDTH];
          buf.copy_from_slice(x);
          <$ty>::from_le_bytes(buf)
        }).collect();
        Ok(out)
      }
    }
  };
}

define_array_proto_conversions!(i8);
define_array_proto_conversions!(i16);
define_array_proto_conversions!(i32);
define_array_proto_conversions!(i64);
define_array_proto_conversions!(u16);
define_array_proto_conversions!(u32);
define_array_proto_conversions!(u64);
define_array_proto_conversions!(f32);
define_array_proto_conversions!(f64);
define_array_proto_conversions!(DateTime);

fn pack_byte_with_bool(bools: &[bool]) -> u8 {
    bools
        .iter()
        .enumerate()
        .fold(0u8, |acc, (i, b)| acc | ((*b as u8) << (7 - i)))
}

pub(crate) fn bool_vec_to_proto(vec: Vec<bool>) -> Vec<u8> {
    /* BooleanArray as an array of bit-packed bytes preceded by a 4-byte integer that represents the total number of boolean values */
    let count = vec.len() as u32;
    let bool_bytes_len = count.div_ceil(8) as usize;
    let mut out = Vec::<u8>::with_capacity(std::mem::size_of::<u32>() + bool_bytes_len);
    out.extend(count.to_le_bytes());
    vec.chunks(8).for_each(|chunk| out.push(pack_byte_with_bool(chunk)));
    out
}

pub(crate) fn proto_to_bool_vec(bytes: Vec<u8>) -> Result<Vec<bool>, FromBytesError> {
    if bytes.len() < 4 {
        return Err(FromBytesError::InvalidSize);
    }
    let bool_count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let bools_data = &bytes[4..];
    if bools_data.len() < bool_count.div_ceil(8) {
        return Err(FromBytesError::InvalidFormat);
    }
    let out = (0..bool_count)
        .map(|i| (bools_data[i / 8] >> (7 - (i % 8))) & 1 == 1)
        .collect();
    Ok(out)
}

pub(crate) fn string_vec_to_proto(vec: Vec<String>) -> Vec<u8> {
    /* StringArray as an array of null terminated strings */
    let buffer_len = vec.iter().fold(0usize, |len, string| len + string.len()) + vec.len();
    let mut out = Vec::with_capacity(buffer_len);
    vec.into_iter().for_each(|string| {
        out.extend(string.into_bytes());
        out.push(0x0);
    });
    out
}

pub(crate) fn proto_to_string_vec(vec: Vec<u8>) -> Result<Vec<String>, FromBytesError> {
    match vec.last() {
        Some(0) => (),
        Some(_) => return Err(FromBytesError::InvalidFormat),
        None => return Ok(Vec::new()),
    }

    let mut res = Vec::new();
    let mut split = vec.split(|x| *x == 0).peekable();
    while let Some(string_data) = split.next() {
        if split.peek().is_none() {
            break;
        }
        res.push(String::from_utf8(string_data.into())?)
    }
    Ok(res)
}

#[derive(Debug, Error, PartialEq)]
pub enum FromValueTypeError {
    #[error("Value variant type was invalid")]
    InvalidVariantType,
}

/*
  The DataSet cell, Template parameter and Metric oneofs share the same scalar
  variants, generate the scalar conversions for each of them.
*/
macro_rules! impl_scalar_proto_conversions {
    ($proto:ty, $to_fn:ident, $from_fn:ident) => {
        /// Convert a scalar value, handing non scalar values back as the error.
        pub(crate) fn $to_fn(value: Value) -> Result<$proto, Value> {
            type P = $proto;
            let out = match value {
                Value::Int8(v) => P::IntValue(i8_to_proto(v)),
                Value::Int16(v) => P::IntValue(i16_to_proto(v)),
                Value::Int32(v) => P::IntValue(i32_to_proto(v)),
                Value::Int64(v) => P::LongValue(i64_to_proto(v)),
                Value::UInt8(v) => P::IntValue(u8_to_proto(v)),
                Value::UInt16(v) => P::IntValue(u16_to_proto(v)),
                Value::UInt32(v) => P::IntValue(u32_to_proto(v)),
                Value::UInt64(v) => P::LongValue(u64_to_proto(v)),
                Value::Float(v) => P::FloatValue(f32_to_proto(v)),
                Value::Double(v) => P::DoubleValue(f64_to_proto(v)),
                Value::Boolean(v) => P::BooleanValue(bool_to_proto(v)),
                Value::String(v) => P::StringValue(string_to_proto(v)),
                Value::Text(v) => P::StringValue(string_to_proto(v)),
                Value::DateTime(v) => P::LongValue(datetime_to_proto(v)),
                other => return Err(other),
            };
            Ok(out)
        }

        /// Convert a scalar protobuf value given the datatype it was declared with.
        ///
        /// Returns the protobuf value back if it does not fit the datatype.
        pub(crate) fn $from_fn(datatype: DataType, value: $proto) -> Result<Value, $proto> {
            type P = $proto;
            let out = match (datatype, value) {
                (DataType::Int8, P::IntValue(v)) => Value::Int8(proto_to_i8(v)),
                (DataType::Int16, P::IntValue(v)) => Value::Int16(proto_to_i16(v)),
                (DataType::Int32, P::IntValue(v)) => Value::Int32(proto_to_i32(v)),
                (DataType::Int64, P::LongValue(v)) => Value::Int64(proto_to_i64(v)),
                (DataType::UInt8, P::IntValue(v)) => Value::UInt8(proto_to_u8(v)),
                (DataType::UInt16, P::IntValue(v)) => Value::UInt16(proto_to_u16(v)),
                (DataType::UInt32, P::IntValue(v)) => Value::UInt32(proto_to_u32(v)),
                (DataType::UInt64, P::LongValue(v)) => Value::UInt64(proto_to_u64(v)),
                (DataType::Float, P::FloatValue(v)) => Value::Float(proto_to_f32(v)),
                (DataType::Double, P::DoubleValue(v)) => Value::Double(proto_to_f64(v)),
                (DataType::Boolean, P::BooleanValue(v)) => Value::Boolean(proto_to_bool(v)),
                (DataType::String, P::StringValue(v)) => Value::String(proto_to_string(v)),
                (DataType::Text, P::StringValue(v)) => Value::Text(proto_to_string(v)),
                (DataType::DateTime, P::LongValue(v)) => Value::DateTime(proto_to_datetime(v)),
                (_, value) => return Err(value),
            };
            Ok(out)
        }
    };
}

impl_scalar_proto_conversions!(metric::Value, scalar_to_metric_value, metric_value_to_scalar);
impl_scalar_proto_conversions!(
    data_set_value::Value,
    scalar_to_data_set_value,
    data_set_value_to_scalar
);
impl_scalar_proto_conversions!(
    parameter::Value,
    scalar_to_parameter_value,
    parameter_value_to_scalar
);

/* Trait implementations */

macro_rules! array_length {
  ([$($element:expr),* $(,)?]) => {
    {
      0 $(+ {let _ = $element; 1})*
    }
  };
}

macro_rules! impl_has_datatype {
  ($type:ty, [$($datatypes:expr),* $(,)?]) => {
    impl traits::HasDataType for $type {
      fn supported_datatypes() -> &'static[DataType] {
        static SUPPORTED_TYPES: [DataType; array_length!([$($datatypes),*])] = [$($datatypes),*];
        &SUPPORTED_TYPES
      }
    }
  };
}

macro_rules! impl_metric_value_type {
  ($type:ty, [$($datatypes:expr),* $(,)?], $into_variant:path, [$($variant:path),* $(,)?]) => {

    impl_has_datatype!($type, [$($datatypes),*]);

    impl traits::MetricValue for $type {}

    impl From<$type> for Value {
      fn from(value: $type) -> Self {
        $into_variant(value)
      }
    }

    impl TryFrom<Value> for $type {
      type Error = FromValueTypeError;
      fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
          $($variant(v) => Ok(v),)*
          _ => Err(FromValueTypeError::InvalidVariantType),
        }
      }
    }
  };
}

impl_metric_value_type!(bool, [DataType::Boolean], Value::Boolean, [Value::Boolean]);
impl_metric_value_type!(i8, [DataType::Int8], Value::Int8, [Value::Int8]);
impl_metric_value_type!(i16, [DataType::Int16], Value::Int16, [Value::Int16]);
impl_metric_value_type!(i32, [DataType::Int32], Value::Int32, [Value::Int32]);
impl_metric_value_type!(i64, [DataType::Int64], Value::Int64, [Value::Int64]);
impl_metric_value_type!(u8, [DataType::UInt8], Value::UInt8, [Value::UInt8]);
impl_metric_value_type!(u16, [DataType::UInt16], Value::UInt16, [Value::UInt16]);
impl_metric_value_type!(u32, [DataType::UInt32], Value::UInt32, [Value::UInt32]);
impl_metric_value_type!(u64, [DataType::UInt64], Value::UInt64, [Value::UInt64]);
impl_metric_value_type!(f32, [DataType::Float], Value::Float, [Value::Float]);
impl_metric_value_type!(f64, [DataType::Double], Value::Double, [Value::Double]);
impl_metric_value_type!(
    String,
    [DataType::String, DataType::Text, DataType::Uuid],
    Value::String,
    [Value::String, Value::Text, Value::Uuid]
);
impl_metric_value_type!(DateTime, [DataType::DateTime], Value::DateTime, [Value::DateTime]);
impl_metric_value_type!(DataSet, [DataType::DataSet], Value::DataSet, [Value::DataSet]);
impl_metric_value_type!(Template, [DataType::Template], Value::Template, [Value::Template]);
impl_metric_value_type!(Vec<bool>, [DataType::BooleanArray], Value::BooleanArray, [Value::BooleanArray]);
impl_metric_value_type!(Vec<i8>, [DataType::Int8Array], Value::Int8Array, [Value::Int8Array]);
impl_metric_value_type!(Vec<i16>, [DataType::Int16Array], Value::Int16Array, [Value::Int16Array]);
impl_metric_value_type!(Vec<i32>, [DataType::Int32Array], Value::Int32Array, [Value::Int32Array]);
impl_metric_value_type!(Vec<i64>, [DataType::Int64Array], Value::Int64Array, [Value::Int64Array]);
impl_metric_value_type!(
    Vec<u8>,
    [DataType::Bytes, DataType::UInt8Array, DataType::File],
    Value::Bytes,
    [Value::Bytes, Value::UInt8Array, Value::File]
);
impl_metric_value_type!(Vec<u16>, [DataType::UInt16Array], Value::UInt16Array, [Value::UInt16Array]);
impl_metric_value_type!(Vec<u32>, [DataType::UInt32Array], Value::UInt32Array, [Value::UInt32Array]);
impl_metric_value_type!(Vec<u64>, [DataType::UInt64Array], Value::UInt64Array, [Value::UInt64Array]);
impl_metric_value_type!(Vec<f32>, [DataType::FloatArray], Value::FloatArray, [Value::FloatArray]);
impl_metric_value_type!(Vec<f64>, [DataType::DoubleArray], Value::DoubleArray, [Value::DoubleArray]);
impl_metric_value_type!(Vec<String>, [DataType::StringArray], Value::StringArray, [Value::StringArray]);
impl_metric_value_type!(
    Vec<DateTime>,
    [DataType::DateTimeArray],
    Value::DateTimeArray,
    [Value::DateTimeArray]
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}
