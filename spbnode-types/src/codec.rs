//! Conversion between the domain [Payload]/[Metric] types and the Sparkplug B
//! protobuf wire format.

use std::collections::HashSet;

use prost::Message;
use thiserror::Error;

use crate::payload::{self, metric, template::parameter, DataType};
use crate::template::{Parameter, TemplateError};
use crate::value::*;
use crate::{dataset::SchemaError, Metric, Payload, Template};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Malformed protobuf: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("Metric has neither a name nor an alias")]
    MissingIdentifier,
    #[error("Metric {0} has no datatype")]
    MissingDatatype(String),
    #[error("Unknown datatype {0}")]
    UnknownDatatype(u32),
    #[error("Datatype {0:?} is not supported")]
    UnsupportedDatatype(DataType),
    #[error("Metric {metric} value does not fit datatype {datatype:?}")]
    ValueMismatch { metric: String, datatype: DataType },
    #[error("Metric {0} has no value and is not marked null")]
    MissingValue(String),
    #[error("Invalid array bytes: {0}")]
    ArrayBytes(#[from] FromBytesError),
    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),
}

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("DataSet schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Duplicate metric name {0}")]
    DuplicateMetric(String),
    #[error("Metric {metric} value does not match declared datatype {datatype:?}")]
    DatatypeMismatch { metric: String, datatype: DataType },
    #[error("Metric has neither a name nor an alias")]
    Unidentified,
}

fn metric_label(name: &Option<String>, alias: Option<u64>) -> String {
    match (name, alias) {
        (Some(name), _) => name.clone(),
        (None, Some(alias)) => format!("alias {alias}"),
        (None, None) => String::from("<unidentified>"),
    }
}

/* Encoding */

fn value_to_proto(label: &str, value: Value) -> Result<metric::Value, CodecError> {
    let out = match value {
        Value::Uuid(s) => metric::Value::StringValue(s),
        Value::Bytes(b) | Value::File(b) | Value::UInt8Array(b) => metric::Value::BytesValue(b),
        Value::DataSet(ds) => metric::Value::DatasetValue(ds.into()),
        Value::Template(t) => metric::Value::TemplateValue(template_to_proto(t)?),
        Value::Int8Array(v) => metric::Value::BytesValue(i8_vec_to_proto(v)),
        Value::Int16Array(v) => metric::Value::BytesValue(i16_vec_to_proto(v)),
        Value::Int32Array(v) => metric::Value::BytesValue(i32_vec_to_proto(v)),
        Value::Int64Array(v) => metric::Value::BytesValue(i64_vec_to_proto(v)),
        Value::UInt16Array(v) => metric::Value::BytesValue(u16_vec_to_proto(v)),
        Value::UInt32Array(v) => metric::Value::BytesValue(u32_vec_to_proto(v)),
        Value::UInt64Array(v) => metric::Value::BytesValue(u64_vec_to_proto(v)),
        Value::FloatArray(v) => metric::Value::BytesValue(f32_vec_to_proto(v)),
        Value::DoubleArray(v) => metric::Value::BytesValue(f64_vec_to_proto(v)),
        Value::BooleanArray(v) => metric::Value::BytesValue(bool_vec_to_proto(v)),
        Value::StringArray(v) => metric::Value::BytesValue(string_vec_to_proto(v)),
        Value::DateTimeArray(v) => metric::Value::BytesValue(datetime_vec_to_proto(v)),
        scalar => scalar_to_metric_value(scalar).map_err(|v| CodecError::DatatypeMismatch {
            metric: label.to_string(),
            datatype: v.datatype(),
        })?,
    };
    Ok(out)
}

fn template_to_proto(template: Template) -> Result<payload::Template, CodecError> {
    let parameters = template
        .parameters
        .into_iter()
        .map(|p| {
            let (name, datatype, value) = p.into_parts();
            payload::template::Parameter {
                name: Some(name),
                r#type: Some(datatype as u32),
                // parameters are restricted to scalar values on construction
                value: value.and_then(|v| scalar_to_parameter_value(v).ok()),
            }
        })
        .collect();
    Ok(payload::Template {
        version: template.version,
        metrics: metrics_to_proto(template.metrics)?,
        parameters,
        template_ref: template.template_ref,
        is_definition: Some(template.is_definition),
    })
}

/// Convert a domain metric into its protobuf form
pub fn metric_to_proto(metric: Metric) -> Result<payload::Metric, CodecError> {
    if metric.name.is_none() && metric.alias.is_none() {
        return Err(CodecError::Unidentified);
    }
    let label = metric_label(&metric.name, metric.alias);

    let mut out = payload::Metric::new();
    if let Some(name) = metric.name {
        out.set_name(name);
    }
    if let Some(alias) = metric.alias {
        out.set_alias(alias);
    }
    if let Some(timestamp) = metric.timestamp {
        out.set_timestamp(timestamp);
    }
    out.set_datatype(metric.datatype);
    out.is_historical = metric.is_historical.then_some(true);
    out.is_transient = metric.is_transient.then_some(true);

    if let Some(value) = metric.value {
        if value.datatype() != metric.datatype {
            return Err(CodecError::DatatypeMismatch {
                metric: label,
                datatype: metric.datatype,
            });
        }
        out.set_value(value_to_proto(&label, value)?);
    }
    Ok(out)
}

fn metrics_to_proto(metrics: Vec<Metric>) -> Result<Vec<payload::Metric>, CodecError> {
    let mut names = HashSet::new();
    metrics
        .into_iter()
        .map(|m| {
            if let Some(name) = &m.name {
                if !names.insert(name.clone()) {
                    return Err(CodecError::DuplicateMetric(name.clone()));
                }
            }
            metric_to_proto(m)
        })
        .collect()
}

/// Convert a domain payload into its protobuf form
pub fn payload_to_proto(payload: Payload) -> Result<payload::Payload, CodecError> {
    Ok(payload::Payload {
        timestamp: payload.timestamp,
        metrics: metrics_to_proto(payload.metrics)?,
        seq: payload.seq,
        uuid: None,
        body: None,
    })
}

/// Encode a payload to Sparkplug B protobuf bytes.
///
/// Metrics are written in order. Encoding the same payload twice produces
/// identical bytes.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    Ok(payload_to_proto(payload.clone())?.encode_to_vec())
}

/// Encode a bare metric sequence (no timestamp or seq)
pub fn encode_metrics(metrics: &[Metric]) -> Result<Vec<u8>, CodecError> {
    encode(&Payload {
        timestamp: None,
        seq: None,
        metrics: metrics.to_vec(),
    })
}

/* Decoding */

fn value_from_proto(
    label: &str,
    datatype: DataType,
    value: metric::Value,
) -> Result<Value, CodecError> {
    let mismatch = || DecodeError::ValueMismatch {
        metric: label.to_string(),
        datatype,
    };
    let out = match (datatype, value) {
        (DataType::Unknown | DataType::PropertySet | DataType::PropertySetList, _) => {
            return Err(DecodeError::UnsupportedDatatype(datatype).into())
        }
        (_, metric::Value::ExtensionValue(_)) => return Err(mismatch().into()),
        (DataType::Uuid, metric::Value::StringValue(s)) => Value::Uuid(s),
        (DataType::Bytes, metric::Value::BytesValue(b)) => Value::Bytes(b),
        (DataType::File, metric::Value::BytesValue(b)) => Value::File(b),
        (DataType::UInt8Array, metric::Value::BytesValue(b)) => Value::UInt8Array(b),
        (DataType::DataSet, metric::Value::DatasetValue(ds)) => Value::DataSet(ds.try_into()?),
        (DataType::Template, metric::Value::TemplateValue(t)) => {
            Value::Template(template_from_proto(t)?)
        }
        (DataType::Int8Array, metric::Value::BytesValue(b)) => {
            Value::Int8Array(proto_to_i8_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::Int16Array, metric::Value::BytesValue(b)) => {
            Value::Int16Array(proto_to_i16_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::Int32Array, metric::Value::BytesValue(b)) => {
            Value::Int32Array(proto_to_i32_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::Int64Array, metric::Value::BytesValue(b)) => {
            Value::Int64Array(proto_to_i64_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::UInt16Array, metric::Value::BytesValue(b)) => {
            Value::UInt16Array(proto_to_u16_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::UInt32Array, metric::Value::BytesValue(b)) => {
            Value::UInt32Array(proto_to_u32_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::UInt64Array, metric::Value::BytesValue(b)) => {
            Value::UInt64Array(proto_to_u64_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::FloatArray, metric::Value::BytesValue(b)) => {
            Value::FloatArray(proto_to_f32_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::DoubleArray, metric::Value::BytesValue(b)) => {
            Value::DoubleArray(proto_to_f64_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::BooleanArray, metric::Value::BytesValue(b)) => {
            Value::BooleanArray(proto_to_bool_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::StringArray, metric::Value::BytesValue(b)) => {
            Value::StringArray(proto_to_string_vec(b).map_err(DecodeError::from)?)
        }
        (DataType::DateTimeArray, metric::Value::BytesValue(b)) => {
            Value::DateTimeArray(proto_to_datetime_vec(b).map_err(DecodeError::from)?)
        }
        (datatype, value) => metric_value_to_scalar(datatype, value).map_err(|_| mismatch())?,
    };
    Ok(out)
}

fn parameter_from_proto(parameter: payload::template::Parameter) -> Result<Parameter, DecodeError> {
    let name = parameter.name.unwrap_or_default();
    let code = parameter
        .r#type
        .ok_or_else(|| DecodeError::MissingDatatype(name.clone()))?;
    let datatype = DataType::try_from(code).map_err(|_| DecodeError::UnknownDatatype(code))?;
    let value = match parameter.value {
        None => None,
        Some(parameter::Value::ExtensionValue(_)) => {
            return Err(DecodeError::ValueMismatch {
                metric: name,
                datatype,
            })
        }
        Some(v) => Some(parameter_value_to_scalar(datatype, v).map_err(|_| {
            DecodeError::ValueMismatch {
                metric: name.clone(),
                datatype,
            }
        })?),
    };
    Ok(Parameter::new(name, datatype, value)?)
}

fn template_from_proto(template: payload::Template) -> Result<Template, CodecError> {
    let parameters = template
        .parameters
        .into_iter()
        .map(parameter_from_proto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Template {
        version: template.version,
        template_ref: template.template_ref,
        is_definition: template.is_definition.unwrap_or(false),
        metrics: metrics_from_proto(template.metrics)?,
        parameters,
    })
}

/// Convert a protobuf metric into the domain form, validating it
pub fn metric_from_proto(metric: payload::Metric) -> Result<Metric, CodecError> {
    if metric.name.is_none() && metric.alias.is_none() {
        return Err(DecodeError::MissingIdentifier.into());
    }
    let label = metric_label(&metric.name, metric.alias);
    let code = metric
        .datatype
        .ok_or_else(|| DecodeError::MissingDatatype(label.clone()))?;
    let datatype = DataType::try_from(code).map_err(|_| DecodeError::UnknownDatatype(code))?;

    let value = match (metric.is_null, metric.value) {
        (Some(true), _) => None,
        (_, Some(value)) => Some(value_from_proto(&label, datatype, value)?),
        (_, None) => return Err(DecodeError::MissingValue(label).into()),
    };

    Ok(Metric {
        name: metric.name,
        alias: metric.alias,
        datatype,
        value,
        timestamp: metric.timestamp,
        is_historical: metric.is_historical.unwrap_or(false),
        is_transient: metric.is_transient.unwrap_or(false),
    })
}

fn metrics_from_proto(metrics: Vec<payload::Metric>) -> Result<Vec<Metric>, CodecError> {
    let mut names = HashSet::new();
    metrics
        .into_iter()
        .map(|m| {
            let m = metric_from_proto(m)?;
            if let Some(name) = &m.name {
                if !names.insert(name.clone()) {
                    return Err(CodecError::DuplicateMetric(name.clone()));
                }
            }
            Ok(m)
        })
        .collect()
}

/// Convert a protobuf payload into the domain form, validating every metric
pub fn payload_from_proto(payload: payload::Payload) -> Result<Payload, CodecError> {
    Ok(Payload {
        timestamp: payload.timestamp,
        seq: payload.seq,
        metrics: metrics_from_proto(payload.metrics)?,
    })
}

/// Decode Sparkplug B protobuf bytes into a payload
pub fn decode(bytes: &[u8]) -> Result<Payload, CodecError> {
    let proto = payload::Payload::decode(bytes).map_err(DecodeError::from)?;
    payload_from_proto(proto)
}

/// Decode a payload and return only its metrics
pub fn decode_metrics(bytes: &[u8]) -> Result<Vec<Metric>, CodecError> {
    Ok(decode(bytes)?.metrics)
}
