use thiserror::Error;

use crate::{payload::DataType, Metric, Value};

#[derive(Debug, Error, PartialEq, Clone)]
pub enum TemplateError {
    #[error("Parameter datatype {0:?} is not supported")]
    UnsupportedParameterType(DataType),
    #[error("Parameter {name} value does not match datatype {datatype:?}")]
    ParameterTypeMismatch { name: String, datatype: DataType },
}

/// A typed template parameter. Only scalar datatypes are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    datatype: DataType,
    value: Option<Value>,
}

impl Parameter {
    pub fn new<S: Into<String>>(
        name: S,
        datatype: DataType,
        value: Option<Value>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        if !datatype.is_scalar() {
            return Err(TemplateError::UnsupportedParameterType(datatype));
        }
        if let Some(v) = &value {
            if v.datatype() != datatype {
                return Err(TemplateError::ParameterTypeMismatch { name, datatype });
            }
        }
        Ok(Self {
            name,
            datatype,
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub(crate) fn into_parts(self) -> (String, DataType, Option<Value>) {
        (self.name, self.datatype, self.value)
    }
}

/// A Sparkplug template, either a definition or an instance referencing one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub version: Option<String>,
    pub template_ref: Option<String>,
    pub is_definition: bool,
    pub metrics: Vec<Metric>,
    pub parameters: Vec<Parameter>,
}

impl Template {
    pub fn definition(metrics: Vec<Metric>) -> Self {
        Self {
            is_definition: true,
            metrics,
            ..Default::default()
        }
    }

    pub fn instance<S: Into<String>>(template_ref: S, metrics: Vec<Metric>) -> Self {
        Self {
            template_ref: Some(template_ref.into()),
            metrics,
            ..Default::default()
        }
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}
