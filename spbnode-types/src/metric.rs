use crate::{payload::DataType, Value};

/// Represents a unique identifier of a metric
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MetricId {
    Name(String),
    Alias(u64),
}

/// A named, typed datum carried in a Sparkplug payload.
///
/// At least one of `name` and `alias` identifies the metric. `value == None`
/// means the metric is reported as null.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: Option<String>,
    pub alias: Option<u64>,
    pub datatype: DataType,
    pub value: Option<Value>,
    pub timestamp: Option<u64>,
    pub is_historical: bool,
    pub is_transient: bool,
}

impl Metric {
    /// Create a metric whose datatype is taken from the value
    pub fn new<S: Into<String>, V: Into<Value>>(name: S, value: V) -> Self {
        let value = value.into();
        Self {
            name: Some(name.into()),
            alias: None,
            datatype: value.datatype(),
            value: Some(value),
            timestamp: None,
            is_historical: false,
            is_transient: false,
        }
    }

    /// Create a null metric of the given datatype
    pub fn null<S: Into<String>>(name: S, datatype: DataType) -> Self {
        Self {
            name: Some(name.into()),
            alias: None,
            datatype,
            value: None,
            timestamp: None,
            is_historical: false,
            is_transient: false,
        }
    }

    /// Create a metric identified only by an alias
    pub fn with_alias_only(alias: u64, datatype: DataType, value: Option<Value>) -> Self {
        Self {
            name: None,
            alias: Some(alias),
            datatype,
            value,
            timestamp: None,
            is_historical: false,
            is_transient: false,
        }
    }

    pub fn with_alias(mut self, alias: u64) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn historical(mut self) -> Self {
        self.is_historical = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.is_transient = true;
        self
    }

    /// Re-tag the metric as a compatible datatype, e.g. String as Text
    pub fn as_datatype(mut self, datatype: DataType) -> Result<Self, Self> {
        match self.value.take() {
            None => {
                self.datatype = datatype;
                Ok(self)
            }
            Some(value) => match value.retag(datatype) {
                Ok(value) => {
                    self.datatype = datatype;
                    self.value = Some(value);
                    Ok(self)
                }
                Err(value) => {
                    self.value = Some(value);
                    Err(self)
                }
            },
        }
    }

    pub fn id(&self) -> Option<MetricId> {
        match (&self.name, self.alias) {
            (Some(name), _) => Some(MetricId::Name(name.clone())),
            (None, Some(alias)) => Some(MetricId::Alias(alias)),
            (None, None) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// A decoded Sparkplug payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    pub timestamp: Option<u64>,
    pub seq: Option<u64>,
    pub metrics: Vec<Metric>,
}

impl Payload {
    pub fn new(timestamp: u64, seq: Option<u64>, metrics: Vec<Metric>) -> Self {
        Self {
            timestamp: Some(timestamp),
            seq,
            metrics,
        }
    }
}
