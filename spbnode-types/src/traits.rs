use crate::{payload::DataType, value};

/// Trait used to query the Sparkplug datatype(s) that an implementing type supports
pub trait HasDataType {
    /// Get all the Sparkplug [DataType]'s the type supports
    fn supported_datatypes() -> &'static [DataType];

    /// Default [DataType] the type maps to
    fn default_datatype() -> DataType {
        let supported = Self::supported_datatypes();
        if supported.is_empty() {
            panic!("supported_datatypes result has to contain at least one element")
        }
        supported[0]
    }

    fn supports_datatype(datatype: DataType) -> bool {
        Self::supported_datatypes().contains(&datatype)
    }
}

/// Trait used to represent that a type can be carried as a metric [value::Value]
pub trait MetricValue: TryFrom<value::Value> + Into<value::Value> + HasDataType {}
