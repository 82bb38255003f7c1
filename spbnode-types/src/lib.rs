//! Sparkplug B data model and payload codec for edge nodes.

pub mod constants;

mod generated {
    pub(crate) mod sparkplug_payload;
}

/// generated types
pub mod payload;

pub mod codec;
pub mod topic;
pub mod traits;
pub mod utils;

mod dataset;
mod metric;
mod template;
mod value;

pub use codec::{CodecError, DecodeError};
pub use dataset::*;
pub use metric::*;
pub use payload::DataType;
pub use template::*;
pub use value::*;
