use std::collections::HashMap;

use log::warn;
use spbnode_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    traits, DataType, Metric, Value,
};
use thiserror::Error;

use crate::publisher::{Report, Sample};

#[derive(Error, Debug, PartialEq)]
pub enum BirthMetricError {
    #[error("Duplicate metric {0}")]
    DuplicateMetric(String),
    #[error("Metric name {0} is reserved by the node")]
    ReservedName(String),
    #[error("Metric name must not be empty")]
    EmptyName,
    #[error("The provided type does not support that datatype")]
    MetricValueDatatypeMismatch,
}

/// Details about a metric to be included in the node's birth certificate
#[derive(Debug, Clone, PartialEq)]
pub struct BirthMetric {
    name: String,
    datatype: DataType,
    initial_value: Option<Value>,
    report: Report,
    use_alias: bool,
    is_transient: bool,
}

impl BirthMetric {
    fn new(name: String, datatype: DataType, initial_value: Option<Value>) -> Self {
        Self {
            name,
            datatype,
            initial_value,
            report: Report::Periodic,
            use_alias: true,
            is_transient: false,
        }
    }

    pub fn new_with_initial_value<S: Into<String>, T: traits::MetricValue>(
        name: S,
        initial_value: T,
    ) -> Self {
        Self::new(name.into(), T::default_datatype(), Some(initial_value.into()))
    }

    pub fn new_with_initial_value_explicit_type<S: Into<String>, T: traits::MetricValue>(
        name: S,
        initial_value: T,
        datatype: DataType,
    ) -> Result<Self, BirthMetricError> {
        if !T::supports_datatype(datatype) {
            return Err(BirthMetricError::MetricValueDatatypeMismatch);
        }
        let value = initial_value
            .into()
            .retag(datatype)
            .map_err(|_| BirthMetricError::MetricValueDatatypeMismatch)?;
        Ok(Self::new(name.into(), datatype, Some(value)))
    }

    /// A metric that is born null
    pub fn new_without_initial_value<S: Into<String>>(name: S, datatype: DataType) -> Self {
        Self::new(name.into(), datatype, None)
    }

    pub fn with_report(mut self, report: Report) -> Self {
        self.report = report;
        self
    }

    pub fn use_alias(mut self, use_alias: bool) -> Self {
        self.use_alias = use_alias;
        self
    }

    pub fn transient(mut self) -> Self {
        self.is_transient = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct NodeMetric {
    name: String,
    alias: Option<u64>,
    datatype: DataType,
    report: Report,
    is_transient: bool,
    current: Option<Value>,
    published: Option<Value>,
    birth_value: Option<Value>,
}

/// A value included in an NDATA that is not yet known to have reached the transport
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reported {
    index: usize,
    value: Option<Value>,
}

/// The node's birth metrics and the values last sent for each of them
pub(crate) struct MetricTable {
    metrics: Vec<NodeMetric>,
    index: HashMap<String, usize>,
    aliases: HashMap<u64, String>,
}

impl MetricTable {
    pub(crate) fn new(birth_metrics: Vec<BirthMetric>) -> Result<Self, BirthMetricError> {
        let mut metrics = Vec::with_capacity(birth_metrics.len());
        let mut index = HashMap::new();
        let mut aliases = HashMap::new();
        let mut next_alias = 1;

        for details in birth_metrics {
            if details.name.is_empty() {
                return Err(BirthMetricError::EmptyName);
            }
            if details.name == BDSEQ || details.name == NODE_CONTROL_REBIRTH {
                return Err(BirthMetricError::ReservedName(details.name));
            }
            if index.contains_key(&details.name) {
                return Err(BirthMetricError::DuplicateMetric(details.name));
            }
            let alias = match details.use_alias {
                true => {
                    let alias = next_alias;
                    next_alias += 1;
                    aliases.insert(alias, details.name.clone());
                    Some(alias)
                }
                false => None,
            };
            index.insert(details.name.clone(), metrics.len());
            metrics.push(NodeMetric {
                name: details.name,
                alias,
                datatype: details.datatype,
                report: details.report,
                is_transient: details.is_transient,
                published: details.initial_value.clone(),
                birth_value: details.initial_value.clone(),
                current: details.initial_value,
            });
        }

        Ok(Self {
            metrics,
            index,
            aliases,
        })
    }

    pub(crate) fn aliases(&self) -> &HashMap<u64, String> {
        &self.aliases
    }

    /// Metrics for a birth certificate, carrying the latest known values.
    /// Change tracking restarts from these values.
    pub(crate) fn birth_metrics(&mut self, bdseq: u64, timestamp: u64) -> Vec<Metric> {
        let mut out = Vec::with_capacity(self.metrics.len() + 2);
        out.push(Metric::new(BDSEQ, bdseq as i64).with_timestamp(timestamp));
        out.push(Metric::new(NODE_CONTROL_REBIRTH, false).with_timestamp(timestamp));
        for metric in self.metrics.iter_mut() {
            metric.published = metric.current.clone();
            metric.birth_value = metric.current.clone();
            out.push(Metric {
                name: Some(metric.name.clone()),
                alias: metric.alias,
                datatype: metric.datatype,
                value: metric.current.clone(),
                timestamp: Some(timestamp),
                is_historical: false,
                is_transient: metric.is_transient,
            });
        }
        out
    }

    /// A retained birth was republished, the host now holds the birth values again
    pub(crate) fn restore_birth(&mut self) {
        for metric in self.metrics.iter_mut() {
            metric.published = metric.birth_value.clone();
        }
    }

    /// Values of an NDATA the transport accepted. Change tracking compares against them.
    pub(crate) fn mark_published(&mut self, reported: Vec<Reported>) {
        for Reported { index, value } in reported {
            if let Some(metric) = self.metrics.get_mut(index) {
                metric.published = value;
            }
        }
    }

    /// Record the samples and return the metrics that are due for reporting.
    ///
    /// With `force` every recorded sample is reported regardless of its report policy.
    /// Reported values only count as published once passed to [MetricTable::mark_published].
    pub(crate) fn data_metrics(
        &mut self,
        samples: Vec<Sample>,
        timestamp: u64,
        force: bool,
    ) -> (Vec<Metric>, Vec<Reported>) {
        let mut out: Vec<Metric> = Vec::new();
        let mut reported = Vec::new();
        let mut positions: HashMap<usize, usize> = HashMap::new();

        for sample in samples {
            let Some(&i) = self.index.get(&sample.name) else {
                warn!("Sample for unknown metric {} - ignoring", sample.name);
                continue;
            };
            let metric = &mut self.metrics[i];
            let value = match sample.value {
                Some(value) => match value.retag(metric.datatype) {
                    Ok(value) => Some(value),
                    Err(value) => {
                        warn!(
                            "Sample for {} has datatype {:?}, expected {:?} - ignoring",
                            metric.name,
                            value.datatype(),
                            metric.datatype
                        );
                        continue;
                    }
                },
                None => None,
            };
            metric.current = value;

            let due = force
                || match metric.report {
                    Report::Periodic => true,
                    Report::OnChange => metric.published != metric.current,
                    Report::Never => false,
                };
            if !due {
                continue;
            }
            reported.push(Reported {
                index: i,
                value: metric.current.clone(),
            });

            let data = Metric {
                name: match metric.alias {
                    Some(_) => None,
                    None => Some(metric.name.clone()),
                },
                alias: metric.alias,
                datatype: metric.datatype,
                value: metric.current.clone(),
                timestamp: Some(timestamp),
                is_historical: false,
                is_transient: metric.is_transient,
            };
            match positions.get(&i) {
                Some(&pos) => out[pos] = data,
                None => {
                    positions.insert(i, out.len());
                    out.push(data);
                }
            }
        }
        (out, reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MetricTable {
        MetricTable::new(vec![
            BirthMetric::new_with_initial_value("Temperature", 20.0_f64),
            BirthMetric::new_with_initial_value("Mode", "auto".to_string())
                .with_report(Report::OnChange),
            BirthMetric::new_with_initial_value("Serial", 42_u32).with_report(Report::Never),
            BirthMetric::new_without_initial_value("Fault", DataType::String).use_alias(false),
        ])
        .unwrap()
    }

    #[test]
    fn aliases_assigned_in_order() {
        let t = table();
        assert_eq!(t.aliases().get(&1).map(String::as_str), Some("Temperature"));
        assert_eq!(t.aliases().get(&3).map(String::as_str), Some("Serial"));
        assert_eq!(t.aliases().len(), 3);
    }

    #[test]
    fn birth_contains_node_metrics_first() {
        let mut t = table();
        let birth = t.birth_metrics(3, 100);
        assert_eq!(birth[0], Metric::new(BDSEQ, 3_i64).with_timestamp(100));
        assert_eq!(birth[1].name.as_deref(), Some(NODE_CONTROL_REBIRTH));
        assert_eq!(birth[1].alias, None);
        assert_eq!(birth[2].alias, Some(1));
        assert_eq!(birth[5].value, None);
        assert_eq!(birth.len(), 6);
    }

    #[test]
    fn report_policies() {
        let mut t = table();
        t.birth_metrics(0, 0);
        let samples = || {
            vec![
                Sample::new("Temperature", 21.0_f64),
                Sample::new("Mode", "auto"),
                Sample::new("Serial", 43_u32),
            ]
        };
        let (data, reported) = t.data_metrics(samples(), 1, false);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].alias, Some(1));
        assert_eq!(data[0].name, None);
        t.mark_published(reported);

        let mut changed = samples();
        changed[1] = Sample::new("Mode", "manual");
        let (data, reported) = t.data_metrics(changed.clone(), 2, false);
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].value, Some(Value::String("manual".into())));
        t.mark_published(reported);

        let (data, _) = t.data_metrics(changed, 3, false);
        assert_eq!(data.len(), 1);

        let (data, _) = t.data_metrics(samples(), 4, true);
        assert_eq!(data.len(), 3);
    }

    #[test]
    fn unpublished_change_is_reported_again() {
        let mut t = table();
        t.birth_metrics(0, 0);
        let (data, _) = t.data_metrics(vec![Sample::new("Mode", "manual")], 1, false);
        assert_eq!(data.len(), 1);
        // the transport rejected that NDATA, nothing was marked published
        let (data, reported) = t.data_metrics(vec![Sample::new("Mode", "manual")], 2, false);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].value, Some(Value::String("manual".into())));
        t.mark_published(reported);
        let (data, _) = t.data_metrics(vec![Sample::new("Mode", "manual")], 3, false);
        assert!(data.is_empty());
    }

    #[test]
    fn rejects_mismatched_and_unknown_samples() {
        let mut t = table();
        let (data, _) = t.data_metrics(
            vec![
                Sample::new("Temperature", 1_i32),
                Sample::new("Nope", 1_i32),
                Sample::null("Fault"),
            ],
            1,
            false,
        );
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].name.as_deref(), Some("Fault"));
        assert_eq!(data[0].value, None);
    }

    #[test]
    fn invalid_definitions() {
        assert_eq!(
            MetricTable::new(vec![BirthMetric::new_with_initial_value(BDSEQ, 1_i64)]).err(),
            Some(BirthMetricError::ReservedName(BDSEQ.into()))
        );
        assert_eq!(
            MetricTable::new(vec![
                BirthMetric::new_with_initial_value("a", 1_i64),
                BirthMetric::new_with_initial_value("a", 2_i64)
            ])
            .err(),
            Some(BirthMetricError::DuplicateMetric("a".into()))
        );
        assert_eq!(
            BirthMetric::new_with_initial_value_explicit_type("a", 1_i64, DataType::Int32),
            Err(BirthMetricError::MetricValueDatatypeMismatch)
        );
        assert!(
            BirthMetric::new_with_initial_value_explicit_type("a", "x".to_string(), DataType::Text)
                .is_ok()
        );
    }

    #[test]
    fn restore_birth_resets_change_tracking() {
        let mut t = table();
        t.birth_metrics(0, 0);
        let (data, reported) = t.data_metrics(vec![Sample::new("Mode", "manual")], 1, false);
        assert_eq!(data.len(), 1);
        t.mark_published(reported);
        let (data, _) = t.data_metrics(vec![Sample::new("Mode", "manual")], 2, false);
        assert!(data.is_empty());
        t.restore_birth();
        let (data, _) = t.data_metrics(vec![Sample::new("Mode", "manual")], 3, false);
        assert_eq!(data.len(), 1);
    }
}
