use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use log::trace;
use spbnode_types::{codec, traits, DataType, MetricId, Value};

use crate::{
    error::{DispatchError, RegistrationError},
    observer::{DynNodeObserver, LogObserver},
};

/// A command handler registered for a single metric name
pub trait Handler<C>: Send + Sync {
    fn accepts(&self, datatype: DataType) -> bool;

    fn expected_datatype(&self) -> DataType;

    /// Invoke the handler. Returns the value back if it could not be converted.
    fn call(&self, ctx: &C, datatype: DataType, value: Option<Value>) -> Result<(), Value>;
}

struct TypedHandler<T, F> {
    f: F,
    _value: PhantomData<fn(T)>,
}

impl<C, T, F> Handler<C> for TypedHandler<T, F>
where
    T: traits::MetricValue + 'static,
    F: Fn(&C, Option<T>) + Send + Sync,
{
    fn accepts(&self, datatype: DataType) -> bool {
        T::supports_datatype(datatype)
    }

    fn expected_datatype(&self) -> DataType {
        T::default_datatype()
    }

    fn call(&self, ctx: &C, _datatype: DataType, value: Option<Value>) -> Result<(), Value> {
        let value = match value {
            Some(value) => {
                let fallback = value.clone();
                Some(T::try_from(value).map_err(|_| fallback)?)
            }
            None => None,
        };
        (self.f)(ctx, value);
        Ok(())
    }
}

struct RawHandler<F> {
    datatype: DataType,
    f: F,
}

impl<C, F> Handler<C> for RawHandler<F>
where
    F: Fn(&C, DataType, Option<Value>) + Send + Sync,
{
    fn accepts(&self, datatype: DataType) -> bool {
        self.datatype == datatype
    }

    fn expected_datatype(&self) -> DataType {
        self.datatype
    }

    fn call(&self, ctx: &C, datatype: DataType, value: Option<Value>) -> Result<(), Value> {
        (self.f)(ctx, datatype, value);
        Ok(())
    }
}

/// Outcome of dispatching a single command payload
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub handled: usize,
    pub unknown: usize,
    pub mismatched: usize,
}

/// Routes NCMD metrics to handlers registered by metric name.
///
/// Metrics carrying only an alias are resolved through the alias map announced in the
/// node's birth certificate.
pub struct CommandDispatcher<C> {
    handlers: HashMap<String, Box<dyn Handler<C>>>,
    aliases: HashMap<u64, String>,
    observer: Arc<DynNodeObserver>,
}

impl<C> CommandDispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            aliases: HashMap::new(),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_aliases(mut self, aliases: HashMap<u64, String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_observer(mut self, observer: Arc<DynNodeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn insert(
        &mut self,
        name: String,
        handler: Box<dyn Handler<C>>,
    ) -> Result<(), RegistrationError> {
        if name.is_empty() {
            return Err(RegistrationError::InvalidName(name));
        }
        if self.handlers.contains_key(&name) {
            return Err(RegistrationError::Duplicate(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Register a handler receiving the metric value converted to `T`
    pub fn register<S, T, F>(&mut self, name: S, f: F) -> Result<(), RegistrationError>
    where
        S: Into<String>,
        T: traits::MetricValue + 'static,
        F: Fn(&C, Option<T>) + Send + Sync + 'static,
        C: 'static,
    {
        self.insert(
            name.into(),
            Box::new(TypedHandler {
                f,
                _value: PhantomData,
            }),
        )
    }

    /// Register a handler receiving the raw value. Only metrics of exactly `datatype` are accepted.
    pub fn register_raw<S, F>(
        &mut self,
        name: S,
        datatype: DataType,
        f: F,
    ) -> Result<(), RegistrationError>
    where
        S: Into<String>,
        F: Fn(&C, DataType, Option<Value>) + Send + Sync + 'static,
        C: 'static,
    {
        self.insert(name.into(), Box::new(RawHandler { datatype, f }))
    }

    fn mismatch(
        &self,
        report: &mut DispatchReport,
        metric: String,
        expected: DataType,
        actual: DataType,
    ) {
        report.mismatched += 1;
        self.observer.on_dispatch_error(&DispatchError::TypeMismatch {
            metric,
            expected,
            actual,
        });
    }

    /// Decode an NCMD payload and invoke the handler of every metric it carries
    pub fn dispatch(&self, payload: &[u8], ctx: &C) -> Result<DispatchReport, DispatchError> {
        let payload = match codec::decode(payload) {
            Ok(payload) => payload,
            Err(e) => {
                let e = DispatchError::Decode(e);
                self.observer.on_dispatch_error(&e);
                return Err(e);
            }
        };

        let mut report = DispatchReport::default();
        for metric in payload.metrics {
            let name = match (&metric.name, metric.alias) {
                (Some(name), _) => Some(name.clone()),
                (None, Some(alias)) => self.aliases.get(&alias).cloned(),
                (None, None) => None,
            };
            let handler = name
                .as_ref()
                .and_then(|name| self.handlers.get(name).map(|h| (name.clone(), h)));
            let Some((name, handler)) = handler else {
                report.unknown += 1;
                if let Some(id) = metric.id() {
                    self.observer.on_unknown_metric(&id);
                }
                continue;
            };

            if !handler.accepts(metric.datatype) {
                self.mismatch(&mut report, name, handler.expected_datatype(), metric.datatype);
                continue;
            }
            trace!("Dispatching command for {name}");
            match handler.call(ctx, metric.datatype, metric.value) {
                Ok(()) => report.handled += 1,
                Err(value) => {
                    self.mismatch(&mut report, name, handler.expected_datatype(), value.datatype())
                }
            }
        }
        Ok(report)
    }
}

impl<C> Default for CommandDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}
