//! Per-metric request state, keyed by metric name.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum MetricState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> MetricState<T> {
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => MetricState::Ready(value),
            Err(err) => MetricState::Failed(err.to_string()),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            MetricState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            MetricState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricBoard<T> {
    states: BTreeMap<String, MetricState<T>>,
}

impl<T> Default for MetricBoard<T> {
    fn default() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }
}

impl<T> MetricBoard<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as in flight, discarding any earlier result.
    pub fn request(&mut self, name: impl Into<String>) {
        self.states.insert(name.into(), MetricState::Loading);
    }

    pub fn resolve<E: Display>(&mut self, name: impl Into<String>, result: Result<T, E>) {
        let name = name.into();
        if let Err(err) = &result {
            tracing::warn!(metric = %name, error = %err, "metric request failed");
        }
        self.states.insert(name, MetricState::from_result(result));
    }

    pub fn get(&self, name: &str) -> Option<&MetricState<T>> {
        self.states.get(name)
    }

    pub fn ready(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(MetricState::ready)
    }

    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.states
            .iter()
            .filter_map(|(name, state)| state.error().map(|message| (name.as_str(), message)))
            .collect()
    }
}
