use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{DestinationFactory, MusicSource};

pub struct Services {
    sources: BTreeMap<String, Arc<dyn MusicSource>>,
    destinations: BTreeMap<String, Arc<dyn DestinationFactory>>,
    default_destination: Option<String>,
}

impl Services {
    pub fn source(&self, id: &str) -> Option<&Arc<dyn MusicSource>> {
        self.sources.get(id)
    }

    /// Every registered source, in id order.
    pub fn sources(&self) -> Vec<Arc<dyn MusicSource>> {
        self.sources.values().cloned().collect()
    }

    /// Sources for the given ids; unknown ids are skipped.
    pub fn select_sources(&self, ids: &[String]) -> Vec<Arc<dyn MusicSource>> {
        ids.iter()
            .filter_map(|id| self.sources.get(id).cloned())
            .collect()
    }

    pub fn destination(&self, id: Option<&str>) -> Option<&Arc<dyn DestinationFactory>> {
        let key = id.or(self.default_destination.as_deref())?;
        self.destinations.get(key)
    }

    pub fn list_sources(&self) -> Vec<(&str, &str)> {
        self.sources.values().map(|s| (s.id(), s.name())).collect()
    }

    pub fn list_destinations(&self) -> Vec<(&str, &str)> {
        self.destinations
            .values()
            .map(|d| (d.id(), d.name()))
            .collect()
    }
}

pub struct ServicesBuilder {
    sources: BTreeMap<String, Arc<dyn MusicSource>>,
    destinations: BTreeMap<String, Arc<dyn DestinationFactory>>,
    default_destination: Option<String>,
}

impl ServicesBuilder {
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            destinations: BTreeMap::new(),
            default_destination: None,
        }
    }

    pub fn add_source(mut self, source: impl MusicSource + 'static) -> Self {
        self.sources
            .insert(source.id().to_string(), Arc::new(source));
        self
    }

    pub fn add_destination(mut self, factory: impl DestinationFactory + 'static) -> Self {
        let id = factory.id().to_string();
        if self.default_destination.is_none() {
            self.default_destination = Some(id.clone());
        }
        self.destinations.insert(id, Arc::new(factory));
        self
    }

    pub fn default_destination(mut self, id: &str) -> Self {
        self.default_destination = Some(id.to_string());
        self
    }

    pub fn build(self) -> Result<Services, &'static str> {
        if self.sources.is_empty() {
            return Err("at least one music source required");
        }

        Ok(Services {
            sources: self.sources,
            destinations: self.destinations,
            default_destination: self.default_destination,
        })
    }
}

impl Default for ServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}
