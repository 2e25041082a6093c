use std::collections::HashMap;

use crate::error::{GeneratorError, Result};
use crate::generator::{Generator, LuminanceGenerator};

type GeneratorFactory = Box<dyn Fn() -> Box<dyn Generator> + Send + Sync>;

/// Registry of available output generators, keyed by name
pub struct GeneratorRegistry {
    generators: HashMap<String, GeneratorFactory>,
}

impl GeneratorRegistry {
    /// Create a registry holding the built-in generators
    pub fn new() -> Self {
        let mut registry = Self {
            generators: HashMap::new(),
        };
        registry.register("luminance", || Box::new(LuminanceGenerator::new()));
        registry
    }

    /// Register a generator factory, replacing any previous one of that name
    pub fn register<S, F>(&mut self, name: S, factory: F)
    where
        S: Into<String>,
        F: Fn() -> Box<dyn Generator> + Send + Sync + 'static,
    {
        self.generators.insert(name.into(), Box::new(factory));
    }

    /// New instance of the named generator
    pub fn get_generator(&self, name: &str) -> Option<Box<dyn Generator>> {
        self.generators.get(name).map(|factory| factory())
    }

    /// Like [`get_generator`](Self::get_generator), failing with `NotFound`
    pub fn create(&self, name: &str) -> Result<Box<dyn Generator>> {
        self.get_generator(name).ok_or_else(|| {
            GeneratorError::NotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Registered names, sorted
    pub fn available_generators(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_generator(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
