//! Type-directed random values for table columns.

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;

use datadam_core::{Column, Error, Result, Value};

mod primitives;
mod temporal;
mod text;

/// Produces random values for one family of declared column types.
pub trait ValueGenerator: Send + Sync {
    /// Lower-case base type names this generator handles.
    fn types(&self) -> &'static [&'static str];

    fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value>;
}

/// Maps declared column types to their value generators.
pub struct ValueRegistry {
    generators: HashMap<&'static str, Arc<dyn ValueGenerator>>,
}

impl Default for ValueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            generators: HashMap::new(),
        };
        primitives::register(&mut registry);
        temporal::register(&mut registry);
        text::register(&mut registry);
        registry
    }

    pub fn register_generator(&mut self, generator: Box<dyn ValueGenerator>) {
        let generator: Arc<dyn ValueGenerator> = generator.into();
        for name in generator.types() {
            self.generators.insert(*name, Arc::clone(&generator));
        }
    }

    /// Whether values can be produced for the column's declared type.
    pub fn supports(&self, column: &Column) -> bool {
        self.generators.contains_key(column.data_type.as_str())
    }

    /// Random value for `column`, or [`Error::UnsupportedType`] when no
    /// generator handles its declared type.
    pub fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let generator = self
            .generators
            .get(column.data_type.as_str())
            .ok_or_else(|| {
                Error::UnsupportedType(format!("{} of column `{}`", column.data_type, column.name))
            })?;
        generator.generate(column, rng)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn unknown_types_are_reported_not_defaulted() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "shape", "geometry");
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert!(!registry.supports(&column));
        assert!(matches!(
            registry.generate(&column, &mut rng),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn type_lookup_ignores_declared_case() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "n", "BIGINT UNSIGNED");
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let value = registry.generate(&column, &mut rng).unwrap();
        assert!(value.as_i64().is_some_and(|v| v >= 0));
    }
}
