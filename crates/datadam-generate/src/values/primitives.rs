use rand::{Rng, RngCore};

use datadam_core::{Column, Result, Value};

use super::{ValueGenerator, ValueRegistry};

pub fn register(registry: &mut ValueRegistry) {
    registry.register_generator(Box::new(IntGenerator));
    registry.register_generator(Box::new(BigIntGenerator));
    registry.register_generator(Box::new(BoolGenerator));
    registry.register_generator(Box::new(DoubleGenerator));
    registry.register_generator(Box::new(DecimalGenerator));
}

/// Exponentially distributed float with rate 1.
pub(crate) fn exp_float(rng: &mut dyn RngCore) -> f64 {
    let uniform: f64 = rng.random();
    -(1.0 - uniform).ln()
}

struct IntGenerator;

impl ValueGenerator for IntGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["int", "integer"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Int(rng.random_range(0..=i64::from(i32::MAX))))
    }
}

struct BigIntGenerator;

impl ValueGenerator for BigIntGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["bigint"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Int(rng.random_range(0..=i64::MAX)))
    }
}

struct BoolGenerator;

impl ValueGenerator for BoolGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["boolean", "bool"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Bool(rng.random_bool(0.5)))
    }
}

struct DoubleGenerator;

impl ValueGenerator for DoubleGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["double"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Float(exp_float(rng)))
    }
}

struct DecimalGenerator;

impl ValueGenerator for DecimalGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["decimal"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Text(format!("{:.5}", exp_float(rng))))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn int_values_fit_in_31_bits() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "n", "int(11) unsigned");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..500 {
            let value = registry.generate(&column, &mut rng).unwrap();
            let value = value.as_i64().unwrap();
            assert!((0..=i64::from(i32::MAX)).contains(&value));
        }
    }

    #[test]
    fn booleans_render_as_sql_keywords() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "flag", "boolean");
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..64 {
            seen.insert(registry.generate(&column, &mut rng).unwrap().to_sql_literal());
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec!["FALSE", "TRUE"]);
    }

    #[test]
    fn decimals_carry_five_fraction_digits() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "price", "decimal(10,2)");
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let value = registry.generate(&column, &mut rng).unwrap();
            let text = value.as_str().unwrap().to_string();
            let (whole, fraction) = text.split_once('.').unwrap();
            assert!(whole.parse::<u64>().is_ok());
            assert_eq!(fraction.len(), 5);
        }
    }

    #[test]
    fn doubles_are_non_negative() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "score", "double");
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..200 {
            match registry.generate(&column, &mut rng).unwrap() {
                Value::Float(value) => assert!(value.is_finite() && value >= 0.0),
                other => panic!("unexpected value {other:?}"),
            }
        }
    }
}
