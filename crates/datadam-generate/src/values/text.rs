use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};

use datadam_core::{Column, Error, Result, Value};

use super::{ValueGenerator, ValueRegistry};

const BLOB_LEN: usize = 20;
const TEXT_LEN: usize = 20;

pub fn register(registry: &mut ValueRegistry) {
    registry.register_generator(Box::new(CharGenerator));
    registry.register_generator(Box::new(VarcharGenerator));
    registry.register_generator(Box::new(BlobGenerator));
    registry.register_generator(Box::new(TextGenerator));
    registry.register_generator(Box::new(EnumGenerator));
    registry.register_generator(Box::new(SetGenerator));
}

fn alphanumeric(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Half ASCII, half code points below the surrogate range.
fn mixed_unicode(rng: &mut dyn RngCore, len: usize) -> String {
    (0..len)
        .filter_map(|_| {
            let code = if rng.random_bool(0.5) {
                rng.random_range(0..0x80)
            } else {
                rng.random_range(0..0xd800)
            };
            char::from_u32(code)
        })
        .collect()
}

struct CharGenerator;

impl ValueGenerator for CharGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["char"]
    }

    fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let len = column.length().unwrap_or(1);
        Ok(Value::Text(alphanumeric(rng, len)))
    }
}

struct VarcharGenerator;

impl ValueGenerator for VarcharGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["varchar"]
    }

    fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let max = column.length().ok_or_else(|| {
            Error::Generation(format!("varchar column `{}` has no length", column.name))
        })?;
        if max == 0 {
            return Ok(Value::Text(String::new()));
        }
        let len = rng.random_range(1..=max);
        Ok(Value::Text(alphanumeric(rng, len)))
    }
}

struct BlobGenerator;

impl ValueGenerator for BlobGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["blob"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let mut bytes = vec![0_u8; BLOB_LEN];
        rng.fill_bytes(&mut bytes);
        Ok(Value::Bytes(bytes))
    }
}

struct TextGenerator;

impl ValueGenerator for TextGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        Ok(Value::Text(mixed_unicode(rng, TEXT_LEN)))
    }
}

struct EnumGenerator;

impl ValueGenerator for EnumGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["enum"]
    }

    fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let candidates = column.candidates();
        let value = candidates.choose(rng).ok_or_else(|| {
            Error::Generation(format!("enum column `{}` declares no values", column.name))
        })?;
        Ok(Value::Text(value.clone()))
    }
}

struct SetGenerator;

impl ValueGenerator for SetGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["set"]
    }

    fn generate(&self, column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let chosen: Vec<String> = column
            .candidates()
            .into_iter()
            .filter(|_| rng.random_bool(0.5))
            .collect();
        Ok(Value::Text(chosen.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn varchar_values_are_alphanumeric_and_within_length() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "name", "VARCHAR(10)");
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut lengths = BTreeSet::new();
        for _ in 0..1000 {
            let value = registry.generate(&column, &mut rng).unwrap();
            let text = value.as_str().unwrap();
            assert!((1..=10).contains(&text.len()), "bad length {}", text.len());
            assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
            lengths.insert(text.len());
        }
        assert_eq!(lengths.len(), 10);
    }

    #[test]
    fn char_values_have_exact_length() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "code", "char(8)");
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        for _ in 0..100 {
            let value = registry.generate(&column, &mut rng).unwrap();
            assert_eq!(value.as_str().unwrap().len(), 8);
        }
    }

    #[test]
    fn blobs_render_as_twenty_byte_hex_literals() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "payload", "blob");
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let literal = registry.generate(&column, &mut rng).unwrap().to_sql_literal();
        assert!(literal.starts_with("x'") && literal.ends_with('\''));
        assert_eq!(literal.len(), 3 + 2 * BLOB_LEN);
    }

    #[test]
    fn text_has_twenty_code_points_and_escapes_cleanly() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "note", "text");
        let mut rng = ChaCha8Rng::seed_from_u64(24);
        for _ in 0..200 {
            let value = registry.generate(&column, &mut rng).unwrap();
            assert_eq!(value.as_str().unwrap().chars().count(), TEXT_LEN);
            let literal = value.to_sql_literal();
            let inner = &literal[1..literal.len() - 1];
            assert!(!inner.replace("''", "").contains('\''));
        }
    }

    #[test]
    fn enum_picks_declared_values_only() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "state", "enum('new','active','closed')");
        let mut rng = ChaCha8Rng::seed_from_u64(25);
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            seen.insert(registry.generate(&column, &mut rng).unwrap().to_string());
        }
        let expected: BTreeSet<String> =
            ["active", "closed", "new"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn set_values_are_subsets_including_empty() {
        let registry = ValueRegistry::new();
        let column = Column::new(0, "tags", "set('a','b')");
        let mut rng = ChaCha8Rng::seed_from_u64(26);
        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            seen.insert(registry.generate(&column, &mut rng).unwrap().to_string());
        }
        let expected: BTreeSet<String> =
            ["", "a", "a,b", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
    }
}
