use chrono::{DateTime, Datelike, Utc};
use rand::{Rng, RngCore};

use datadam_core::{Column, Error, Result, Value};

use super::{ValueGenerator, ValueRegistry};

/// 1970-01-01T00:00:00Z
const MIN_TIMESTAMP: i64 = 0;
/// 2037-12-31T00:00:00Z
const MAX_TIMESTAMP: i64 = 2_145_830_400;

pub fn register(registry: &mut ValueRegistry) {
    registry.register_generator(Box::new(DateTimeGenerator));
    registry.register_generator(Box::new(TimeGenerator));
    registry.register_generator(Box::new(YearGenerator));
}

fn random_time(rng: &mut dyn RngCore) -> Result<DateTime<Utc>> {
    let secs = rng.random_range(MIN_TIMESTAMP..MAX_TIMESTAMP);
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Generation(format!("timestamp {secs} out of range")))
}

struct DateTimeGenerator;

impl ValueGenerator for DateTimeGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["datetime", "timestamp"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let time = random_time(rng)?;
        Ok(Value::Text(time.format("%Y-%m-%d %H:%M:%S").to_string()))
    }
}

struct TimeGenerator;

impl ValueGenerator for TimeGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["time"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let time = random_time(rng)?;
        Ok(Value::Text(time.format("%H:%M:%S").to_string()))
    }
}

struct YearGenerator;

impl ValueGenerator for YearGenerator {
    fn types(&self) -> &'static [&'static str] {
        &["year"]
    }

    fn generate(&self, _column: &Column, rng: &mut dyn RngCore) -> Result<Value> {
        let time = random_time(rng)?;
        Ok(Value::Text(format!("{:04}", time.year())))
    }
}
