/// Two-decimal float encoding for comparison output; non-finite values are written as `null`.
use constants::processing::OUTPUT_DECIMALS;
use serde::{Deserialize, Deserializer, Serializer};

/// Round to the configured output precision, halves to even.
///
/// Decimal formatting rounds the exact binary value, so 2.675 (stored just
/// below the tie) becomes 2.67 and the exact tie 0.125 becomes 0.12.
pub fn round(value: f64) -> f64 {
    let rounded = format!("{:.*}", OUTPUT_DECIMALS as usize, value)
        .parse::<f64>()
        .unwrap_or(value);
    // Avoid writing -0.0
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Rounded value, or None when it cannot be represented
pub fn encode(value: f64) -> Option<f64> {
    value.is_finite().then(|| round(value))
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    match encode(*value) {
        Some(v) => serializer.serialize_f64(v),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Same encoding for optional values
pub mod option {
    use super::encode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value.and_then(encode) {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Option::<f64>::deserialize(deserializer)
    }
}

/// Same encoding for float sequences
pub mod vec {
    use super::encode;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&encode(*value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
