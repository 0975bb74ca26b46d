/// Comparison output types and their JSON form.
use crate::rounding;
use crate::statistics::ComparisonStatistics;
use point_cloud_pre_processing::parse_percentile_column;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Which group name sits on side `a` and which on side `b`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMapping {
    pub a: String,
    pub b: String,
}

impl GroupMapping {
    pub fn swapped(&self) -> Self {
        Self {
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }
}

/// One percentile channel on a comparison cell: `<name>_a`, `<name>_b`, `<name>_diff`
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelValues {
    pub name: String,
    pub a: f64,
    pub b: f64,
    pub diff: f64,
}

impl ChannelValues {
    pub fn new(name: impl Into<String>, a: f64, b: f64) -> Self {
        Self {
            name: name.into(),
            a,
            b,
            diff: b - a,
        }
    }

    pub(crate) fn serialize_into<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry(&format!("{}_a", self.name), &rounding::encode(self.a))?;
        map.serialize_entry(&format!("{}_b", self.name), &rounding::encode(self.b))?;
        map.serialize_entry(&format!("{}_diff", self.name), &rounding::encode(self.diff))
    }
}

/// A matched spatial cell with values from both groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonCell {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub veg_height_max_a: f64,
    pub veg_height_max_b: f64,
    pub delta_z: f64,
    pub count_a: u64,
    pub count_b: u64,
    pub veg_height_outlier_count_a: u64,
    pub veg_height_outlier_count_b: u64,
    pub veg_height_outlier_class7_count_a: u64,
    pub veg_height_outlier_class7_count_b: u64,
    pub channels: Vec<ChannelValues>,
}

impl ComparisonCell {
    /// Cell with only coordinates and heights set; delta is derived
    pub fn new(x0: f64, x1: f64, y0: f64, y1: f64, a: f64, b: f64) -> Self {
        Self {
            x0,
            x1,
            y0,
            y1,
            veg_height_max_a: a,
            veg_height_max_b: b,
            delta_z: b - a,
            count_a: 0,
            count_b: 0,
            veg_height_outlier_count_a: 0,
            veg_height_outlier_count_b: 0,
            veg_height_outlier_class7_count_a: 0,
            veg_height_outlier_class7_count_b: 0,
            channels: Vec::new(),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelValues> {
        self.channels.iter().find(|c| c.name == name)
    }
}

impl Serialize for ComparisonCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(14 + 3 * self.channels.len()))?;
        for (key, value) in [
            ("x0", self.x0),
            ("x1", self.x1),
            ("y0", self.y0),
            ("y1", self.y1),
            ("veg_height_max_a", self.veg_height_max_a),
            ("veg_height_max_b", self.veg_height_max_b),
            ("delta_z", self.delta_z),
        ] {
            map.serialize_entry(key, &rounding::encode(value))?;
        }
        for (key, value) in [
            ("count_a", self.count_a),
            ("count_b", self.count_b),
            ("veg_height_outlier_count_a", self.veg_height_outlier_count_a),
            ("veg_height_outlier_count_b", self.veg_height_outlier_count_b),
            ("veg_height_outlier_class7_count_a", self.veg_height_outlier_class7_count_a),
            ("veg_height_outlier_class7_count_b", self.veg_height_outlier_class7_count_b),
        ] {
            map.serialize_entry(key, &value)?;
        }
        for channel in &self.channels {
            channel.serialize_into(&mut map)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ComparisonCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        let float = |key: &str| fields.get(key).copied().flatten().unwrap_or(f64::NAN);
        let count = |key: &str| {
            fields
                .get(key)
                .copied()
                .flatten()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map_or(0, |v| v as u64)
        };
        let coordinate = |key: &str| {
            fields
                .get(key)
                .copied()
                .flatten()
                .ok_or_else(|| D::Error::missing_field_named(key))
        };

        let channels = fields
            .keys()
            .filter_map(|key| key.strip_suffix("_a"))
            .filter(|name| parse_percentile_column(name).is_some())
            .map(|name| ChannelValues {
                name: name.to_string(),
                a: float(&format!("{}_a", name)),
                b: float(&format!("{}_b", name)),
                diff: float(&format!("{}_diff", name)),
            })
            .collect();

        Ok(Self {
            x0: coordinate("x0")?,
            x1: coordinate("x1")?,
            y0: coordinate("y0")?,
            y1: coordinate("y1")?,
            veg_height_max_a: float("veg_height_max_a"),
            veg_height_max_b: float("veg_height_max_b"),
            delta_z: float("delta_z"),
            count_a: count("count_a"),
            count_b: count("count_b"),
            veg_height_outlier_count_a: count("veg_height_outlier_count_a"),
            veg_height_outlier_count_b: count("veg_height_outlier_count_b"),
            veg_height_outlier_class7_count_a: count("veg_height_outlier_class7_count_a"),
            veg_height_outlier_class7_count_b: count("veg_height_outlier_class7_count_b"),
            channels,
        })
    }
}

trait MissingFieldNamed {
    fn missing_field_named(name: &str) -> Self;
}

impl<E: serde::de::Error> MissingFieldNamed for E {
    fn missing_field_named(name: &str) -> Self {
        E::custom(format!("missing field `{}`", name))
    }
}

/// Full output of a comparison job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub group_mapping: GroupMapping,
    pub cells: Vec<ComparisonCell>,
    pub statistics: ComparisonStatistics,
    /// Same statistics for the first percentile channel, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_p: Option<ComparisonStatistics>,
}

impl ComparisonResult {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
