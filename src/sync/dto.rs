use serde::{Deserialize, Serialize};
use time::Date;

use crate::diary::dto::iso_date;
use crate::nutrients::{normalize_labels, NutrientMap};

/// Body of `add` and `qty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryQuantity {
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(rename = "foodId", alias = "fdcId")]
    pub food_id: String,
    pub grams: f64,
}

/// Body of `remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryKey {
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(rename = "foodId", alias = "fdcId")]
    pub food_id: String,
}

/// Acknowledgement returned by the write calls. Servers answer either with the
/// written entry or with a bare `{"ok": true}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiaryAck {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub entry: Option<DiaryLine>,
}

/// One stored line of the day's diary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryLine {
    #[serde(rename = "foodId", alias = "fdcId")]
    pub food_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub grams: f64,
    /// Nutrient columns, flattened next to the identifying fields.
    #[serde(flatten)]
    pub nutrients: serde_json::Map<String, serde_json::Value>,
}

impl DiaryLine {
    pub fn nutrient_amounts(&self) -> NutrientMap {
        normalize_labels(self.nutrients.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

/// Response of the day read.
#[derive(Debug, Clone, Deserialize)]
pub struct DiaryDay {
    #[serde(default, with = "iso_date::option")]
    pub date: Option<Date>,
    #[serde(default)]
    pub entries: Vec<DiaryLine>,
}
