use std::collections::HashSet;

use anyhow::Context;
use serde::{Deserialize, Deserializer};
use time::Date;
use tracing::warn;

use crate::diary::model::{FoodEntry, DEFAULT_DESCRIPTION, DEFAULT_SERVING_WEIGHT_G};
use crate::nutrients::{amount_from_json, normalize_labels, NutrientMap};

/// `YYYY-MM-DD` dates on the wire.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{macros::format_description, Date};

    pub fn parse(s: &str) -> Result<Date, time::error::Parse> {
        Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
    }

    pub fn format(date: &Date) -> Result<String, time::error::Format> {
        date.format(format_description!("[year]-[month]-[day]"))
    }

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        let text = format(date).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let text = String::deserialize(d)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|text| super::parse(&text).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Page-load payload: the day and the user's food library.
#[derive(Debug, Deserialize)]
pub struct BootPayload {
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(rename = "myFoods", alias = "my_foods", alias = "my_food_list", default)]
    pub my_foods: Vec<BootFood>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServingPref {
    #[serde(default)]
    pub unit_grams: Option<serde_json::Value>,
}

/// A library food as delivered by the various food screens. Field names differ
/// between them; every known spelling is accepted here and nowhere else.
///
/// `perServingNutrients` holds amounts for one serving. `nutrients` and
/// `per100` hold amounts per 100 g and are scaled to the serving weight.
#[derive(Debug, Deserialize)]
pub struct BootFood {
    #[serde(alias = "fdcId", alias = "foodId", deserialize_with = "id_from_json")]
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        rename = "servingWeightGrams",
        alias = "serving_weight_grams",
        alias = "serving_grams",
        default
    )]
    pub serving_weight_grams: Option<serde_json::Value>,
    /// USDA branded serving size, in `serving_size_unit`.
    #[serde(rename = "servingSize", default)]
    pub serving_size: Option<serde_json::Value>,
    #[serde(rename = "servingSizeUnit", default)]
    pub serving_size_unit: Option<String>,
    #[serde(
        rename = "perServingNutrients",
        alias = "per_serving_nutrients",
        default
    )]
    pub per_serving_nutrients: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "nutrients", alias = "per100", default)]
    pub per_100g_nutrients: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub pref: Option<ServingPref>,
}

fn id_from_json<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "food id must be a string or number, got {other}"
        ))),
    }
}

impl BootFood {
    fn serving_size_grams(&self) -> f64 {
        let in_grams = match self.serving_size_unit.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(unit) => matches!(unit.to_lowercase().as_str(), "g" | "gram" | "grams"),
        };
        if !in_grams {
            return 0.0;
        }
        self.serving_size
            .as_ref()
            .map(amount_from_json)
            .unwrap_or(0.0)
    }

    fn serving_weight(&self) -> f64 {
        let direct = self
            .serving_weight_grams
            .as_ref()
            .map(amount_from_json)
            .unwrap_or(0.0);
        if direct > 0.0 {
            return direct;
        }
        let sized = self.serving_size_grams();
        if sized > 0.0 {
            return sized;
        }
        let pref = self
            .pref
            .as_ref()
            .and_then(|p| p.unit_grams.as_ref())
            .map(amount_from_json)
            .unwrap_or(0.0);
        if pref > 0.0 {
            pref
        } else {
            DEFAULT_SERVING_WEIGHT_G
        }
    }

    fn per_serving(&self, weight: f64) -> NutrientMap {
        let labels = |m: &serde_json::Map<String, serde_json::Value>| {
            normalize_labels(m.iter().map(|(k, v)| (k.as_str(), v)))
        };
        match (&self.per_serving_nutrients, &self.per_100g_nutrients) {
            (Some(per_serving), _) => labels(per_serving),
            (None, Some(per_100g)) => labels(per_100g)
                .into_iter()
                .map(|(n, amount)| (n, amount * weight / 100.0))
                .collect(),
            (None, None) => NutrientMap::new(),
        }
    }

    pub fn into_entry(self) -> FoodEntry {
        let weight = self.serving_weight();
        let per_serving = self.per_serving(weight);
        let description = self
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        FoodEntry::new(self.id, description, per_serving, weight)
    }
}

impl BootPayload {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("parse boot payload")
    }

    /// One row per library food. Later duplicates of an id are dropped.
    pub fn into_entries(self) -> (Date, Vec<FoodEntry>) {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.my_foods.len());
        for food in self.my_foods {
            if !seen.insert(food.id.clone()) {
                warn!(food_id = %food.id, "duplicate food id in boot payload; keeping first");
                continue;
            }
            entries.push(food.into_entry());
        }
        (self.date, entries)
    }
}
