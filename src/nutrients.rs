use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed set of nutrients tracked per food row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Nutrient {
    Sodium,
    Potassium,
    Protein,
    Carbs,
    Fat,
    #[serde(rename = "Sat Fat")]
    SatFat,
    #[serde(rename = "Mono Fat")]
    MonoFat,
    #[serde(rename = "Poly Fat")]
    PolyFat,
    Sugar,
    Calcium,
    Magnesium,
    Iron,
    Calories,
}

/// Nutrient amounts keyed by nutrient. Absent keys read as zero.
pub type NutrientMap = BTreeMap<Nutrient, f64>;

const KJ_PER_KCAL: f64 = 4.184;

impl Nutrient {
    pub const ALL: [Nutrient; 13] = [
        Nutrient::Sodium,
        Nutrient::Potassium,
        Nutrient::Protein,
        Nutrient::Carbs,
        Nutrient::Fat,
        Nutrient::SatFat,
        Nutrient::MonoFat,
        Nutrient::PolyFat,
        Nutrient::Sugar,
        Nutrient::Calcium,
        Nutrient::Magnesium,
        Nutrient::Iron,
        Nutrient::Calories,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Nutrient::Sodium => "Sodium",
            Nutrient::Potassium => "Potassium",
            Nutrient::Protein => "Protein",
            Nutrient::Carbs => "Carbs",
            Nutrient::Fat => "Fat",
            Nutrient::SatFat => "Sat Fat",
            Nutrient::MonoFat => "Mono Fat",
            Nutrient::PolyFat => "Poly Fat",
            Nutrient::Sugar => "Sugar",
            Nutrient::Calcium => "Calcium",
            Nutrient::Magnesium => "Magnesium",
            Nutrient::Iron => "Iron",
            Nutrient::Calories => "Calories",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Nutrient::Sodium
            | Nutrient::Potassium
            | Nutrient::Calcium
            | Nutrient::Magnesium
            | Nutrient::Iron => "mg",
            Nutrient::Calories => "kcal",
            _ => "g",
        }
    }

    /// Resolves a label as it shows up in food libraries and diary rows:
    /// canonical names, USDA descriptions, camelCase label keys and the
    /// `na`/`k` shorthands.
    pub fn from_label(label: &str) -> Option<Nutrient> {
        let key = label.trim().to_ascii_lowercase();
        let n = match key.as_str() {
            "sodium" | "sodium, na" | "na" => Nutrient::Sodium,
            "potassium" | "potassium, k" | "k" => Nutrient::Potassium,
            "protein" => Nutrient::Protein,
            "carbs" | "carbohydrate" | "carbohydrates" | "carbohydrate, by difference" => {
                Nutrient::Carbs
            }
            "fat" | "total fat" | "total lipid (fat)" => Nutrient::Fat,
            "sat fat" | "saturatedfat" | "saturated fat" | "fatty acids, total saturated" => {
                Nutrient::SatFat
            }
            "mono fat" | "monounsaturatedfat" | "fatty acids, total monounsaturated" => {
                Nutrient::MonoFat
            }
            "poly fat" | "polyunsaturatedfat" | "fatty acids, total polyunsaturated" => {
                Nutrient::PolyFat
            }
            "sugar" | "sugars" | "sugars, total" | "sugars, total including nlea" => {
                Nutrient::Sugar
            }
            "calcium" | "calcium, ca" => Nutrient::Calcium,
            "magnesium" | "magnesium, mg" => Nutrient::Magnesium,
            "iron" | "iron, fe" => Nutrient::Iron,
            "calories" | "energy" | "energy (kcal)" | "energy kcal" | "cal" => Nutrient::Calories,
            _ => return None,
        };
        Some(n)
    }
}

impl std::fmt::Display for Nutrient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Reads a numeric amount leniently: numbers and numeric strings are accepted,
/// everything else (null, "", "NA", negatives, NaN) reads as zero.
pub fn amount_from_json(value: &serde_json::Value) -> f64 {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    non_negative(raw)
}

/// Clamps to a finite, non-negative number.
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Builds a nutrient map from arbitrary labelled amounts. The first label that
/// resolves to a nutrient wins; energy given only in kJ is converted to kcal.
pub fn normalize_labels<'a, I>(pairs: I) -> NutrientMap
where
    I: IntoIterator<Item = (&'a str, &'a serde_json::Value)>,
{
    let mut out = NutrientMap::new();
    let mut kilojoules = None;
    for (label, value) in pairs {
        match Nutrient::from_label(label) {
            Some(n) => {
                out.entry(n).or_insert_with(|| amount_from_json(value));
            }
            None if is_kilojoule_label(label) => {
                kilojoules.get_or_insert_with(|| amount_from_json(value));
            }
            None => {}
        }
    }
    let has_kcal = out.get(&Nutrient::Calories).is_some_and(|v| *v > 0.0);
    if let (false, Some(kj)) = (has_kcal, kilojoules) {
        out.insert(Nutrient::Calories, kj / KJ_PER_KCAL);
    }
    out
}

fn is_kilojoule_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "energy (kj)" | "kj" | "kilojoules"
    )
}
