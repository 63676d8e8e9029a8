//! Pure scaling from a row's edit state to grams consumed and the factor
//! applied to its per-serving nutrients.

use crate::diary::model::{FoodEntry, RowScaling};
use crate::nutrients::{non_negative, Nutrient, NutrientMap};

fn active_override(entry: &FoodEntry) -> Option<f64> {
    entry
        .grams_override()
        .map(non_negative)
        .filter(|g| *g > 0.0)
}

pub fn grams_for_row(entry: &FoodEntry) -> f64 {
    match active_override(entry) {
        Some(grams) => grams,
        None => non_negative(entry.serving_weight_grams() * non_negative(entry.servings_eaten())),
    }
}

pub fn scale_for_row(entry: &FoodEntry) -> f64 {
    let weight = entry.serving_weight_grams();
    match active_override(entry) {
        Some(grams) if weight > 0.0 => non_negative(grams / weight),
        _ => non_negative(entry.servings_eaten()),
    }
}

pub fn today_value(entry: &FoodEntry, nutrient: Nutrient) -> f64 {
    non_negative(entry.per_serving(nutrient) * scale_for_row(entry))
}

pub fn scaled_nutrients(entry: &FoodEntry) -> NutrientMap {
    Nutrient::ALL
        .iter()
        .map(|n| (*n, today_value(entry, *n)))
        .collect()
}

pub fn scaling_for_row(entry: &FoodEntry) -> RowScaling {
    RowScaling {
        grams: grams_for_row(entry),
        scale: scale_for_row(entry),
    }
}
