use serde::Serialize;

use crate::nutrients::{non_negative, Nutrient, NutrientMap};

pub const DEFAULT_SERVING_WEIGHT_G: f64 = 100.0;
pub const DEFAULT_DESCRIPTION: &str = "(item)";

/// Grams and scale factor last computed for a row, kept for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RowScaling {
    pub grams: f64,
    pub scale: f64,
}

/// One food on one day.
///
/// The edit fields are private so that every write goes through the clamping
/// setters: `serving_weight_grams` is always positive and both edit fields are
/// always finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodEntry {
    pub id: String,
    pub description: String,
    pub per_serving: NutrientMap,
    serving_weight_grams: f64,
    servings_eaten: f64,
    grams_override: Option<f64>,
    pub cached: RowScaling,
}

impl FoodEntry {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        per_serving: NutrientMap,
        serving_weight_grams: f64,
    ) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            description
        };
        let serving_weight_grams = if serving_weight_grams.is_finite() && serving_weight_grams > 0.0
        {
            serving_weight_grams
        } else {
            DEFAULT_SERVING_WEIGHT_G
        };
        let per_serving = per_serving
            .into_iter()
            .map(|(k, v)| (k, non_negative(v)))
            .collect();
        Self {
            id: id.into(),
            description,
            per_serving,
            serving_weight_grams,
            servings_eaten: 0.0,
            grams_override: None,
            cached: RowScaling::default(),
        }
    }

    pub fn serving_weight_grams(&self) -> f64 {
        self.serving_weight_grams
    }

    pub fn servings_eaten(&self) -> f64 {
        self.servings_eaten
    }

    pub fn grams_override(&self) -> Option<f64> {
        self.grams_override
    }

    pub fn per_serving(&self, nutrient: Nutrient) -> f64 {
        self.per_serving.get(&nutrient).copied().unwrap_or(0.0)
    }

    /// Stores `servings`, clamped. Returns `true` when the input had to be clamped.
    pub fn set_servings_eaten(&mut self, servings: f64) -> bool {
        let clamped = non_negative(servings);
        self.servings_eaten = clamped;
        clamped != servings
    }

    /// Stores a gram override, clamped. `None` removes the override.
    pub fn set_grams_override(&mut self, grams: Option<f64>) -> bool {
        match grams {
            Some(g) => {
                let clamped = non_negative(g);
                self.grams_override = Some(clamped);
                clamped != g
            }
            None => {
                self.grams_override = None;
                false
            }
        }
    }

    /// Re-applies the invariants to both edit fields.
    pub fn clamp_edits(&mut self) -> bool {
        let servings = self.set_servings_eaten(self.servings_eaten);
        let grams = self.set_grams_override(self.grams_override);
        servings || grams
    }

    pub fn with_servings(mut self, servings: f64) -> Self {
        self.set_servings_eaten(servings);
        self
    }

    pub fn with_grams_override(mut self, grams: f64) -> Self {
        self.set_grams_override(Some(grams));
        self
    }
}
