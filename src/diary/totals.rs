use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diary::model::FoodEntry;
use crate::diary::scaling::{grams_for_row, today_value};
use crate::nutrients::{Nutrient, NutrientMap};

pub const MEDIUM_TIER_PCT: f64 = 33.0;
pub const HIGH_TIER_PCT: f64 = 66.0;

/// Severity band of a budget percentage. Lower bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn from_pct(pct: f64) -> Self {
        if pct >= HIGH_TIER_PCT {
            Tier::High
        } else if pct >= MEDIUM_TIER_PCT {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

/// `value / budget * 100`, clamped to `[0, 100]`. A non-positive budget reads as 0.
pub fn budget_pct(value: f64, budget: f64) -> f64 {
    if !(budget.is_finite() && budget > 0.0) || !value.is_finite() {
        return 0.0;
    }
    (value / budget * 100.0).clamp(0.0, 100.0)
}

/// Daily limits per nutrient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budgets(BTreeMap<Nutrient, f64>);

impl Default for Budgets {
    fn default() -> Self {
        Self::empty()
            .with(Nutrient::Sodium, 1500.0)
            .with(Nutrient::Potassium, 3400.0)
            .with(Nutrient::Protein, 60.0)
            .with(Nutrient::Calories, 2000.0)
    }
}

impl Budgets {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, nutrient: Nutrient, amount: f64) -> Self {
        self.0.insert(nutrient, amount);
        self
    }

    pub fn get(&self, nutrient: Nutrient) -> Option<f64> {
        self.0.get(&nutrient).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Nutrient, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetProgress {
    pub value: f64,
    pub budget: f64,
    pub pct: f64,
    pub tier: Tier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopContributor {
    pub food_id: String,
    pub description: String,
    pub amount: f64,
    /// Percent of the day total, one decimal.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotals {
    pub nutrients: NutrientMap,
    pub total_grams: f64,
    pub budgets: BTreeMap<Nutrient, BudgetProgress>,
    pub top_sodium: Option<TopContributor>,
}

impl DayTotals {
    pub fn value(&self, nutrient: Nutrient) -> f64 {
        self.nutrients.get(&nutrient).copied().unwrap_or(0.0)
    }
}

/// The row with the largest contribution of `nutrient`, if any row contributes.
/// Ties go to the earliest row.
pub fn top_contributor(entries: &[FoodEntry], nutrient: Nutrient) -> Option<TopContributor> {
    let total: f64 = entries.iter().map(|e| today_value(e, nutrient)).sum();
    if total <= 0.0 {
        return None;
    }
    let mut best: Option<(&FoodEntry, f64)> = None;
    for e in entries {
        let v = today_value(e, nutrient);
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((e, v));
        }
    }
    best.map(|(e, amount)| TopContributor {
        food_id: e.id.clone(),
        description: e.description.clone(),
        amount,
        share: (amount / total * 1000.0).round() / 10.0,
    })
}

/// Recomputes day totals from scratch on every call.
#[derive(Debug, Clone, Default)]
pub struct TotalsAggregator {
    budgets: Budgets,
}

impl TotalsAggregator {
    pub fn new(budgets: Budgets) -> Self {
        Self { budgets }
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    pub fn aggregate(&self, entries: &[FoodEntry]) -> DayTotals {
        let mut nutrients: NutrientMap = Nutrient::ALL.iter().map(|n| (*n, 0.0)).collect();
        let mut total_grams = 0.0;
        for e in entries {
            for n in Nutrient::ALL {
                *nutrients.entry(n).or_insert(0.0) += today_value(e, n);
            }
            total_grams += grams_for_row(e);
        }

        let budgets = self
            .budgets
            .iter()
            .map(|(n, budget)| {
                let value = nutrients.get(&n).copied().unwrap_or(0.0);
                let pct = budget_pct(value, budget);
                (
                    n,
                    BudgetProgress {
                        value,
                        budget,
                        pct,
                        tier: Tier::from_pct(pct),
                    },
                )
            })
            .collect();

        DayTotals {
            nutrients,
            total_grams,
            budgets,
            top_sodium: top_contributor(entries, Nutrient::Sodium),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(id: &str, sodium: f64, servings: f64) -> FoodEntry {
        let mut per = NutrientMap::new();
        per.insert(Nutrient::Sodium, sodium);
        per.insert(Nutrient::Protein, 10.0);
        FoodEntry::new(id, id, per, 100.0).with_servings(servings)
    }

    #[test]
    fn pct_clamps_at_100() {
        assert_eq!(budget_pct(5000.0, 1500.0), 100.0);
        assert_eq!(budget_pct(750.0, 1500.0), 50.0);
        assert_eq!(budget_pct(-10.0, 1500.0), 0.0);
        assert_eq!(budget_pct(100.0, 0.0), 0.0);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(Tier::from_pct(0.0), Tier::Low);
        assert_eq!(Tier::from_pct(32.999), Tier::Low);
        assert_eq!(Tier::from_pct(33.0), Tier::Medium);
        assert_eq!(Tier::from_pct(65.9), Tier::Medium);
        assert_eq!(Tier::from_pct(65.999), Tier::Medium);
        assert_eq!(Tier::from_pct(66.0), Tier::High);
        assert_eq!(Tier::from_pct(100.0), Tier::High);
    }

    #[test]
    fn sums_rows_and_grams() {
        let agg = TotalsAggregator::default();
        let rows = vec![food("a", 300.0, 2.0), food("b", 100.0, 1.0)];
        let t = agg.aggregate(&rows);
        assert_eq!(t.value(Nutrient::Sodium), 700.0);
        assert_eq!(t.value(Nutrient::Protein), 30.0);
        assert_eq!(t.value(Nutrient::Iron), 0.0);
        assert_eq!(t.total_grams, 300.0);
        assert_eq!(t.nutrients.len(), Nutrient::ALL.len());

        let na = t.budgets[&Nutrient::Sodium];
        assert_eq!(na.budget, 1500.0);
        assert!((na.pct - 46.666).abs() < 0.01);
        assert_eq!(na.tier, Tier::Medium);
    }

    #[test]
    fn sodium_budget_saturates() {
        let agg = TotalsAggregator::new(Budgets::empty().with(Nutrient::Sodium, 1500.0));
        let t = agg.aggregate(&[food("a", 5000.0, 1.0)]);
        let na = t.budgets[&Nutrient::Sodium];
        assert_eq!(na.pct, 100.0);
        assert_eq!(na.tier, Tier::High);
        assert_eq!(t.budgets.len(), 1);
    }

    #[test]
    fn aggregate_is_idempotent() {
        let agg = TotalsAggregator::default();
        let rows = vec![food("a", 123.4, 1.3), food("b", 99.9, 0.7)];
        assert_eq!(agg.aggregate(&rows), agg.aggregate(&rows));
    }

    #[test]
    fn empty_day_has_zero_totals() {
        let t = TotalsAggregator::default().aggregate(&[]);
        assert_eq!(t.total_grams, 0.0);
        assert!(t.nutrients.values().all(|v| *v == 0.0));
        assert!(t.top_sodium.is_none());
        assert!(t.budgets.values().all(|b| b.tier == Tier::Low));
    }

    #[test]
    fn top_sodium_share() {
        let rows = vec![food("a", 100.0, 1.0), food("b", 300.0, 1.0)];
        let top = top_contributor(&rows, Nutrient::Sodium).unwrap();
        assert_eq!(top.food_id, "b");
        assert_eq!(top.share, 75.0);
    }

    #[test]
    fn top_contributor_tie_keeps_first_row() {
        let rows = vec![food("a", 200.0, 1.0), food("b", 200.0, 1.0)];
        let top = top_contributor(&rows, Nutrient::Sodium).unwrap();
        assert_eq!(top.food_id, "a");
        assert_eq!(top.share, 50.0);
    }
}
