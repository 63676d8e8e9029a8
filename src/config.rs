use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use time::Date;

use crate::diary::dto::iso_date;
use crate::diary::totals::Budgets;
use crate::nutrients::Nutrient;

#[derive(Debug, Clone)]
pub struct DiaryConfig {
    /// Base of the diary endpoints, e.g. `https://host/app/api/diary`.
    /// `None` keeps the diary in process memory.
    pub api_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub diary: DiaryConfig,
    pub boot_payload: Option<PathBuf>,
    pub date_override: Option<Date>,
    pub budgets: Budgets,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("DIARY_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let timeout = Duration::from_secs(
            std::env::var("DIARY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        );
        let date_override = match std::env::var("DIARY_DATE") {
            Ok(v) if !v.trim().is_empty() => {
                Some(iso_date::parse(v.trim()).with_context(|| format!("DIARY_DATE={v}"))?)
            }
            _ => None,
        };
        let boot_payload = std::env::var("BOOT_PAYLOAD")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let defaults = Budgets::default();
        let budget = |key: &str, n: Nutrient| env_f64(key, defaults.get(n).unwrap_or(0.0));
        let budgets = Budgets::empty()
            .with(Nutrient::Sodium, budget("BUDGET_SODIUM_MG", Nutrient::Sodium))
            .with(Nutrient::Potassium, budget("BUDGET_POTASSIUM_MG", Nutrient::Potassium))
            .with(Nutrient::Protein, budget("BUDGET_PROTEIN_G", Nutrient::Protein))
            .with(Nutrient::Calories, budget("BUDGET_CALORIES_KCAL", Nutrient::Calories));

        Ok(Self {
            diary: DiaryConfig { api_url, timeout },
            boot_payload,
            date_override,
            budgets,
        })
    }
}
