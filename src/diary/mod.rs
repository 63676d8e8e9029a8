pub mod dto;
pub mod model;
pub mod quantity;
pub mod scaling;
pub mod totals;

pub use dto::BootPayload;
pub use model::{FoodEntry, RowScaling};
pub use quantity::{parse_quantity, QuantityError, RowEdit};
pub use totals::{Budgets, DayTotals, Tier, TotalsAggregator};
