use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const GRAMS_PER_OZ: f64 = 28.3495;
const GRAMS_PER_LB: f64 = 453.592;
const GRAMS_PER_CUP: f64 = 240.0;
const GRAMS_PER_TBSP: f64 = 15.0;
const GRAMS_PER_TSP: f64 = 5.0;

/// A validated change to one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowEdit {
    /// New servings-eaten count; the gram override is left as is.
    Servings(f64),
    /// New gram override. Zero drops back to servings-based scaling.
    Grams(f64),
    /// Zero servings and no override.
    Clear,
}

#[derive(Debug, Error, PartialEq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("unrecognised quantity {0:?}")]
    Unrecognised(String),
}

/// Parses quantity text typed into a row.
///
/// Accepted: `150g`, `150 grams`, `2 oz`, `1 lb`, generic volumes (`1 cup`,
/// `2 tbsp`, `1 tsp`) at fixed gram weights, a bare number of servings
/// (`2`, `1.5`), slash tallies where each slash is one serving (`//`), a number
/// followed by slashes (`2//`), and `0`/`clear`/`none`/`x` to clear the row.
pub fn parse_quantity(text: &str) -> Result<RowEdit, QuantityError> {
    lazy_static! {
        static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
        static ref MASS_RE: Regex =
            Regex::new(r"^(\d+(?:\.\d+)?)\s*(g|gram|grams|oz|ounce|ounces|lb|lbs|pound|pounds|cup|cups|tbsp|tbs|tablespoon|tablespoons|tsp|teaspoon|teaspoons)$")
                .unwrap();
        static ref SERVINGS_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)\s*/*$").unwrap();
        static ref TALLY_RE: Regex = Regex::new(r"^/+$").unwrap();
    }

    let s = WS_RE
        .replace_all(text.trim(), " ")
        .to_lowercase();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }
    if matches!(s.as_str(), "clear" | "none" | "x") {
        return Ok(RowEdit::Clear);
    }
    if TALLY_RE.is_match(&s) {
        return Ok(RowEdit::Servings(s.len() as f64));
    }
    if let Some(c) = MASS_RE.captures(&s) {
        let qty: f64 = c[1]
            .parse()
            .map_err(|_| QuantityError::Unrecognised(text.to_string()))?;
        let grams = match &c[2] {
            "oz" | "ounce" | "ounces" => qty * GRAMS_PER_OZ,
            "lb" | "lbs" | "pound" | "pounds" => qty * GRAMS_PER_LB,
            "cup" | "cups" => qty * GRAMS_PER_CUP,
            "tbsp" | "tbs" | "tablespoon" | "tablespoons" => qty * GRAMS_PER_TBSP,
            "tsp" | "teaspoon" | "teaspoons" => qty * GRAMS_PER_TSP,
            _ => qty,
        };
        return Ok(RowEdit::Grams(grams));
    }
    if let Some(c) = SERVINGS_RE.captures(&s) {
        let qty: f64 = c[1]
            .parse()
            .map_err(|_| QuantityError::Unrecognised(text.to_string()))?;
        if qty == 0.0 {
            return Ok(RowEdit::Clear);
        }
        return Ok(RowEdit::Servings(qty));
    }
    Err(QuantityError::Unrecognised(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grams_and_mass_units() {
        assert_eq!(parse_quantity("150g"), Ok(RowEdit::Grams(150.0)));
        assert_eq!(parse_quantity(" 150  Grams "), Ok(RowEdit::Grams(150.0)));
        assert_eq!(parse_quantity("2 oz"), Ok(RowEdit::Grams(2.0 * GRAMS_PER_OZ)));
        assert_eq!(parse_quantity("1lb"), Ok(RowEdit::Grams(GRAMS_PER_LB)));
    }

    #[test]
    fn generic_volumes() {
        assert_eq!(parse_quantity("1 cup"), Ok(RowEdit::Grams(240.0)));
        assert_eq!(parse_quantity("2 tbsp"), Ok(RowEdit::Grams(30.0)));
        assert_eq!(parse_quantity("1.5 cups"), Ok(RowEdit::Grams(360.0)));
        assert_eq!(parse_quantity("3 teaspoons"), Ok(RowEdit::Grams(15.0)));
        assert_eq!(parse_quantity("1 Tablespoon"), Ok(RowEdit::Grams(15.0)));
        assert_eq!(parse_quantity("2tbs"), Ok(RowEdit::Grams(30.0)));
    }

    #[test]
    fn servings_forms() {
        assert_eq!(parse_quantity("2"), Ok(RowEdit::Servings(2.0)));
        assert_eq!(parse_quantity("1.5"), Ok(RowEdit::Servings(1.5)));
        assert_eq!(parse_quantity("//"), Ok(RowEdit::Servings(2.0)));
        assert_eq!(parse_quantity("3//"), Ok(RowEdit::Servings(3.0)));
    }

    #[test]
    fn clear_forms() {
        for t in ["0", "clear", "NONE", "x"] {
            assert_eq!(parse_quantity(t), Ok(RowEdit::Clear), "{t}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_quantity("   "), Err(QuantityError::Empty));
        assert!(matches!(parse_quantity("-2"), Err(QuantityError::Unrecognised(_))));
        assert!(matches!(parse_quantity("a cup"), Err(QuantityError::Unrecognised(_))));
        assert!(matches!(parse_quantity("1 handful"), Err(QuantityError::Unrecognised(_))));
    }
}
