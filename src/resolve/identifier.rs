//! Catalog identifier parsing.
//!
//! Users paste identifiers in many shapes (`Gaia DR3 4111834567779557376`,
//! `DR3-4111834567779557376`, plain digits). The numeric id is the longest run
//! of ASCII digits; ties go to the first run.

use crate::error::AppError;

pub fn longest_digit_run(raw: &str) -> Option<&str> {
    let mut best: Option<&str> = None;
    for run in raw.split(|c: char| !c.is_ascii_digit()).filter(|s| !s.is_empty()) {
        if best.is_none_or(|b| run.len() > b.len()) {
            best = Some(run);
        }
    }
    best
}

pub fn parse_identifier(raw: &str) -> Result<u64, AppError> {
    let digits = longest_digit_run(raw)
        .ok_or_else(|| AppError::invalid_request("Invalid ID: No numeric values found."))?;
    digits
        .parse::<u64>()
        .map_err(|e| AppError::invalid_request(format!("Invalid ID '{digits}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_designation_number() {
        assert_eq!(parse_identifier("Gaia DR3 4111834567779557376").unwrap(), 4111834567779557376);
        assert_eq!(parse_identifier("4111834567779557376").unwrap(), 4111834567779557376);
        assert_eq!(parse_identifier(" DR3-42 ").unwrap(), 42);
    }

    #[test]
    fn first_of_equal_runs_wins() {
        assert_eq!(longest_digit_run("a12b34"), Some("12"));
        assert_eq!(longest_digit_run("1 22 333 44"), Some("333"));
    }

    #[test]
    fn no_digits_or_overflow_is_invalid() {
        let err = parse_identifier("Vega").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidRequest);
        assert!(parse_identifier("99999999999999999999999").is_err());
    }
}
