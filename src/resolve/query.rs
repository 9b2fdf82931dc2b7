//! Request validation: exactly one of identifier or coordinates.

use crate::domain::{PredictionRequest, SourceQuery};
use crate::error::AppError;
use crate::resolve::identifier::parse_identifier;

const MISSING_TARGET: &str = "Either 'id' or 'coords' (ra, dec) must be provided!";

/// Build a query from loose parts. A blank identifier counts as absent.
pub fn source_query(source_id: Option<&str>, ra: Option<f64>, dec: Option<f64>) -> Result<SourceQuery, AppError> {
    let source_id = source_id.map(str::trim).filter(|s| !s.is_empty());

    match (source_id, ra, dec) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(AppError::invalid_request(
            "Provide either an identifier or coordinates, not both.",
        )),
        (Some(id), None, None) => Ok(SourceQuery::Identifier(parse_identifier(id)?)),
        (None, Some(ra), Some(dec)) => {
            validate_coordinates(ra, dec)?;
            Ok(SourceQuery::Coordinates { ra, dec })
        }
        (None, Some(_), None) | (None, None, Some(_)) => {
            Err(AppError::invalid_request("Both 'ra' and 'dec' must be provided."))
        }
        (None, None, None) => Err(AppError::invalid_request(MISSING_TARGET)),
    }
}

fn validate_coordinates(ra: f64, dec: f64) -> Result<(), AppError> {
    if !ra.is_finite() || !(0.0..360.0).contains(&ra) {
        return Err(AppError::invalid_request(format!("RA must be in [0, 360) degrees, got {ra}")));
    }
    if !dec.is_finite() || !(-90.0..=90.0).contains(&dec) {
        return Err(AppError::invalid_request(format!("DEC must be in [-90, 90] degrees, got {dec}")));
    }
    Ok(())
}

impl TryFrom<&PredictionRequest> for SourceQuery {
    type Error = AppError;

    fn try_from(request: &PredictionRequest) -> Result<Self, Self::Error> {
        source_query(request.source_id.as_deref(), request.ra, request.dec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn neither_target_is_invalid() {
        for request in [
            PredictionRequest::default(),
            PredictionRequest::by_id("   "),
        ] {
            let err = SourceQuery::try_from(&request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
            assert_eq!(err.message(), MISSING_TARGET);
        }
    }

    #[test]
    fn both_or_partial_targets_are_invalid() {
        let both = PredictionRequest {
            source_id: Some("1".to_string()),
            ra: Some(10.0),
            dec: Some(10.0),
        };
        assert!(SourceQuery::try_from(&both).is_err());
        assert!(source_query(None, Some(10.0), None).is_err());
        assert!(source_query(None, None, Some(10.0)).is_err());
    }

    #[test]
    fn builds_identifier_and_coordinate_queries() {
        assert_eq!(
            SourceQuery::try_from(&PredictionRequest::by_id("Gaia DR3 4111834567779557376")).unwrap(),
            SourceQuery::Identifier(4111834567779557376)
        );
        assert_eq!(
            source_query(None, Some(256.5229102004341), Some(-26.580565130784702)).unwrap(),
            SourceQuery::Coordinates {
                ra: 256.5229102004341,
                dec: -26.580565130784702
            }
        );
    }

    #[test]
    fn out_of_range_coordinates_are_invalid() {
        assert!(source_query(None, Some(360.0), Some(0.0)).is_err());
        assert!(source_query(None, Some(10.0), Some(-91.0)).is_err());
        assert!(source_query(None, Some(f64::NAN), Some(0.0)).is_err());
    }
}
