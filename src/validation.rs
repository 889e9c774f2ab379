use chrono::{DateTime, NaiveDate, Utc};
use rocket::serde::json::Json;
use validator::Validate;

use crate::error::AppError;

pub trait JsonValidateExt<T> {
    /// Unwraps the body after running its `validator` rules.
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

pub fn require_positive_id(field: &str, value: i64) -> Result<(), AppError> {
    if value > 0 {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be a positive identifier",
            field
        )))
    }
}

/// Trims free text and treats blank input as absent.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Parses an optional RFC3339 timestamp and normalizes it to UTC. Blank
/// strings count as absent.
pub fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| {
                AppError::Validation(format!("{} must be an RFC3339 timestamp", field))
            }),
    }
}

pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{} must be a YYYY-MM-DD date", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_normalizes_to_utc() {
        let parsed = parse_timestamp("started_at", Some("2025-03-01T10:00:00+02:00"))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-01T08:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_blank_is_absent() {
        assert!(parse_timestamp("started_at", Some("  ")).unwrap().is_none());
        assert!(parse_timestamp("started_at", None).unwrap().is_none());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("ended_at", Some("yesterday")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("birthdate", Some("2021-06-15")).unwrap().unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 6, 15).unwrap());
        assert!(parse_date("birthdate", Some("15/06/2021")).is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some("  trail ".into())), Some("trail".to_string()));
        assert_eq!(optional_text(Some("   ".into())), None);
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_require_positive_id() {
        assert!(require_positive_id("dog_id", 1).is_ok());
        assert!(require_positive_id("dog_id", 0).is_err());
        assert!(require_positive_id("dog_id", -3).is_err());
    }
}
