//! Request types and validation for the NookTrip endpoints.
//!
//! Field names are camelCase on the wire; the snake_case spellings used by
//! older clients are accepted as aliases.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::maps::link_stops;
use crate::store::FeedbackKind;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validation trait for request types.
///
/// Runs after deserialization and before any secret is resolved or any
/// downstream call is made.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A single stop on an itinerary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    #[serde(alias = "location_name")]
    pub location_name: String,

    /// Free-form duration such as `"1.5 hours"`.
    #[serde(default)]
    pub duration: String,

    #[serde(default)]
    pub cost: u64,

    #[serde(default)]
    pub currency: String,

    /// `"lat,lng"` pair.
    #[serde(alias = "google_map_coordinates")]
    pub google_map_coordinates: String,

    /// Directions link to the following stop; absent on the last stop.
    #[serde(default, alias = "path_to_next")]
    pub path_to_next: Option<String>,
}

impl Stop {
    fn validate_at(&self, index: usize) -> Result<(), ValidationError> {
        let field = format!("stops[{}]", index);
        if self.location_name.trim().is_empty() {
            return Err(ValidationError::field(
                field,
                format!("Stop {} is missing a location name", index + 1),
            ));
        }
        if parse_coordinates(&self.google_map_coordinates).is_none() {
            return Err(ValidationError::field(
                field,
                format!(
                    "Stop {} has invalid coordinates '{}'. Expected 'lat,lng'",
                    index + 1,
                    self.google_map_coordinates
                ),
            ));
        }
        Ok(())
    }
}

/// Parse a `"lat,lng"` pair, rejecting out-of-range values.
pub fn parse_coordinates(value: &str) -> Option<(f64, f64)> {
    let (lat, lng) = value.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)).then_some((lat, lng))
}

fn validate_stops(stops: &[Stop]) -> Result<(), ValidationError> {
    stops
        .iter()
        .enumerate()
        .try_for_each(|(index, stop)| stop.validate_at(index))
}

/// Request body for `POST /itineraries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryRequest {
    pub destination: String,

    #[serde(alias = "start_date")]
    pub start_date: String,

    #[serde(alias = "end_date")]
    pub end_date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travelers: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stops: Vec<Stop>,

    /// Unrecognised members, echoed back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItineraryRequest {
    /// Canonical form: trimmed destination, ISO dates and linked stops.
    ///
    /// Response-owned keys are dropped from `extra` so they cannot shadow
    /// generated values.
    pub fn normalized(mut self) -> Self {
        self.destination = self.destination.trim().to_string();
        if let Ok(date) = parse_date(&self.start_date) {
            self.start_date = date.format(DATE_FORMAT).to_string();
        }
        if let Ok(date) = parse_date(&self.end_date) {
            self.end_date = date.format(DATE_FORMAT).to_string();
        }
        link_stops(&mut self.stops);
        self.extra.remove("itineraryId");
        self.extra.remove("assetsLocation");
        self
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
}

impl Validate for ItineraryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.destination.trim().is_empty() {
            return Err(ValidationError::field(
                "destination",
                "The 'destination' field cannot be empty",
            ));
        }

        let start = parse_date(&self.start_date).map_err(|_| {
            ValidationError::field(
                "startDate",
                format!(
                    "The 'startDate' field must be a YYYY-MM-DD date, got '{}'",
                    self.start_date
                ),
            )
        })?;
        let end = parse_date(&self.end_date).map_err(|_| {
            ValidationError::field(
                "endDate",
                format!(
                    "The 'endDate' field must be a YYYY-MM-DD date, got '{}'",
                    self.end_date
                ),
            )
        })?;
        if end < start {
            return Err(ValidationError::field(
                "endDate",
                "The 'endDate' must not be before 'startDate'",
            ));
        }

        if self.travelers == Some(0) {
            return Err(ValidationError::field(
                "travelers",
                "The 'travelers' field must be at least 1",
            ));
        }

        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(ValidationError::field(
                    "budget",
                    "The 'budget' field must be a non-negative number",
                ));
            }
        }

        validate_stops(&self.stops)
    }
}

/// Structured itinerary attached to an email request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItineraryDocument {
    #[serde(alias = "package_name")]
    pub package_name: String,
    pub summary: String,
    #[serde(alias = "total_duration")]
    pub total_duration: String,
    #[serde(alias = "total_cost")]
    pub total_cost: u64,
    #[serde(alias = "location_currency")]
    pub location_currency: String,
    pub start: String,
    pub end: String,
    #[serde(alias = "total_distance")]
    pub total_distance: String,
    #[serde(alias = "transport_mode")]
    pub transport_mode: String,
    pub stops: Vec<Stop>,
}

impl Validate for ItineraryDocument {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.package_name.trim().is_empty() {
            return Err(ValidationError::field(
                "itinerary.packageName",
                "The itinerary must have a package name",
            ));
        }
        if self.stops.is_empty() {
            return Err(ValidationError::field(
                "itinerary.stops",
                "The itinerary must contain at least one stop",
            ));
        }
        validate_stops(&self.stops)
    }
}

/// Request body for `POST /emails`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    /// Recipient address.
    #[serde(alias = "email")]
    pub to: String,

    pub itinerary: ItineraryDocument,
}

impl Validate for EmailRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_email(&self.to) {
            return Err(ValidationError::field(
                "to",
                format!("'{}' is not a valid email address", self.to),
            ));
        }
        self.itinerary.validate()
    }
}

/// Syntactic address check: one `@`, a non-empty local part and a dotted
/// domain without empty labels. No whitespace anywhere.
pub fn is_valid_email(address: &str) -> bool {
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}

/// Query parameters for `GET /feedback`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackQuery {
    #[serde(default, alias = "itinerary_id")]
    pub itinerary_id: Option<String>,
}

impl Validate for FeedbackQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        match &self.itinerary_id {
            Some(id) if id.trim().is_empty() => Err(ValidationError::field(
                "itineraryId",
                "The 'itineraryId' filter cannot be empty",
            )),
            _ => Ok(()),
        }
    }
}

/// Request body for `POST /feedback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    #[serde(alias = "itinerary_id")]
    pub itinerary_id: String,
    pub feedback: String,
}

impl FeedbackSubmission {
    /// Parsed feedback kind. Call after [`Validate::validate`].
    pub fn kind(&self) -> Result<FeedbackKind, ValidationError> {
        self.feedback
            .parse()
            .map_err(|msg: String| ValidationError::field("feedback", msg))
    }
}

impl Validate for FeedbackSubmission {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.itinerary_id.trim().is_empty() {
            return Err(ValidationError::field(
                "itineraryId",
                "The 'itineraryId' field cannot be empty",
            ));
        }
        self.kind().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paris() -> ItineraryRequest {
        serde_json::from_value(json!({
            "destination": "Paris",
            "startDate": "2025-06-01",
            "endDate": "2025-06-05"
        }))
        .unwrap()
    }

    #[test]
    fn test_itinerary_request_valid() {
        assert!(paris().validate().is_ok());
    }

    #[test]
    fn test_itinerary_request_empty_destination() {
        let mut request = paris();
        request.destination = "   ".into();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("destination"));
    }

    #[test]
    fn test_itinerary_request_bad_date() {
        let mut request = paris();
        request.start_date = "June 1st".into();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("startDate"));
    }

    #[test]
    fn test_itinerary_request_end_before_start() {
        let mut request = paris();
        request.end_date = "2025-05-30".into();
        let err = request.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("endDate"));

        request.end_date = request.start_date.clone();
        assert!(request.validate().is_ok(), "single-day trips are allowed");
    }

    #[test]
    fn test_itinerary_request_travelers_and_budget() {
        let mut request = paris();
        request.travelers = Some(0);
        assert_eq!(
            request.validate().unwrap_err().field.as_deref(),
            Some("travelers")
        );

        request.travelers = Some(2);
        request.budget = Some(-1.0);
        assert_eq!(
            request.validate().unwrap_err().field.as_deref(),
            Some("budget")
        );
    }

    #[test]
    fn test_itinerary_request_extra_fields_echoed() {
        let request: ItineraryRequest = serde_json::from_value(json!({
            "destination": " Paris ",
            "startDate": "2025-06-01",
            "endDate": "2025-06-05",
            "interests": ["art", "food"],
            "itineraryId": "client-supplied"
        }))
        .unwrap();

        let normalized = request.normalized();
        assert_eq!(normalized.destination, "Paris");

        let value = serde_json::to_value(&normalized).unwrap();
        assert_eq!(value["interests"], json!(["art", "food"]));
        assert!(value.get("itineraryId").is_none());
        assert!(value.get("travelers").is_none());
    }

    #[test]
    fn test_itinerary_request_snake_case_aliases() {
        let request: ItineraryRequest = serde_json::from_value(json!({
            "destination": "Paris",
            "start_date": "2025-06-01",
            "end_date": "2025-06-02"
        }))
        .unwrap();
        assert_eq!(request.start_date, "2025-06-01");
        assert!(request.extra.is_empty());
    }

    #[test]
    fn test_stop_coordinates() {
        assert_eq!(parse_coordinates("43.6426, -79.3871"), Some((43.6426, -79.3871)));
        assert!(parse_coordinates("91,0").is_none());
        assert!(parse_coordinates("0,181").is_none());
        assert!(parse_coordinates("CN Tower").is_none());
    }

    #[test]
    fn test_is_valid_email() {
        for ok in ["a@b.co", "first.last+trip@mail.example.org"] {
            assert!(is_valid_email(ok), "{ok} should be valid");
        }
        for bad in [
            "",
            "not-an-email",
            "@b.co",
            "a@b",
            "a@@b.co",
            "a@b..co",
            "a b@c.co",
            "a@.co",
        ] {
            assert!(!is_valid_email(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn test_email_request_accepts_email_alias() {
        let request: EmailRequest = serde_json::from_value(json!({
            "email": "traveler@example.com",
            "itinerary": {
                "package_name": "Toronto Highlights",
                "stops": [{
                    "location_name": "CN Tower",
                    "duration": "1.5 hours",
                    "cost": 43,
                    "currency": "CAD",
                    "google_map_coordinates": "43.6426,-79.3871"
                }]
            }
        }))
        .unwrap();

        assert_eq!(request.to, "traveler@example.com");
        assert_eq!(request.itinerary.package_name, "Toronto Highlights");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_email_request_requires_stops() {
        let request = EmailRequest {
            to: "a@b.co".into(),
            itinerary: ItineraryDocument {
                package_name: "Empty".into(),
                ..ItineraryDocument::default()
            },
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.field.as_deref(), Some("itinerary.stops"));
    }

    #[test]
    fn test_feedback_submission() {
        let submission = FeedbackSubmission {
            itinerary_id: "it-1".into(),
            feedback: "LIKE".into(),
        };
        assert!(submission.validate().is_ok());
        assert_eq!(submission.kind().unwrap(), FeedbackKind::Like);

        let submission = FeedbackSubmission {
            itinerary_id: "it-1".into(),
            feedback: "meh".into(),
        };
        assert_eq!(
            submission.validate().unwrap_err().field.as_deref(),
            Some("feedback")
        );
    }

    #[test]
    fn test_feedback_query_empty_filter() {
        let query = FeedbackQuery {
            itinerary_id: Some(" ".into()),
        };
        assert!(query.validate().is_err());
        assert!(FeedbackQuery::default().validate().is_ok());
    }
}
