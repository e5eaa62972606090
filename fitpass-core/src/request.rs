//! Inbound enrollment request and outbound result contracts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consent::{ConsentGrant, ConsentId};
use crate::credential::{CaptureSource, CredentialState, EnrollmentId};
use crate::embedding::EmbeddingPayload;
use crate::error::EnrollmentError;
use crate::person::{PersonId, PersonProfile};
use crate::policy::Thresholds;

/// A parsed one-shot enrollment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRequest {
    pub person: PersonProfile,
    pub consent: ConsentGrant,
    pub source: CaptureSource,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Correlation hint. Not used for deduplication.
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub embedding: Option<EmbeddingPayload>,
    #[serde(default)]
    pub liveness_score: Option<f64>,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

/// Outcome of a committed enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResult {
    pub person_id: PersonId,
    /// `None` when the person had already accepted this policy version.
    pub consent_id: Option<ConsentId>,
    pub enrollment_id: EnrollmentId,
    pub state: CredentialState,
    pub thresholds: Thresholds,
}

/// Parse and field-check a JSON request body.
///
/// Embedding *contents* are not inspected here; they are validated during
/// the attempt so that error precedence follows the enrollment sequence.
pub fn parse_request(body: serde_json::Value) -> Result<EnrollmentRequest, EnrollmentError> {
    let request: EnrollmentRequest = serde_json::from_value(body)
        .map_err(|e| EnrollmentError::InvalidRequestShape(e.to_string()))?;
    check_fields(&request)?;
    Ok(request)
}

pub fn parse_request_str(body: &str) -> Result<EnrollmentRequest, EnrollmentError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| EnrollmentError::InvalidRequestShape(e.to_string()))?;
    parse_request(value)
}

fn check_fields(request: &EnrollmentRequest) -> Result<(), EnrollmentError> {
    let invalid = |msg: &str| Err(EnrollmentError::InvalidRequestShape(msg.to_string()));

    if request.person.first_name.trim().is_empty() {
        return invalid("person.firstName must not be empty");
    }
    if request.person.last_name.trim().is_empty() {
        return invalid("person.lastName must not be empty");
    }
    if let Some(email) = request.person.email.as_deref() {
        let email = email.trim();
        if !email.is_empty() && !looks_like_email(email) {
            return invalid("person.email is not a valid address");
        }
    }
    if request.consent.policy_version.trim().is_empty() {
        return invalid("consent.policyVersion must not be empty");
    }
    if matches!(request.branch_id, Some(id) if id <= 0) {
        return invalid("branchId must be positive");
    }
    if let Some(embedding) = &request.embedding {
        if embedding.dims == 0 {
            return invalid("embedding.dims must be positive");
        }
    }
    if !score_in_range(request.liveness_score) {
        return invalid("livenessScore must be within [0, 1]");
    }
    if !score_in_range(request.quality_score) {
        return invalid("qualityScore must be within [0, 1]");
    }
    Ok(())
}

fn score_in_range(score: Option<f64>) -> bool {
    score.map_or(true, |s| (0.0..=1.0).contains(&s))
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::RawVector;
    use crate::person::PersonKind;
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "person": {
                "kind": "MEMBER",
                "nationalId": "11111111-1",
                "firstName": "Ana",
                "lastName": "Rojas",
                "email": "ana@example.com"
            },
            "consent": { "policyVersion": "1.0", "accepted": true, "origin": "10.0.0.4" },
            "source": "KIOSK",
            "branchId": 3,
            "deviceId": "kiosk-01",
            "requestId": "8f8e1b62-6a8e-4f9e-9d55-0b7c1f3c9a10",
            "embedding": { "dims": 3, "values": [0.1, 0.2, 0.3] },
            "livenessScore": 0.95,
            "qualityScore": 0.9
        })
    }

    #[test]
    fn parses_full_request() {
        let request = parse_request(body()).unwrap();
        assert_eq!(request.person.kind, PersonKind::Member);
        assert_eq!(request.source, CaptureSource::Kiosk);
        assert!(request.consent.accepted);
        assert_eq!(request.branch_id, Some(3));
        assert_eq!(
            request.embedding.unwrap().values,
            RawVector::Numeric(vec![0.1, 0.2, 0.3])
        );
    }

    #[test]
    fn missing_required_field_is_invalid_shape() {
        let mut body = body();
        body["person"].as_object_mut().unwrap().remove("firstName");
        assert!(matches!(
            parse_request(body),
            Err(EnrollmentError::InvalidRequestShape(_))
        ));
    }

    #[test]
    fn unknown_source_is_invalid_shape() {
        let mut body = body();
        body["source"] = json!("DRONE");
        assert!(matches!(
            parse_request(body),
            Err(EnrollmentError::InvalidRequestShape(_))
        ));
    }

    #[test]
    fn malformed_embedding_values_are_deferred() {
        let mut body = body();
        body["embedding"]["values"] = json!([[0.1], [0.2]]);
        let request = parse_request(body).unwrap();
        assert!(matches!(
            request.embedding.unwrap().values,
            RawVector::Malformed(_)
        ));
    }

    #[test]
    fn refused_consent_still_parses() {
        let mut body = body();
        body["consent"]["accepted"] = json!(false);
        let request = parse_request(body).unwrap();
        assert!(!request.consent.accepted);
    }

    #[test]
    fn field_rules() {
        let cases = [
            ("/person/lastName", json!("  ")),
            ("/person/email", json!("not-an-email")),
            ("/consent/policyVersion", json!("")),
            ("/branchId", json!(0)),
            ("/livenessScore", json!(1.5)),
            ("/qualityScore", json!(-0.1)),
            ("/embedding/dims", json!(0)),
            ("/requestId", json!("not-a-uuid")),
        ];

        for (pointer, value) in cases {
            let mut body = body();
            *body.pointer_mut(pointer).unwrap() = value;
            assert!(
                matches!(parse_request(body), Err(EnrollmentError::InvalidRequestShape(_))),
                "{pointer} should be rejected"
            );
        }
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let request = parse_request_str(
            r#"{
                "person": {
                    "kind": "WORKER",
                    "firstName": "Luis",
                    "lastName": "Soto",
                    "email": "luis@gym.cl"
                },
                "consent": {"policyVersion": "2.1", "accepted": true},
                "source": "OPERATOR"
            }"#,
        )
        .unwrap();
        assert!(request.embedding.is_none());
        assert!(request.liveness_score.is_none());
        assert!(request.request_id.is_none());
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = EnrollmentResult {
            person_id: PersonId::new(1),
            consent_id: None,
            enrollment_id: EnrollmentId::new(9),
            state: CredentialState::Current,
            thresholds: Thresholds {
                similarity: 0.9,
                liveness: 0.8,
                quality: 0.85,
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["personId"], 1);
        assert_eq!(json["consentId"], serde_json::Value::Null);
        assert_eq!(json["enrollmentId"], 9);
        assert_eq!(json["state"], "CURRENT");
        assert_eq!(json["thresholds"]["liveness"], 0.8);
    }
}
