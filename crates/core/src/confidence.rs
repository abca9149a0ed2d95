//! Confidence aggregation over heterogeneous verification signals.
//!
//! Turns raw provider output (OCR entities, barcode/MRZ flags, biometric
//! similarity) into a single bounded confidence score plus structured
//! extracted fields. The score is advisory: automated tiers never approve on
//! it alone, so the extraction here is intentionally lenient - a false
//! positive only ever feeds a hint for staff review.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ExtractedFields, MachineReadable};

/// Token "some signal present" floor applied before any blending.
pub const CONFIDENCE_FLOOR: f64 = 0.65;

/// Flat bonus when any machine-readable feature (QR/PDF417/MRZ) is detected.
pub const MACHINE_READABLE_BONUS: f64 = 0.10;

/// Upper bound after the machine-readable bonus.
pub const CONFIDENCE_CAP: f64 = 0.99;

/// Entity confidence assumed when the provider omits one.
pub const DEFAULT_ENTITY_CONFIDENCE: f64 = 0.7;

/// Face-match confidence assumed when the premium provider omits the score.
pub const DEFAULT_PREMIUM_CONFIDENCE: f64 = 0.85;

/// Entity types that carry the document holder's name.
const NAME_ENTITY_TYPES: &[&str] = &["person", "name", "full_name"];
/// Entity types that carry the document number.
const ID_ENTITY_TYPES: &[&str] = &["id", "document_number", "id_number", "national_id"];
/// Entity types that carry the date of birth.
const BIRTH_ENTITY_TYPES: &[&str] = &["date_of_birth", "dob", "birth"];

static ID_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{7,10}\b").expect("Invalid regex"));

static BIRTH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[-/.]\d{2}[-/.]\d{2}\b|\b\d{2}[/.]\d{2}[/.]\d{4}\b")
        .expect("Invalid regex")
});

static FIRST_NAME_PROP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)first|given").expect("Invalid regex"));

static LAST_NAME_PROP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)last|family").expect("Invalid regex"));

/// A sub-property of an OCR entity (e.g. the given-name part of a name).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProperty {
    #[serde(rename = "type", default)]
    pub property_type: String,
    #[serde(default)]
    pub mention_text: Option<String>,
}

/// One entity recognized by the OCR/vision provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrEntity {
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub mention_text: Option<String>,
    #[serde(default)]
    pub properties: Vec<EntityProperty>,
}

/// Typed document-tier provider output.
///
/// Parsed from the provider response at the service boundary; payloads that
/// do not match this shape are rejected there rather than accessed
/// defensively at every use site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub entities: Vec<OcrEntity>,
    #[serde(rename = "barcodeFlags", default)]
    pub machine_readable: MachineReadable,
}

/// Aggregate a document analysis into a single bounded confidence score.
///
/// Baseline 0.65; when OCR entities exist their mean confidence replaces the
/// baseline if greater; any machine-readable flag adds a flat +0.10, capped
/// at 0.99.
#[must_use]
pub fn aggregate_score(analysis: &DocumentAnalysis) -> f64 {
    let mut score = CONFIDENCE_FLOOR;

    if !analysis.entities.is_empty() {
        let sum: f64 = analysis
            .entities
            .iter()
            .map(|e| e.confidence.unwrap_or(DEFAULT_ENTITY_CONFIDENCE))
            .sum();
        #[allow(clippy::cast_precision_loss)] // Entity counts are tiny
        let mean = sum / analysis.entities.len() as f64;
        score = score.max(mean);
    }

    if analysis.machine_readable.any() {
        score = (score + MACHINE_READABLE_BONUS).min(CONFIDENCE_CAP);
    }

    score.clamp(0.0, 1.0)
}

/// The authoritative confidence for a premium-tier attempt.
///
/// The webhook-supplied face-match score supersedes any document-tier score
/// for that attempt; it is never blended.
#[must_use]
pub fn premium_score(face_match: Option<f64>) -> f64 {
    face_match
        .unwrap_or(DEFAULT_PREMIUM_CONFIDENCE)
        .clamp(0.0, 1.0)
}

/// Extract structured identity fields from the analysis.
///
/// Entities are matched by fuzzy type substring against a small controlled
/// vocabulary; when structured entities are absent, free-text regexes over
/// the OCR blob fill in the ID number and birth date.
#[must_use]
pub fn extract_fields(analysis: &DocumentAnalysis) -> ExtractedFields {
    let name_entity = find_entity(analysis, NAME_ENTITY_TYPES);
    let id_entity = find_entity(analysis, ID_ENTITY_TYPES);
    let birth_entity = find_entity(analysis, BIRTH_ENTITY_TYPES);

    let first_name = name_entity.and_then(|e| property_text(e, &FIRST_NAME_PROP_RE));
    let last_name = name_entity.and_then(|e| property_text(e, &LAST_NAME_PROP_RE));

    let id_number = id_entity
        .and_then(|e| e.mention_text.clone())
        .or_else(|| {
            ID_NUMBER_RE
                .find(&analysis.full_text)
                .map(|m| m.as_str().to_owned())
        });

    let birth_date = birth_entity
        .and_then(|e| e.mention_text.clone())
        .or_else(|| {
            BIRTH_DATE_RE
                .find(&analysis.full_text)
                .map(|m| m.as_str().to_owned())
        });

    ExtractedFields {
        first_name,
        last_name,
        id_number,
        birth_date,
        reason: None,
    }
}

/// First entity whose lowercased type contains any of the given needles.
fn find_entity<'a>(analysis: &'a DocumentAnalysis, needles: &[&str]) -> Option<&'a OcrEntity> {
    analysis.entities.iter().find(|e| {
        let ty = e.entity_type.to_lowercase();
        needles.iter().any(|needle| ty.contains(needle))
    })
}

/// Mention text of the first property whose type matches the regex.
fn property_text(entity: &OcrEntity, re: &Regex) -> Option<String> {
    entity
        .properties
        .iter()
        .find(|p| re.is_match(&p.property_type))
        .and_then(|p| p.mention_text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(ty: &str, confidence: Option<f64>, mention: Option<&str>) -> OcrEntity {
        OcrEntity {
            entity_type: ty.to_owned(),
            confidence,
            mention_text: mention.map(str::to_owned),
            properties: Vec::new(),
        }
    }

    #[test]
    fn test_floor_with_no_signal() {
        let analysis = DocumentAnalysis::default();
        assert!((aggregate_score(&analysis) - CONFIDENCE_FLOOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entity_mean_replaces_floor_when_greater() {
        let analysis = DocumentAnalysis {
            entities: vec![
                entity("id_number", Some(0.9), None),
                entity("person", Some(0.8), None),
            ],
            ..DocumentAnalysis::default()
        };
        let score = aggregate_score(&analysis);
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_low_entity_mean_keeps_floor() {
        let analysis = DocumentAnalysis {
            entities: vec![entity("id_number", Some(0.3), None)],
            ..DocumentAnalysis::default()
        };
        assert!((aggregate_score(&analysis) - CONFIDENCE_FLOOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_entity_confidence_counts_as_default() {
        let analysis = DocumentAnalysis {
            entities: vec![entity("id_number", None, None)],
            ..DocumentAnalysis::default()
        };
        assert!((aggregate_score(&analysis) - DEFAULT_ENTITY_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_machine_readable_bonus_is_capped() {
        let analysis = DocumentAnalysis {
            entities: vec![entity("id_number", Some(0.95), None)],
            machine_readable: MachineReadable {
                mrz: true,
                ..MachineReadable::default()
            },
            ..DocumentAnalysis::default()
        };
        // min(0.99, 0.95 + 0.10), not 1.05.
        assert!((aggregate_score(&analysis) - CONFIDENCE_CAP).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bonus_applies_on_top_of_floor() {
        let analysis = DocumentAnalysis {
            machine_readable: MachineReadable {
                qr: true,
                ..MachineReadable::default()
            },
            ..DocumentAnalysis::default()
        };
        assert!((aggregate_score(&analysis) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_premium_score_default_and_clamp() {
        assert!((premium_score(None) - DEFAULT_PREMIUM_CONFIDENCE).abs() < f64::EPSILON);
        assert!((premium_score(Some(0.93)) - 0.93).abs() < f64::EPSILON);
        assert!((premium_score(Some(7.0)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extracts_name_from_properties() {
        let analysis = DocumentAnalysis {
            entities: vec![OcrEntity {
                entity_type: "person".to_owned(),
                confidence: Some(0.9),
                mention_text: Some("PEREZ JUAN".to_owned()),
                properties: vec![
                    EntityProperty {
                        property_type: "given_name".to_owned(),
                        mention_text: Some("JUAN".to_owned()),
                    },
                    EntityProperty {
                        property_type: "family_name".to_owned(),
                        mention_text: Some("PEREZ".to_owned()),
                    },
                ],
            }],
            ..DocumentAnalysis::default()
        };
        let fields = extract_fields(&analysis);
        assert_eq!(fields.first_name.as_deref(), Some("JUAN"));
        assert_eq!(fields.last_name.as_deref(), Some("PEREZ"));
    }

    #[test]
    fn test_id_number_prefers_entity_over_regex() {
        let analysis = DocumentAnalysis {
            full_text: "DOCUMENTO 99887766".to_owned(),
            entities: vec![entity("document_number", Some(0.9), Some("30111222"))],
            ..DocumentAnalysis::default()
        };
        let fields = extract_fields(&analysis);
        assert_eq!(fields.id_number.as_deref(), Some("30111222"));
    }

    #[test]
    fn test_id_number_regex_fallback() {
        let analysis = DocumentAnalysis {
            full_text: "REPUBLICA ... DNI 30111222 EJEMPLAR A".to_owned(),
            ..DocumentAnalysis::default()
        };
        let fields = extract_fields(&analysis);
        assert_eq!(fields.id_number.as_deref(), Some("30111222"));
    }

    #[test]
    fn test_birth_date_regex_fallback_formats() {
        for (text, expected) in [
            ("Nacimiento: 1990-04-17", "1990-04-17"),
            ("Fecha 17/04/1990 ...", "17/04/1990"),
            ("Fecha 17.04.1990 ...", "17.04.1990"),
            ("Fecha 1990/04/17 ...", "1990/04/17"),
        ] {
            let analysis = DocumentAnalysis {
                full_text: text.to_owned(),
                ..DocumentAnalysis::default()
            };
            let fields = extract_fields(&analysis);
            assert_eq!(fields.birth_date.as_deref(), Some(expected), "{text}");
        }
    }

    #[test]
    fn test_no_fields_from_empty_analysis() {
        let fields = extract_fields(&DocumentAnalysis::default());
        assert!(fields.first_name.is_none());
        assert!(fields.last_name.is_none());
        assert!(fields.id_number.is_none());
        assert!(fields.birth_date.is_none());
    }

    #[test]
    fn test_wire_shape_parses() {
        let json = serde_json::json!({
            "fullText": "DNI 30111222",
            "entities": [
                {"type": "id_number", "confidence": 0.91, "mentionText": "30111222"}
            ],
            "barcodeFlags": {"qr": false, "pdf417": true, "mrz": false}
        });
        let analysis: DocumentAnalysis =
            serde_json::from_value(json).expect("wire shape should parse");
        assert!(analysis.machine_readable.pdf417);
        assert_eq!(analysis.entities.len(), 1);
    }
}
