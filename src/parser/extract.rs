//! Entity extraction (§4.1 step 4): regex patterns over normalised text,
//! optionally augmented by an LLM-based semantic extractor whose entries
//! are accepted only above a confidence floor.

use regex::Regex;

use crate::types::FieldValue;

use std::collections::BTreeMap;

/// One entity an (optional) LLM semantic extractor proposes, alongside the
/// confidence it reports for the value (§4.1 step 4).
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub field: String,
    pub value: FieldValue,
    pub confidence: f64,
}

/// Confidence floor above which an LLM-proposed entity is accepted
/// (§4.1 step 4: "values with confidence >= 0.8 are accepted").
const CONFIDENCE_FLOOR: f64 = 0.8;

/// Run every regex pattern against `text`, returning whatever entities it
/// recognises. Unmatched patterns simply contribute nothing — this is not
/// a validation step (§4.1 step 5, field filtering, handles rejection).
pub fn extract_regex_entities(text: &str) -> BTreeMap<String, FieldValue> {
    let mut out = BTreeMap::new();

    if let Some(flight) = extract_flight_no(text) {
        out.insert("flight_no_display".to_string(), FieldValue::Text(flight.clone()));
        out.insert("flight_no".to_string(), FieldValue::Text(flight.to_uppercase().replace(' ', "")));
    }

    if let Some((canonical, display)) = extract_position(text) {
        out.insert("position_display".to_string(), FieldValue::Text(display));
        out.insert("position".to_string(), FieldValue::Text(canonical));
    }

    if let Some(fluid) = extract_one(text, &[("燃油", "FUEL"), ("FUEL", "FUEL"), ("液压", "HYDRAULIC"), ("HYDRAULIC", "HYDRAULIC"), ("滑油", "OIL"), ("OIL", "OIL")]) {
        out.insert("fluid_type".to_string(), FieldValue::Text(fluid.to_string()));
    }

    if let Some(status) = extract_one(text, &[("APU", "APU"), ("停车", "STOPPED"), ("STOPPED", "STOPPED"), ("运转", "RUNNING"), ("RUNNING", "RUNNING")]) {
        out.insert("engine_status".to_string(), FieldValue::Text(status.to_string()));
    }

    if let Some(size) = extract_one(text, &[("大量", "LARGE"), ("LARGE", "LARGE"), ("中等", "MEDIUM"), ("MEDIUM", "MEDIUM"), ("少量", "SMALL"), ("SMALL", "SMALL")]) {
        out.insert("leak_size".to_string(), FieldValue::Text(size.to_string()));
    }

    if let Some(phase) = extract_one(text, &[("起飞", "TAKEOFF"), ("TAKEOFF", "TAKEOFF"), ("降落", "LANDING"), ("LANDING", "LANDING"), ("滑行", "TAXI"), ("TAXI", "TAXI")]) {
        out.insert("bird_strike_phase".to_string(), FieldValue::Text(phase.to_string()));
    }

    if text.contains("持续") || text.to_uppercase().contains("CONTINUOUS") {
        out.insert("continuous".to_string(), FieldValue::Bool(true));
    }

    out
}

fn extract_one<'a>(text: &str, table: &[(&'a str, &'a str)]) -> Option<&'a str> {
    table.iter().find(|(needle, _)| text.contains(needle)).map(|(_, value)| *value)
}

fn extract_flight_no(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)\b([A-Z]{2,3}\d{2,4})\b").expect("valid regex");
    re.captures(text).map(|c| c[1].to_string())
}

/// Runway/stand/taxiway position, returning `(bare_token, display_text)`.
/// `position` stores the bare identifier (e.g. `"27L"`, `"217"`) rather
/// than a prefixed node id — `tools::spatial::resolve_position_node` tries
/// the bare token against the topology first and only falls back to its
/// own `STAND_`/`TWY_`/`RWY_` prefixing, so prefixing here would make it
/// double up (§8 example 1 `position="217"`, example 2 `position="27L"`).
fn extract_position(text: &str) -> Option<(String, String)> {
    let runway = Regex::new(r"(?:跑道|RWY|RUNWAY)[\s\-]*(\d{1,2}[LRC]?)").expect("valid regex");
    if let Some(c) = runway.captures(text) {
        return Some((c[1].to_uppercase(), c[0].to_string()));
    }
    let taxiway = Regex::new(r"(?:滑行道|TWY|TAXIWAY)[\s\-]*([A-Z]\d*)").expect("valid regex");
    if let Some(c) = taxiway.captures(text) {
        return Some((c[1].to_uppercase(), c[0].to_string()));
    }
    // Stand mentions appear in either order ("机位217" or "502机位"), plus
    // the plain "STAND" form.
    let stand = Regex::new(r"(?:机位[\s\-]*([A-Z]?\d+)|([A-Z]?\d+)[\s\-]*机位|STAND[\s\-]*([A-Z]?\d+))").expect("valid regex");
    if let Some(c) = stand.captures(text) {
        let id = c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3))?.as_str().to_uppercase();
        return Some((id, c[0].to_string()));
    }
    None
}

/// Fold LLM-proposed entities into regex-derived ones. Entities below the
/// confidence floor are discarded; accepted entities overwrite whatever the
/// regex pass found for the same field, since a semantic extractor sees
/// context regex patterns cannot (§4.1 step 4).
pub fn merge_llm_entities(
    mut entities: BTreeMap<String, FieldValue>,
    llm_entities: &[ExtractedEntity],
) -> BTreeMap<String, FieldValue> {
    for entity in llm_entities {
        if entity.confidence >= CONFIDENCE_FLOOR {
            entities.insert(entity.field.clone(), entity.value.clone());
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_flight_no_and_runway() {
        let entities = extract_regex_entities("CCA1234 跑道27L 大量燃油泄漏，发动机停车");
        assert_eq!(entities.get("flight_no").unwrap().as_text(), Some("CCA1234"));
        assert_eq!(entities.get("position").unwrap().as_text(), Some("27L"));
        assert_eq!(entities.get("fluid_type").unwrap().as_text(), Some("FUEL"));
        assert_eq!(entities.get("leak_size").unwrap().as_text(), Some("LARGE"));
        assert_eq!(entities.get("engine_status").unwrap().as_text(), Some("STOPPED"));
    }

    #[test]
    fn extracts_stand_position() {
        let entities = extract_regex_entities("机位42 发现异物");
        assert_eq!(entities.get("position").unwrap().as_text(), Some("42"));
    }

    #[test]
    fn extracts_stand_position_with_digits_before_keyword() {
        let entities = extract_regex_entities("CA1234在502机位发现少量滑油");
        assert_eq!(entities.get("position").unwrap().as_text(), Some("502"));
    }

    #[test]
    fn low_confidence_llm_entity_is_discarded() {
        let base = BTreeMap::new();
        let merged = merge_llm_entities(
            base,
            &[ExtractedEntity { field: "fluid_type".to_string(), value: FieldValue::Text("FUEL".to_string()), confidence: 0.5 }],
        );
        assert!(merged.get("fluid_type").is_none());
    }

    #[test]
    fn high_confidence_llm_entity_overrides_regex() {
        let mut base = BTreeMap::new();
        base.insert("fluid_type".to_string(), FieldValue::Text("OIL".to_string()));
        let merged = merge_llm_entities(
            base,
            &[ExtractedEntity { field: "fluid_type".to_string(), value: FieldValue::Text("HYDRAULIC".to_string()), confidence: 0.9 }],
        );
        assert_eq!(merged.get("fluid_type").unwrap().as_text(), Some("HYDRAULIC"));
    }
}
