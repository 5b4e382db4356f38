//! Prompt text and schema hints for the four analysis jobs.
//!
//! Each prompt embeds its inputs as compact JSON and closes with the shape
//! the model must return. The gateway transport appends the final
//! JSON-only instruction.

use serde_json::{json, Map, Value};

use crate::profile::{Location, Profile};
use crate::sources::Facility;

pub const RISK_SCHEMA: &str = "risk assessment schema";
pub const SUPPLIES_SCHEMA: &str = "supplies checklist schema";
pub const EVACUATION_SCHEMA: &str = "evacuation recommendations schema";
pub const COMMS_SCHEMA: &str = "communication drafts schema";

const RISK_SHAPE: &str = r#"{"riskLevel":"low|moderate|high|extreme","activeThreats":[],"summary":""}"#;
const SUPPLIES_SHAPE: &str =
    r#"{"categories":[{"name":"","items":[{"name":"","quantity":"","reason":""}]}]}"#;
const EVACUATION_SHAPE: &str = r#"{"recommendations":[],"topFacilities":[]}"#;
const COMMS_SHAPE: &str = r#"{"sms":"<SMS in Filipino using real location name and nearest evacuation point>","barangayNotice":"<formal report in Filipino>","socialPost":"<English safety check-in post>","meetingPlan":"<specific meeting plan with real landmarks>"}"#;

fn profile_value(profile: Option<&Profile>) -> Value {
    profile
        .and_then(|p| serde_json::to_value(p).ok())
        .unwrap_or(Value::Null)
}

pub fn risk_prompt(location: &Location, sources: &Map<String, Value>) -> String {
    let mut input = Map::new();
    input.insert("locationName".into(), Value::String(location.name.clone()));
    for (name, value) in sources {
        input.insert(name.clone(), value.clone());
    }
    format!(
        "Analyze disaster risk for {} in the Philippines. Data: {}. Return JSON: {RISK_SHAPE}",
        location.name,
        Value::Object(input)
    )
}

pub fn supplies_prompt(risk: &Value, profile: Option<&Profile>, extra: &Map<String, Value>) -> String {
    let mut input = json!({
        "risk": risk,
        "profile": profile_value(profile),
    });
    if !extra.is_empty() {
        input["sources"] = Value::Object(extra.clone());
    }
    format!(
        "Generate a Philippines-focused emergency supply checklist based on: {input}. Return JSON: {SUPPLIES_SHAPE}"
    )
}

pub fn evacuation_prompt(
    location: &Location,
    risk: &Value,
    profile: Option<&Profile>,
    facilities: &[Facility],
) -> String {
    let input = json!({
        "location": location,
        "risk": risk,
        "profile": profile_value(profile),
        "facilities": facilities,
    });
    format!(
        "Recommend evacuation priorities from facilities data: {input}. Return JSON: {EVACUATION_SHAPE}"
    )
}

/// First evacuation point mentioned in the risk artifact, if any.
fn first_evacuation_point(risk: &Value) -> Value {
    ["/topFacilities/0", "/recommendations/0"]
        .iter()
        .find_map(|p| risk.pointer(p))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

pub fn comms_prompt(location: &Location, risk: &Value, profile: Option<&Profile>) -> String {
    let name = if location.name.trim().is_empty() {
        "the area"
    } else {
        location.name.as_str()
    };
    let evac = first_evacuation_point(risk);
    let contacts = profile
        .map(|p| serde_json::to_value(&p.emergency_contacts).unwrap_or(Value::Null))
        .unwrap_or(Value::Null);
    let household = profile_value(profile);
    format!(
        "Generate bilingual Filipino/English emergency communication drafts for someone located in \"{name}\", Philippines.\n\
         Use the ACTUAL location name \"{name}\" in every message; never leave placeholder brackets like [location].\n\
         Incorporate specific evacuation points or meeting places from the risk data when available: {evac}.\n\
         Emergency contacts: {contacts}.\n\
         Household profile: {household}.\n\
         Risk context: {risk}.\n\
         Return JSON: {COMMS_SHAPE}"
    )
}
