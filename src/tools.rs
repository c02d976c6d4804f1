//! Tool dispatch boundary
//!
//! The realtime model fetches hospital data on demand through function
//! calls instead of carrying it in the instructions. `ToolDispatcher` is
//! the contract the session depends on; `HospitalTools` is the production
//! implementation over the knowledge base.

use crate::knowledge;
use serde_json::{json, Value};
use tracing::warn;

/// Executes tool calls requested by the model.
///
/// `invoke` must never fail past this boundary: internal failures are
/// converted to textual error results so the conversation can continue.
pub trait ToolDispatcher: Send + Sync {
    fn invoke(&self, name: &str, arguments: &Value) -> String;

    /// Tool definitions advertised in the session configuration.
    fn catalogue(&self) -> Vec<Value>;
}

/// Hospital data tools backed by the static knowledge base.
pub struct HospitalTools;

impl HospitalTools {
    fn string_arg(arguments: &Value, key: &str) -> String {
        arguments
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

impl ToolDispatcher for HospitalTools {
    fn invoke(&self, name: &str, arguments: &Value) -> String {
        match name {
            "get_hospital_info" => knowledge::hospital_info(),
            "get_facilities" => knowledge::facilities(),
            "get_all_doctors" => knowledge::all_doctors_summary(),
            "get_doctor_details" => {
                knowledge::doctor_details(&Self::string_arg(arguments, "doctor_name"))
            }
            "get_department_info" => {
                knowledge::department_info(&Self::string_arg(arguments, "department"))
            }
            "get_specialties" => knowledge::specialties_for_routing(),
            "get_second_opinion_info" => knowledge::second_opinion_info(),
            other => {
                warn!("model requested unknown tool: {}", other);
                format!("Unknown tool: {}", other)
            }
        }
    }

    fn catalogue(&self) -> Vec<Value> {
        vec![
            json!({
                "type": "function",
                "name": "get_hospital_info",
                "description": "Get hospital contact details including address, phone numbers, email, website, and operating hours. Use this when caller asks about hospital location, contact, or timings.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            }),
            json!({
                "type": "function",
                "name": "get_facilities",
                "description": "Get list of hospital facilities and services like ICU, lab, pharmacy, ambulance, operation theatres. Use when caller asks what services are available.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            }),
            json!({
                "type": "function",
                "name": "get_all_doctors",
                "description": "Get a summary list of all doctors with their departments. Use when caller asks to know available doctors or wants an overview.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            }),
            json!({
                "type": "function",
                "name": "get_doctor_details",
                "description": "Get detailed information about a specific doctor including specialization, department, and timing. Use when caller asks about a specific doctor by name.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "doctor_name": {
                            "type": "string",
                            "description": "Name or partial name of the doctor to look up"
                        }
                    },
                    "required": ["doctor_name"]
                }
            }),
            json!({
                "type": "function",
                "name": "get_department_info",
                "description": "Get information about a specific department including doctors and conditions treated. Use when caller asks about a specialty like orthopedics, gynecology, etc.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "department": {
                            "type": "string",
                            "description": "Department name like 'orthopedics', 'ent', 'eye', 'gynecology', 'pediatrics', 'urology', etc."
                        }
                    },
                    "required": ["department"]
                }
            }),
            json!({
                "type": "function",
                "name": "get_specialties",
                "description": "Get ALL hospital departments with what conditions each handles. Use this to intelligently recommend the best specialty for a patient's symptoms. YOU decide which department fits best based on their symptoms.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            }),
            json!({
                "type": "function",
                "name": "get_second_opinion_info",
                "description": "Get details about the hospital's FREE online second opinion service at secondopinion.org. Use when caller asks about second opinion, wants to verify if surgery is needed, mentions being confused about diagnosis, or wants expert review of their case before deciding on treatment.",
                "parameters": {"type": "object", "properties": {}, "required": []}
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_known_tools() {
        let tools = HospitalTools;
        let empty = json!({});

        assert!(tools.invoke("get_hospital_info", &empty).contains("Delhi Hospital"));
        assert!(tools.invoke("get_facilities", &empty).contains("ICU"));
        assert!(tools
            .invoke("get_doctor_details", &json!({"doctor_name": "Anil Sharma"}))
            .contains("Orthopedics"));
        assert!(tools
            .invoke("get_department_info", &json!({"department": "urology"}))
            .contains("Urologist"));
    }

    #[test]
    fn test_unknown_tool_yields_text_not_failure() {
        let tools = HospitalTools;
        let result = tools.invoke("book_flight", &json!({}));
        assert!(result.contains("Unknown tool"));
    }

    #[test]
    fn test_missing_arguments_degrade_gracefully() {
        let tools = HospitalTools;
        // No doctor_name at all: a not-found message, not a crash.
        let result = tools.invoke("get_doctor_details", &json!({}));
        assert!(result.contains("not found"));
        // Wrong argument type behaves the same.
        let result = tools.invoke("get_doctor_details", &json!({"doctor_name": 7}));
        assert!(result.contains("not found"));
    }

    #[test]
    fn test_catalogue_covers_every_tool() {
        let tools = HospitalTools;
        let catalogue = tools.catalogue();
        assert_eq!(catalogue.len(), 7);
        for def in &catalogue {
            assert_eq!(def["type"], "function");
            let name = def["name"].as_str().unwrap();
            // Every advertised tool must be invokable.
            let result = tools.invoke(name, &json!({}));
            assert!(!result.contains("Unknown tool"), "tool {} not wired", name);
        }
    }
}
