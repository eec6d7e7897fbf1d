//! Shared HTTP utilities for the contact intake workspace.
//!
//! Provides the JSON response envelope used by every endpoint:
//! `{"success": bool, "message": string, "data"?: object}`.

use serde::Serialize;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Response envelope. `data` is omitted from the JSON when absent.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Create a success envelope carrying `data`.
///
/// Returns: `{"success": true, "message": "<message>", "data": {...}}`
pub fn json_success<T: Serialize>(message: &str, data: T) -> serde_json::Value {
    let env = Envelope {
        success: true,
        message: message.to_string(),
        data: Some(data),
    };
    serde_json::to_value(env).unwrap_or_else(|_| json_failure("internal"))
}

/// Create a failure envelope with a default message based on the code.
///
/// Returns: `{"success": false, "message": "<default message>"}`
pub fn json_failure(code: &str) -> serde_json::Value {
    let message = match code {
        "bad_request" => "Format de données invalide",
        "insert_failed" => "Erreur lors de l'ajout du contact",
        "commit_failed" => "Erreur lors de la finalisation de l'ajout",
        "error" | "internal" => "Erreur interne du serveur",
        _ => code, // Fallback to code as message for unknown codes
    };
    json_failure_with_message(message)
}

/// Create a failure envelope with a custom message.
pub fn json_failure_with_message(message: &str) -> serde_json::Value {
    serde_json::json!({"success": false, "message": message})
}
