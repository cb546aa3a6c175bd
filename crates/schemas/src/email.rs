// Email activity payloads

use serde::{Deserialize, Serialize};

/// Input of the send-email activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailInput {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Result of a delivered email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailOutput {
    pub success: bool,
    pub message_id: String,

    /// Delivery time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_wire_format() {
        let output = SendEmailOutput {
            success: true,
            message_id: "m-1".to_string(),
            timestamp: 1_760_000_000_123,
        };

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"success": true, "messageId": "m-1", "timestamp": 1_760_000_000_123_i64})
        );
    }
}
