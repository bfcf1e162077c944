//! JSON schema definitions for the messaging tools a worker exposes to its
//! language model.

use serde::Serialize;
use serde_json::json;

pub const SEND_MESSAGE_TOOL: &str = "send_message";
pub const RECEIVE_MESSAGES_TOOL: &str = "receive_messages";

/// A tool as advertised to a model provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

pub fn send_message_tool() -> ToolDefinition {
    ToolDefinition {
        name: SEND_MESSAGE_TOOL.to_string(),
        description: "Send a message to another agent. Use this to communicate with other agents in the system.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "recipient_id": {
                    "type": "string",
                    "description": "The ID of the recipient agent"
                },
                "message": {
                    "type": "string",
                    "description": "The message to send"
                }
            },
            "required": ["recipient_id", "message"]
        }),
    }
}

pub fn receive_messages_tool() -> ToolDefinition {
    ToolDefinition {
        name: RECEIVE_MESSAGES_TOOL.to_string(),
        description: "Check for incoming messages from other agents. Use this to see if other agents have sent you any messages.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds to wait for messages",
                    "default": crate::receiver::DEFAULT_RECEIVE_TIMEOUT_SECS
                }
            },
            "required": []
        }),
    }
}

/// Tools for a worker, depending on whether it polls its own mailbox.
pub fn messaging_tools(include_receive: bool) -> Vec<ToolDefinition> {
    let mut tools = vec![send_message_tool()];
    if include_receive {
        tools.push(receive_messages_tool());
    }
    tools
}
