// Tool declarations for the command catalog.

use serde::Serialize;

/// One command, as a decision engine would declare it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
    pub required: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<ItemSpec>,
}

/// Element type of an array parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSpec {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

fn param(name: &'static str, param_type: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        param_type,
        description,
        items: None,
    }
}

fn string_array(name: &'static str, description: &'static str, allowed: Vec<String>) -> ParamSpec {
    ParamSpec {
        name,
        param_type: "array",
        description,
        items: Some(ItemSpec {
            item_type: "string",
            allowed,
        }),
    }
}

/// Every command, with `topics` as the known controllable topics.
pub(super) fn specs(topics: &[String]) -> Vec<CommandSpec> {
    vec![
        CommandSpec {
            name: "iot_get_states",
            description: "Get the current states of IoT devices by topic.",
            parameters: vec![string_array(
                "topics",
                "Topic names of the devices to query",
                topics.to_vec(),
            )],
            required: vec!["topics"],
        },
        CommandSpec {
            name: "iot_set_states",
            description: "Set the states of IoT devices by topic.",
            parameters: vec![
                string_array(
                    "topics",
                    "Topic names of the devices to control",
                    topics.to_vec(),
                ),
                string_array(
                    "states",
                    "State for each topic, in the same order",
                    vec!["ON".into(), "OFF".into()],
                ),
            ],
            required: vec!["topics", "states"],
        },
        CommandSpec {
            name: "get_mails",
            description: "Retrieve recent emails, or one email by id.",
            parameters: vec![
                param("id", "string", "Message id to return [Optional]"),
                param(
                    "number_of_mail",
                    "integer",
                    "How many recent messages to return [Optional, default 5]",
                ),
            ],
            required: vec![],
        },
        CommandSpec {
            name: "send_mail",
            description: "Send an email on behalf of the user.",
            parameters: vec![
                param("to", "string", "Recipient address"),
                param("subject", "string", "Subject line"),
                param("body", "string", "Plain-text body"),
            ],
            required: vec!["to", "subject", "body"],
        },
        CommandSpec {
            name: "get_events",
            description: "Retrieve upcoming calendar events.",
            parameters: vec![],
            required: vec![],
        },
        CommandSpec {
            name: "set_event",
            description: "Create a calendar event.",
            parameters: vec![
                param("summary", "string", "Event title"),
                param("start_time", "string", "Start, YYYY-MM-DD HH:MM:SS (UTC)"),
                param("end_time", "string", "End, YYYY-MM-DD HH:MM:SS (UTC)"),
                param("location", "string", "Location [Optional]"),
                param("description", "string", "Details [Optional]"),
            ],
            required: vec!["summary", "start_time", "end_time"],
        },
        CommandSpec {
            name: "get_news",
            description: "Get the latest text from the news source.",
            parameters: vec![],
            required: vec![],
        },
        CommandSpec {
            name: "get_state",
            description: "Get the full aggregated state, including telemetry features.",
            parameters: vec![],
            required: vec![],
        },
    ]
}
