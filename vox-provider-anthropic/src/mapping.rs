//! Request/response mapping between vox-llm types and the Anthropic
//! Messages API format.

use vox_llm::{
    ContentPart, ProviderError, ProviderRequest, ProviderResponse, Role, StopReason, TokenUsage,
};

/// Convert a [`ProviderRequest`] into the Anthropic Messages API JSON
/// body.
#[must_use]
pub(crate) fn to_api_request(req: &ProviderRequest, default_model: &str) -> serde_json::Value {
    let model = req.model.clone().unwrap_or_else(|| default_model.into());

    let mut body = serde_json::json!({
        "model": model,
        "messages": map_messages(req),
        "max_tokens": req.max_tokens.unwrap_or(4096),
    });

    if let Some(system) = &req.system {
        body["system"] = serde_json::Value::String(system.clone());
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }
    if !req.tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            req.tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect(),
        );
    }

    // Provider-specific passthrough merges last and can override
    // anything above.
    if let (serde_json::Value::Object(extra), serde_json::Value::Object(map)) =
        (&req.extra, &mut body)
    {
        for (k, v) in extra {
            map.insert(k.clone(), v.clone());
        }
    }

    body
}

fn map_messages(req: &ProviderRequest) -> serde_json::Value {
    let arr: Vec<serde_json::Value> = req
        .messages
        .iter()
        .filter_map(|msg| {
            // System content goes in the top-level "system" field, never
            // inline.
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => return None,
            };
            let content: Vec<serde_json::Value> = msg.content.iter().map(map_part).collect();
            Some(serde_json::json!({ "role": role, "content": content }))
        })
        .collect();
    serde_json::Value::Array(arr)
}

fn map_part(part: &ContentPart) -> serde_json::Value {
    match part {
        ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
        ContentPart::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use", "id": id, "name": name, "input": input,
        }),
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

/// Map the Anthropic response body back into a [`ProviderResponse`].
pub(crate) fn from_api_response(
    json: &serde_json::Value,
) -> Result<ProviderResponse, ProviderError> {
    let content = json["content"]
        .as_array()
        .ok_or_else(|| ProviderError::InvalidResponse("missing content array".into()))?
        .iter()
        .filter_map(parse_part)
        .collect();

    let stop_reason = match json["stop_reason"].as_str() {
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("refusal") => StopReason::ContentFilter,
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "unknown stop_reason {other:?}"
            )));
        }
    };

    let usage = TokenUsage {
        input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
        cache_read_tokens: json["usage"]["cache_read_input_tokens"].as_u64(),
        cache_creation_tokens: json["usage"]["cache_creation_input_tokens"].as_u64(),
    };

    Ok(ProviderResponse {
        content,
        stop_reason,
        usage,
        model: json["model"].as_str().unwrap_or_default().to_string(),
        cost: None,
    })
}

fn parse_part(value: &serde_json::Value) -> Option<ContentPart> {
    match value["type"].as_str()? {
        "text" => Some(ContentPart::Text {
            text: value["text"].as_str()?.to_string(),
        }),
        "tool_use" => Some(ContentPart::ToolUse {
            id: value["id"].as_str()?.to_string(),
            name: value["name"].as_str()?.to_string(),
            input: value["input"].clone(),
        }),
        // Thinking and other block types are not consumed by the runtime.
        _ => None,
    }
}

/// Map an HTTP status code to a [`ProviderError`].
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 => ProviderError::AuthFailed(body.to_string()),
        429 => ProviderError::RateLimited,
        500..=599 => ProviderError::RequestFailed(format!("HTTP {status}: {body}")),
        _ => ProviderError::InvalidResponse(format!("HTTP {status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vox_llm::{ProviderMessage, ToolSchema};

    #[test]
    fn request_maps_tools_and_system() {
        let mut req = ProviderRequest::new(vec![ProviderMessage::user("hello")]);
        req.system = Some("You advise a nation.".into());
        req.tools = vec![ToolSchema {
            name: "keep_status_quo".into(),
            description: "Change nothing".into(),
            input_schema: json!({"type": "object"}),
        }];
        let body = to_api_request(&req, "default-model");
        assert_eq!(body["model"], "default-model");
        assert_eq!(body["system"], "You advise a nation.");
        assert_eq!(body["tools"][0]["name"], "keep_status_quo");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn extra_overrides_body() {
        let mut req = ProviderRequest::new(vec![ProviderMessage::user("x")]);
        req.extra = json!({"max_tokens": 99});
        let body = to_api_request(&req, "m");
        assert_eq!(body["max_tokens"], 99);
    }

    #[test]
    fn response_parses_tool_use() {
        let json = json!({
            "content": [
                {"type": "text", "text": "Using a tool."},
                {"type": "tool_use", "id": "tu_1", "name": "set_research",
                 "input": {"Technology": "TECH_POTTERY"}}
            ],
            "stop_reason": "tool_use",
            "model": "m",
            "usage": {"input_tokens": 5, "output_tokens": 9}
        });
        let response = from_api_response(&json).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "set_research");
    }

    #[test]
    fn unknown_stop_reason_is_an_error() {
        let json = json!({"content": [], "stop_reason": "mystery", "usage": {}});
        assert!(from_api_response(&json).is_err());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_http_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            map_http_status(reqwest::StatusCode::UNAUTHORIZED, "bad key"),
            ProviderError::AuthFailed(_)
        ));
        assert!(
            map_http_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oops").is_retryable()
        );
    }
}
