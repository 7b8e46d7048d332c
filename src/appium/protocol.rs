//! WebDriver 响应解码
//!
//! 服务器返回的 JSON 结构较为松散，这里统一转换为强类型结果，
//! 任何不符合约定的响应都视为协议错误。

use serde_json::{Map, Value};
use tracing::error;

use super::types::{CreatedSession, RemoteError, WindowRect, LEGACY_ELEMENT_KEY, W3C_ELEMENT_KEY};

/// 错误信息中保留的最大响应片段长度
const BODY_SNIPPET_LEN: usize = 200;

/// 解析后的响应信封
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub value: Value,
    /// JSONWP 旧协议把 sessionId 放在顶层
    pub session_id: Option<String>,
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

/// 解析 HTTP 响应，非 2xx 状态按 WebDriver 错误码分类
pub fn parse_envelope(status: u16, body: &str) -> Result<Envelope, RemoteError> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            error!("无法解析自动化服务器响应 (HTTP {}): {}", status, e);
            return Err(RemoteError::Protocol(format!(
                "HTTP {} 响应不是合法 JSON: {}",
                status,
                snippet(body)
            )));
        }
    };

    let Value::Object(mut root) = parsed else {
        return Err(RemoteError::Protocol(format!(
            "HTTP {} 响应不是 JSON 对象: {}",
            status,
            snippet(body)
        )));
    };

    let value = root.remove("value").ok_or_else(|| {
        RemoteError::Protocol(format!("HTTP {} 响应缺少 value 字段: {}", status, snippet(body)))
    })?;

    if !(200..300).contains(&status) {
        return Err(classify_error(status, &value));
    }

    // 部分服务器在 2xx 响应中也会返回错误对象
    if let Some(code) = value.get("error").and_then(Value::as_str) {
        if value.get("message").is_some() {
            return Err(classify_code(code, error_message(&value)));
        }
    }

    let session_id = match root.remove("sessionId") {
        Some(Value::String(id)) => Some(id),
        _ => None,
    };

    Ok(Envelope { value, session_id })
}

fn error_message(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn classify_error(status: u16, value: &Value) -> RemoteError {
    match value.get("error").and_then(Value::as_str) {
        Some(code) => classify_code(code, error_message(value)),
        None => RemoteError::Protocol(format!("HTTP {} 响应缺少 error 字段: {}", status, value)),
    }
}

/// 按 W3C 错误码分类
pub fn classify_code(code: &str, message: String) -> RemoteError {
    match code {
        "no such element" => RemoteError::NoSuchElement(message),
        "stale element reference" => RemoteError::StaleElement(message),
        "invalid session id" => RemoteError::InvalidSession(message),
        "session not created" => RemoteError::SessionNotCreated(message),
        other => RemoteError::WebDriver {
            code: other.to_string(),
            message,
        },
    }
}

/// 解码新建会话响应（兼容 W3C 与 JSONWP 两种格式）
pub fn decode_new_session(envelope: Envelope) -> Result<CreatedSession, RemoteError> {
    let Envelope { value, session_id } = envelope;

    let mut obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(RemoteError::Protocol(format!("新建会话响应格式错误: {}", other)));
        }
    };

    let session_id = match obj.remove("sessionId") {
        Some(Value::String(id)) => Some(id),
        Some(other) => {
            return Err(RemoteError::Protocol(format!("sessionId 不是字符串: {}", other)));
        }
        None => session_id,
    };

    let session_id = session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RemoteError::Protocol("新建会话响应缺少 sessionId".to_string()))?;

    let capabilities = match obj.remove("capabilities") {
        Some(Value::Object(caps)) => caps,
        Some(other) => {
            return Err(RemoteError::Protocol(format!("capabilities 不是对象: {}", other)));
        }
        // JSONWP 格式下 value 本身就是能力集合
        None => obj,
    };

    Ok(CreatedSession {
        session_id,
        capabilities,
    })
}

/// 解码元素引用
pub fn decode_element_ref(value: Value) -> Result<String, RemoteError> {
    let obj: Map<String, Value> = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(RemoteError::Protocol(format!("元素响应不是对象: {}", other)));
        }
    };

    let reference = obj
        .get(W3C_ELEMENT_KEY)
        .or_else(|| obj.get(LEGACY_ELEMENT_KEY))
        .ok_or_else(|| RemoteError::Protocol(format!("元素响应缺少引用字段: {:?}", obj)))?;

    match reference {
        Value::String(r) if !r.is_empty() => Ok(r.clone()),
        other => Err(RemoteError::Protocol(format!("元素引用格式错误: {}", other))),
    }
}

/// 解码字符串结果（页面源码、元素文本）
pub fn decode_string(value: Value) -> Result<String, RemoteError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(RemoteError::Protocol(format!("期望字符串，实际为: {}", other))),
    }
}

/// 解码无返回值的命令（点击、输入、删除会话等）
pub fn decode_unit(value: Value) -> Result<(), RemoteError> {
    match value {
        Value::Null => Ok(()),
        other => Err(RemoteError::Protocol(format!("期望 null，实际为: {}", other))),
    }
}

pub fn decode_window_rect(value: Value) -> Result<WindowRect, RemoteError> {
    let rect: WindowRect = serde_json::from_value(value.clone())
        .map_err(|e| RemoteError::Protocol(format!("窗口尺寸格式错误: {} ({})", value, e)))?;

    if rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(RemoteError::Protocol(format!(
            "窗口尺寸无效: {}x{}",
            rect.width, rect.height
        )));
    }

    Ok(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_w3c_new_session() {
        let body = json!({
            "value": {
                "sessionId": "abc-123",
                "capabilities": { "platformName": "Android", "appium:deviceName": "Emulator" }
            }
        })
        .to_string();

        let created = decode_new_session(parse_envelope(200, &body).unwrap()).unwrap();
        assert_eq!(created.session_id, "abc-123");
        assert_eq!(created.capabilities["platformName"], "Android");
    }

    #[test]
    fn test_legacy_new_session() {
        let body = json!({
            "sessionId": "legacy-1",
            "status": 0,
            "value": { "platformName": "iOS" }
        })
        .to_string();

        let created = decode_new_session(parse_envelope(200, &body).unwrap()).unwrap();
        assert_eq!(created.session_id, "legacy-1");
        assert_eq!(created.capabilities["platformName"], "iOS");
    }

    #[test]
    fn test_new_session_without_id_is_protocol_error() {
        let body = json!({ "value": { "capabilities": {} } }).to_string();
        let err = decode_new_session(parse_envelope(200, &body).unwrap()).unwrap_err();
        assert!(matches!(err, RemoteError::Protocol(_)));
    }

    #[test]
    fn test_error_classification() {
        let body = json!({
            "value": { "error": "no such element", "message": "An element could not be located", "stacktrace": "" }
        })
        .to_string();
        assert_eq!(
            parse_envelope(404, &body).unwrap_err(),
            RemoteError::NoSuchElement("An element could not be located".to_string())
        );

        let body = json!({ "value": { "error": "invalid session id", "message": "gone" } }).to_string();
        assert!(matches!(parse_envelope(404, &body), Err(RemoteError::InvalidSession(_))));

        let body = json!({ "value": { "error": "element not interactable", "message": "hidden" } }).to_string();
        match parse_envelope(400, &body) {
            Err(RemoteError::WebDriver { code, message }) => {
                assert_eq!(code, "element not interactable");
                assert_eq!(message, "hidden");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(parse_envelope(200, "<html>oops</html>"), Err(RemoteError::Protocol(_))));
        assert!(matches!(parse_envelope(200, "[1,2]"), Err(RemoteError::Protocol(_))));
        assert!(matches!(parse_envelope(200, "{\"status\":0}"), Err(RemoteError::Protocol(_))));
        assert!(matches!(parse_envelope(500, "{\"value\":{}}"), Err(RemoteError::Protocol(_))));
    }

    #[test]
    fn test_element_ref_decoding() {
        let w3c = json!({ W3C_ELEMENT_KEY: "el-1" });
        assert_eq!(decode_element_ref(w3c).unwrap(), "el-1");

        let legacy = json!({ "ELEMENT": "el-2" });
        assert_eq!(decode_element_ref(legacy).unwrap(), "el-2");

        assert!(decode_element_ref(json!({ "id": "x" })).is_err());
        assert!(decode_element_ref(json!({ W3C_ELEMENT_KEY: 7 })).is_err());
        assert!(decode_element_ref(json!("el-3")).is_err());
    }

    #[test]
    fn test_unit_and_string_decoding() {
        assert!(decode_unit(Value::Null).is_ok());
        assert!(decode_unit(json!({"ok": true})).is_err());
        assert_eq!(decode_string(json!("<hierarchy/>")).unwrap(), "<hierarchy/>");
        assert!(decode_string(json!(42)).is_err());
    }

    #[test]
    fn test_window_rect_decoding() {
        let rect = decode_window_rect(json!({ "x": 0, "y": 0, "width": 1080, "height": 2400 })).unwrap();
        assert_eq!(rect.width, 1080.0);
        assert_eq!(rect.height, 2400.0);
        assert!(decode_window_rect(json!({ "width": 0, "height": 10 })).is_err());
        assert!(decode_window_rect(json!({ "width": "wide" })).is_err());
    }
}
