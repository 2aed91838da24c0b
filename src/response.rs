use serde::Serialize;

use crate::engine::EngineError;

/// The boundary envelope every core operation is shaped into for the
/// embedding application: `{ success, message?, data? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data) }
    }

    pub fn ok_with(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data) }
    }

    pub fn fail(err: &EngineError) -> Self {
        Self { success: false, message: Some(err.to_string()), data: None }
    }
}

impl<T> From<Result<T, EngineError>> for ApiResponse<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn ok_envelope_shape() {
        let resp = ApiResponse::ok(vec![1, 2, 3]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert!(json.get("message").is_none());
    }

    #[test]
    fn fail_envelope_carries_reason() {
        let err = EngineError::VenueNotFound(Ulid::new());
        let resp: ApiResponse<()> = ApiResponse::from(Err(err));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["message"].as_str().unwrap().contains("venue not found"));
        assert!(json.get("data").is_none());
    }

    #[test]
    fn from_ok_result() {
        let resp: ApiResponse<u32> = ApiResponse::from(Ok(7u32));
        assert!(resp.success);
        assert_eq!(resp.data, Some(7));
    }
}
