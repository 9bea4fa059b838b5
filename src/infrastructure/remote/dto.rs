//! Backend request/response types.

use serde::Deserialize;

/// Error body returned by the storage and REST endpoints.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// Storage API message.
    #[serde(default)]
    pub message: Option<String>,
    /// Short error name.
    #[serde(default)]
    pub error: Option<String>,
    /// REST error code, string or number.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Most specific human readable message in the body.
    #[must_use]
    pub fn describe(&self) -> Option<String> {
        match (&self.message, &self.error) {
            (Some(message), _) => Some(message.clone()),
            (None, Some(error)) => Some(error.clone()),
            (None, None) => self.code.as_ref().map(ToString::to_string),
        }
    }
}

/// Storage upload acknowledgement.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Bucket-qualified key of the written object.
    #[serde(rename = "Key", default)]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_prefers_message() {
        let body: ErrorResponse = serde_json::from_str(
            r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#,
        )
        .unwrap();
        assert_eq!(body.describe().as_deref(), Some("Object not found"));
    }

    #[test]
    fn test_error_response_falls_back_to_code() {
        let body: ErrorResponse = serde_json::from_str(r#"{"code":"PGRST116"}"#).unwrap();
        assert_eq!(body.describe().as_deref(), Some("\"PGRST116\""));
    }

    #[test]
    fn test_upload_response_key() {
        let body: UploadResponse =
            serde_json::from_str(r#"{"Key":"photos/stage-photo/a.jpg"}"#).unwrap();
        assert_eq!(body.key.as_deref(), Some("photos/stage-photo/a.jpg"));
    }
}
