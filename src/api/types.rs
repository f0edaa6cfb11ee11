//! Sharing API types
//!
//! Defines the request options and response bodies of the file sharing API.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::errors::ApiError;

/// Deserialize a size that might be encoded as a string or null.
/// Upload responses send a number, while `meta_data.size` and the descriptor
/// size are strings when the server copies them out of object metadata.
fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct SizeVisitor;

    impl<'de> de::Visitor<'de> for SizeVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a byte count as a number or a numeric string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::custom(format!("negative size {}", value)))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<u64, E> {
            if value >= 0.0 && value.fract() == 0.0 {
                Ok(value as u64)
            } else {
                Err(E::custom(format!("invalid size {}", value)))
            }
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            match value.trim() {
                "" => Ok(0),
                digits => digits.parse::<u64>().map_err(E::custom),
            }
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(SizeVisitor)
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339, a date-time without offset (taken as UTC), a bare date,
/// or epoch milliseconds. Anything else is None.
pub(crate) fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Deserialize an optional timestamp without ever failing the surrounding document.
/// Null and the empty string mean "none"; an unreadable value is dropped with a warning.
pub(crate) fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    let parsed = parse_timestamp(&raw);
    let blank = raw.is_null() || raw.as_str().is_some_and(|s| s.trim().is_empty());
    if parsed.is_none() && !blank {
        warn!(value = %raw, "Ignoring unreadable timestamp");
    }
    Ok(parsed)
}

fn unlimited() -> i64 {
    -1
}

/// Standard response wrapper: `{ "status": "success", "code": 200, "data": ... }`
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub code: u16,
    pub data: T,
}

impl<T> Envelope<T> {
    /// Payload of a successful response. A body that reports an error despite a
    /// success status is mapped through its embedded code.
    pub fn into_data(self) -> Result<T, ApiError> {
        if self.status.eq_ignore_ascii_case("error") {
            return Err(match self.code {
                400..=599 => ApiError::from_status(self.code, "error reported in response body"),
                _ => ApiError::Request("error reported in response body".to_string()),
            });
        }
        Ok(self.data)
    }
}

/// A file as returned by a successful upload
#[derive(Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    /// Capability token for update and delete
    pub delete_token: String,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("delete_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Server-side metadata of a shared file
#[derive(Debug, Clone, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    pub size: u64,
    #[serde(default)]
    pub has_password: bool,
    /// Zero or negative means unlimited
    #[serde(default = "unlimited")]
    pub max_downloads: i64,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: i64,
}

/// Public descriptor of a shared file (`GET /files/{id}`)
#[derive(Debug, Clone, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    pub size: u64,
    pub meta_data: FileMeta,
    #[serde(default)]
    pub is_expired: bool,
}

impl FileDescriptor {
    /// Name to save the file under: custom name, then original name, then "download"
    pub fn display_name(&self) -> &str {
        [
            self.meta_data.custom_name.as_deref(),
            Some(self.meta_data.original_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or("download")
    }
}

/// Options accepted on upload (multipart fields) and update (JSON body)
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// -1 for unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_downloads: Option<i64>,
    /// Seconds until expiry, -1 for never
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl FileOptions {
    /// Whether no option is set at all
    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.password.is_none()
            && self.max_downloads.is_none()
            && self.expires_in.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_upload_response() {
        let json = r#"{
            "status": "success",
            "code": 201,
            "data": {
                "password": null,
                "id": "f1a2",
                "filename": "report.pdf",
                "size": 2048,
                "mime_type": "application/pdf",
                "url": "https://share.example/download/f1a2",
                "delete_url": "https://share.example/api/files/f1a2",
                "delete_token": "secret-token",
                "expires_at": "2026-10-20T12:00:00Z"
            }
        }"#;
        let resp: Envelope<UploadedFile> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.code, 201);
        assert_eq!(resp.data.id, "f1a2");
        assert_eq!(resp.data.size, 2048);
        assert_eq!(resp.data.delete_token, "secret-token");
        assert!(resp.data.expires_at.is_some());
    }

    #[test]
    fn test_upload_debug_hides_token() {
        let json = r#"{"id":"x","filename":"a.txt","delete_token":"hunter2","expires_at":null}"#;
        let file: UploadedFile = serde_json::from_str(json).unwrap();
        let debug = format!("{:?}", file);
        assert!(!debug.contains("hunter2"));
        assert!(file.expires_at.is_none());
    }

    #[test]
    fn test_deserialize_descriptor() {
        let json = r#"{
            "id": "f1a2",
            "key": "uploads/f1a2",
            "size": "4096",
            "meta_data": {
                "original_name": "photo.jpg",
                "custom_name": "",
                "mime_type": "image/jpeg",
                "size": 4096,
                "has_password": true,
                "max_downloads": 3,
                "expires_at": "",
                "uploaded_at": "2026-10-16T08:30:00+02:00",
                "deletion_token": "should-be-ignored",
                "download_count": 1
            },
            "last_modified": "2026-10-16T06:30:00Z",
            "etag": "abc",
            "is_expired": false
        }"#;
        let desc: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.size, 4096);
        assert!(desc.meta_data.has_password);
        assert_eq!(desc.meta_data.max_downloads, 3);
        assert_eq!(desc.meta_data.download_count, 1);
        assert!(desc.meta_data.expires_at.is_none());
        assert_eq!(desc.display_name(), "photo.jpg");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let json = r#"{"id":"a","meta_data":{"original_name":"orig.txt","custom_name":"notes.txt"}}"#;
        let desc: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.display_name(), "notes.txt");
        assert_eq!(desc.meta_data.max_downloads, -1);

        let json = r#"{"id":"a","meta_data":{}}"#;
        let desc: FileDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.display_name(), "download");
    }

    #[test]
    fn test_upload_response_with_offsetless_expiry_keeps_token() {
        let json = r#"{"status":"success","code":201,"data":{"id":"f9","filename":"a.txt",
            "size":"12","delete_token":"keep-me","expires_at":"2026-10-20T12:00:00"}}"#;
        let resp: Envelope<UploadedFile> = serde_json::from_str(json).unwrap();
        let file = resp.into_data().unwrap();

        assert_eq!(file.delete_token, "keep-me");
        assert_eq!(file.size, 12);
        assert_eq!(
            file.expires_at.unwrap().to_rfc3339(),
            "2026-10-20T12:00:00+00:00"
        );
    }

    #[test]
    fn test_unreadable_timestamps_become_none() {
        let json = r#"{"id":"x","filename":"a.txt","delete_token":"t","expires_at":"next tuesday"}"#;
        let file: UploadedFile = serde_json::from_str(json).unwrap();
        assert!(file.expires_at.is_none());

        let json = r#"{"id":"x","filename":"a.txt","delete_token":"t","expires_at":{"days":3}}"#;
        let file: UploadedFile = serde_json::from_str(json).unwrap();
        assert!(file.expires_at.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        use serde_json::json;

        let expected = "2026-10-20T12:00:00+00:00";
        for value in [
            json!("2026-10-20T12:00:00Z"),
            json!("2026-10-20T14:00:00+02:00"),
            json!("2026-10-20 12:00:00"),
            json!("2026-10-20T12:00:00.000"),
            json!(1792497600000_i64),
        ] {
            let parsed = parse_timestamp(&value).unwrap();
            assert_eq!(parsed.to_rfc3339(), expected, "for {}", value);
        }
        assert_eq!(
            parse_timestamp(&json!("2026-10-20")).unwrap().to_rfc3339(),
            "2026-10-20T00:00:00+00:00"
        );
        assert!(parse_timestamp(&json!("")).is_none());
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"status":"error","code":410,"data":null}"#;
        let resp: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.into_data(), Err(ApiError::Expired)));

        let json = r#"{"status":"error","data":null}"#;
        let resp: Envelope<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.into_data(), Err(ApiError::Request(_))));
    }

    #[test]
    fn test_options_serialization() {
        let options = FileOptions {
            password: Some("pw".to_string()),
            max_downloads: Some(5),
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("maxDownloads"));
        assert!(json.contains("password"));
        assert!(!json.contains("expiresIn"));
        assert!(!json.contains("filename"));
        assert!(FileOptions::default().is_empty());
        assert!(!options.is_empty());
    }
}
