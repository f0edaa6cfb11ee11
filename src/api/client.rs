//! Sharing API Client
//!
//! Thin HTTP wrapper over the file sharing API: upload, list, info, update, delete and download.

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::ApiError;
use super::types::{Envelope, FileDescriptor, FileOptions, UploadedFile};
use super::ShareApi;

/// Default HTTP client timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the sharing API
#[derive(Clone)]
pub struct ShareClient {
    /// HTTP client for making requests
    http_client: Client,
    /// API base URL without trailing slash, e.g. `http://localhost:3000/api`
    base_url: String,
}

impl ShareClient {
    /// Create a client for the API at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.base_url)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.base_url, urlencoding::encode(id))
    }
}

/// Turn a non-success response into the matching ApiError
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "API request failed");
    Err(ApiError::from_status(status.as_u16(), &body))
}

#[async_trait]
impl ShareApi for ShareClient {
    async fn upload(
        &self,
        file_name: &str,
        data: Vec<u8>,
        options: &FileOptions,
    ) -> Result<UploadedFile, ApiError> {
        let size = data.len();
        let file_part = multipart::Part::bytes(data).file_name(file_name.to_string());
        let mut form = multipart::Form::new().part("file", file_part);

        if let Some(filename) = &options.filename {
            form = form.text("filename", filename.clone());
        }
        if let Some(password) = &options.password {
            form = form.text("password", password.clone());
        }
        if let Some(max_downloads) = options.max_downloads {
            form = form.text("maxDownloads", max_downloads.to_string());
        }
        if let Some(expires_in) = options.expires_in {
            form = form.text("expiresIn", expires_in.to_string());
        }

        info!(file = file_name, size = size, "Uploading file");

        let response = self
            .http_client
            .post(self.files_url())
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;

        let uploaded = response.json::<Envelope<UploadedFile>>().await?.into_data()?;
        info!(file = file_name, id = %uploaded.id, "File uploaded");
        Ok(uploaded)
    }

    async fn list_files(&self, page: u32, limit: u32) -> Result<serde_json::Value, ApiError> {
        debug!(page = page, limit = limit, "Listing files");

        let response = self
            .http_client
            .get(self.files_url())
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json().await?)
    }

    async fn file_info(&self, id: &str) -> Result<FileDescriptor, ApiError> {
        debug!(id = id, "Fetching file info");

        let response = self.http_client.get(self.file_url(id)).send().await?;
        let response = check_status(response).await?;

        response.json::<Envelope<FileDescriptor>>().await?.into_data()
    }

    async fn update_file(
        &self,
        id: &str,
        token: &str,
        options: &FileOptions,
    ) -> Result<serde_json::Value, ApiError> {
        info!(id = id, "Updating file settings");

        let response = self
            .http_client
            .patch(self.file_url(id))
            .bearer_auth(token)
            .json(options)
            .send()
            .await?;
        let response = check_status(response).await?;

        response.json::<Envelope<serde_json::Value>>().await?.into_data()
    }

    async fn delete_file(&self, id: &str, token: &str) -> Result<(), ApiError> {
        info!(id = id, "Deleting file");

        let response = self
            .http_client
            .delete(self.file_url(id))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response).await?;

        info!(id = id, "File deleted");
        Ok(())
    }

    async fn download(&self, id: &str, password: Option<&str>) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}/download", self.file_url(id));
        let mut request = self.http_client.get(&url);

        // Sent only when non-empty; the password itself is never logged
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            request = request.query(&[("password", password)]);
        }

        debug!(id = id, with_password = password.is_some(), "Downloading file");

        let response = check_status(request.send().await?).await?;
        let bytes = response.bytes().await?;

        info!(id = id, size = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn bearer(headers: &HeaderMap) -> Option<&str> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    async fn upload(mut multipart: Multipart) -> Json<Value> {
        let mut fields = HashMap::new();
        let mut original = String::new();
        let mut size = 0;

        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                original = field.file_name().unwrap_or_default().to_string();
                size = field.bytes().await.unwrap().len();
            } else {
                fields.insert(name, field.text().await.unwrap());
            }
        }

        let filename = fields.get("filename").cloned().unwrap_or(original);
        Json(json!({
            "status": "success",
            "code": 201,
            "data": {
                "id": "up1",
                "filename": filename,
                "size": size,
                "mime_type": "text/plain",
                "delete_token": "tok-up1",
                "expires_at": "2026-10-20T12:00:00",
                "max_downloads_seen": fields.get("maxDownloads"),
                "password_seen": fields.contains_key("password")
            }
        }))
    }

    async fn info(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
        if id != "up1" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(json!({
            "status": "success",
            "code": 200,
            "data": {
                "id": "up1",
                "size": 5,
                "meta_data": {
                    "original_name": "hello.txt",
                    "has_password": true,
                    "max_downloads": 3,
                    "download_count": 1
                },
                "is_expired": false
            }
        })))
    }

    async fn update(
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, StatusCode> {
        if bearer(&headers) != Some("tok-up1") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!({ "status": "success", "code": 200, "data": { "id": id, "applied": body } })))
    }

    async fn remove(Path(_id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        if bearer(&headers) != Some("tok-up1") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!({ "status": "success", "code": 200, "data": null })))
    }

    async fn download(
        Path(id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Result<Vec<u8>, StatusCode> {
        match id.as_str() {
            "limited" => Err(StatusCode::FORBIDDEN),
            "expired" => Err(StatusCode::GONE),
            "busy" => Err(StatusCode::TOO_MANY_REQUESTS),
            _ => match query.get("password").map(String::as_str) {
                Some("open sesame&more") => Ok(b"hello".to_vec()),
                _ => Err(StatusCode::UNAUTHORIZED),
            },
        }
    }

    async fn spawn_stub() -> ShareClient {
        let app = Router::new()
            .route("/api/files", post(upload))
            .route("/api/files/{id}", get(info).patch(update).delete(remove))
            .route("/api/files/{id}/download", get(download));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        ShareClient::new(&format!("http://{}/api/", addr), DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = ShareClient::new("http://localhost:3000/api/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert_eq!(client.file_url("a b"), "http://localhost:3000/api/files/a%20b");
    }

    #[tokio::test]
    async fn test_upload_sends_options() {
        let client = spawn_stub().await;
        let options = FileOptions {
            filename: Some("renamed.txt".to_string()),
            password: Some("pw".to_string()),
            max_downloads: Some(3),
            expires_in: None,
        };

        let uploaded = client
            .upload("hello.txt", b"hello".to_vec(), &options)
            .await
            .unwrap();
        assert_eq!(uploaded.id, "up1");
        assert_eq!(uploaded.filename, "renamed.txt");
        assert_eq!(uploaded.size, 5);
        assert_eq!(uploaded.delete_token, "tok-up1");
        assert!(uploaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_file_info_and_not_found() {
        let client = spawn_stub().await;

        let desc = client.file_info("up1").await.unwrap();
        assert_eq!(desc.display_name(), "hello.txt");
        assert_eq!(desc.meta_data.max_downloads, 3);

        let err = client.file_info("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_use_bearer_token() {
        let client = spawn_stub().await;
        let options = FileOptions {
            max_downloads: Some(10),
            ..Default::default()
        };

        let updated = client.update_file("up1", "tok-up1", &options).await.unwrap();
        assert_eq!(updated["applied"]["maxDownloads"], 10);

        let err = client.delete_file("up1", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        client.delete_file("up1", "tok-up1").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_status_mapping() {
        let client = spawn_stub().await;

        let bytes = client.download("up1", Some("open sesame&more")).await.unwrap();
        assert_eq!(bytes, b"hello");

        let err = client.download("up1", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        let err = client.download("up1", Some("")).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        let err = client.download("limited", None).await.unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded));
        let err = client.download("expired", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Expired));
        let err = client.download("busy", None).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ShareClient::new(&format!("http://{}/api", addr), DEFAULT_TIMEOUT).unwrap();
        let err = client.file_info("up1").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
