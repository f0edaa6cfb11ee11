//! File sharing API client

pub mod client;
pub mod errors;
pub mod types;

use async_trait::async_trait;

pub use client::ShareClient;
pub use errors::ApiError;
pub use types::*;

/// Operations of the remote sharing API.
///
/// `ShareClient` is the HTTP implementation; tests drive the session through fakes.
#[async_trait]
pub trait ShareApi: Send + Sync {
    /// `POST /files` with the file and its options as multipart fields
    async fn upload(
        &self,
        file_name: &str,
        data: Vec<u8>,
        options: &FileOptions,
    ) -> Result<UploadedFile, ApiError>;

    /// `GET /files?page=&limit=`, passed through as returned by the server
    async fn list_files(&self, page: u32, limit: u32) -> Result<serde_json::Value, ApiError>;

    /// `GET /files/{id}`
    async fn file_info(&self, id: &str) -> Result<FileDescriptor, ApiError>;

    /// `PATCH /files/{id}` authorized by the delete token
    async fn update_file(
        &self,
        id: &str,
        token: &str,
        options: &FileOptions,
    ) -> Result<serde_json::Value, ApiError>;

    /// `DELETE /files/{id}` authorized by the delete token
    async fn delete_file(&self, id: &str, token: &str) -> Result<(), ApiError>;

    /// `GET /files/{id}/download`, with the password as a query parameter when given
    async fn download(&self, id: &str, password: Option<&str>) -> Result<Vec<u8>, ApiError>;
}
