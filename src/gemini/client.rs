//! Minimal Gemini REST client.

use super::types::{
    FileResource, FileState, GenerateContentRequest, GenerateContentResponse, InlinedRequest,
    ListBatchesResponse, Operation, UploadResponse,
};
use crate::config::GeminiSettings;
use crate::error::{HarkError, Result};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_CHUNK_BYTES: usize = 256 * 1024;

/// Authenticated client for the Generative Language API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    file_poll_interval: Duration,
}

impl GeminiClient {
    /// Build a client from settings, reading the key from the environment.
    pub fn new(settings: &GeminiSettings) -> Result<Self> {
        Self::with_api_key(settings, settings.api_key()?)
    }

    pub fn with_api_key(settings: &GeminiSettings, api_key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(concat!("hark/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            file_poll_interval: Duration::from_secs(settings.file_poll_interval_secs.max(1)),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `{base}/v1beta/{path}`, where `path` is a resource name such as
    /// `files/abc` or `batches/xyz`.
    fn url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request.header(API_KEY_HEADER, &self.api_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HarkError::from_status(status, context, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = self.send(request, context).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| HarkError::Remote(format!("{} returned an unexpected body: {}", context, e)))
    }

    /// Upload a local file with the resumable protocol, streaming it from disk.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload_file(&self, path: &Path, mime_type: &str, display_name: &str) -> Result<FileResource> {
        let size = tokio::fs::metadata(path).await?.len();

        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }));
        let response = self.send(start, "Gemini upload start").await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| HarkError::Remote("Gemini upload start returned no upload URL".into()))?;

        let file = tokio::fs::File::open(path).await?;
        let body = futures::stream::unfold(file, |mut file| async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK_BYTES];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok::<_, std::io::Error>(buf), file))
                }
                Err(e) => Some((Err(e), file)),
            }
        });

        let finish = self
            .http
            .post(upload_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(reqwest::Body::wrap_stream(body));
        let uploaded: UploadResponse = self.send_json(finish, "Gemini upload").await?;

        info!("Uploaded {} ({} bytes) as {}", display_name, size, uploaded.file.name);
        Ok(uploaded.file)
    }

    pub async fn get_file(&self, name: &str) -> Result<FileResource> {
        self.send_json(self.http.get(self.url(name)), "Gemini file lookup")
            .await
    }

    pub async fn delete_file(&self, name: &str) -> Result<()> {
        self.send(self.http.delete(self.url(name)), "Gemini file delete")
            .await?;
        debug!("Deleted {}", name);
        Ok(())
    }

    /// Wait until an uploaded file leaves `PROCESSING`.
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn wait_until_active(&self, mut file: FileResource) -> Result<FileResource> {
        while file.state == FileState::Processing {
            tokio::time::sleep(self.file_poll_interval).await;
            file = self.get_file(&file.name).await?;
        }

        if file.state == FileState::Failed {
            let reason = file
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "processing failed".to_string());
            return Err(HarkError::Remote(format!("File {} could not be processed: {}", file.name, reason)));
        }
        Ok(file)
    }

    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn generate_content(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let url = self.url(&format!("{}:generateContent", self.model_path()));
        self.send_json(self.http.post(url).json(request), "Gemini generateContent")
            .await
    }

    /// Create a batch whose requests are embedded in the call.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn create_batch(&self, display_name: &str, requests: Vec<InlinedRequest>) -> Result<Operation> {
        let url = self.url(&format!("{}:batchGenerateContent", self.model_path()));
        let body = serde_json::json!({
            "batch": {
                "display_name": display_name,
                "input_config": { "requests": { "requests": requests } }
            }
        });
        self.send_json(self.http.post(url).json(&body), "Gemini batch create")
            .await
    }

    pub async fn get_batch(&self, name: &str) -> Result<Operation> {
        self.send_json(self.http.get(self.url(name)), "Gemini batch lookup")
            .await
    }

    pub async fn cancel_batch(&self, name: &str) -> Result<()> {
        let url = self.url(&format!("{}:cancel", name));
        self.send(self.http.post(url).json(&serde_json::json!({})), "Gemini batch cancel")
            .await?;
        Ok(())
    }

    pub async fn list_batches(&self, page_size: usize) -> Result<Vec<Operation>> {
        let request = self
            .http
            .get(self.url("batches"))
            .query(&[("pageSize", page_size.to_string())]);
        let list: ListBatchesResponse = self.send_json(request, "Gemini batch list").await?;
        Ok(if list.operations.is_empty() {
            list.batches
        } else {
            list.operations
        })
    }

    /// Download the contents of a generated file, such as batch results.
    pub async fn download_file(&self, name: &str) -> Result<String> {
        let url = format!(
            "{}/download/v1beta/{}:download",
            self.api_base,
            name.trim_start_matches('/')
        );
        let request = self.http.get(url).query(&[("alt", "media")]);
        let response = self.send(request, "Gemini file download").await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(model: &str) -> GeminiClient {
        let settings = GeminiSettings {
            model: model.to_string(),
            api_base: "https://gemini.example.com/".to_string(),
            ..GeminiSettings::default()
        };
        GeminiClient::with_api_key(&settings, "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client("gemini-1.5-flash");
        assert_eq!(client.url("files/abc"), "https://gemini.example.com/v1beta/files/abc");
        assert_eq!(client.url("/batches/1"), "https://gemini.example.com/v1beta/batches/1");
        assert_eq!(client.model_path(), "models/gemini-1.5-flash");
    }

    #[test]
    fn test_prefixed_model_is_kept() {
        assert_eq!(client("models/gemini-2.0-flash").model_path(), "models/gemini-2.0-flash");
    }

    #[test]
    fn test_new_requires_key() {
        let settings = GeminiSettings {
            api_key_env: "HARK_TEST_UNSET_GEMINI_KEY".to_string(),
            ..GeminiSettings::default()
        };
        assert!(matches!(GeminiClient::new(&settings), Err(HarkError::Config(_))));
    }
}
