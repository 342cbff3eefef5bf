//! `reqwest` implementation of [`ProcessingService`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::config::{AppSettings, CoordinatorConfig};
use crate::error::ServiceError;
use crate::sanitize;
use crate::session::OutputLocation;

use super::types::{
    ArchiveRequest, EmailRequest, EncryptionCheck, ErrorPayload, ProcessRequest, RevealRequest,
    UploadFile, UploadNotifier,
};
use super::ProcessingService;

/// Chunk size used when streaming a document to the service.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum length of a response body quoted in an error.
const MAX_ERROR_BODY_LENGTH: usize = 200;

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

/// HTTP client for the loopback processing service.
pub struct HttpService {
    client: Client,
    base_url: Url,
}

impl HttpService {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport {
                endpoint: config.service_url.clone(),
                source: e,
            })?;
        Self::with_client(client, &config.service_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ServiceError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ServiceError::InvalidUrl(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, endpoint: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| ServiceError::InvalidUrl(e.to_string()))
    }

    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Response, ServiceError> {
        let response = request.send().await.map_err(|e| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} returned HTTP {}", endpoint, status);
            return Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(response)
    }

    /// Parses a JSON body, turning a `{error: ...}` payload into [`ServiceError::Reported`].
    async fn json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: Response,
    ) -> Result<T, ServiceError> {
        let bytes = response.bytes().await.map_err(|e| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            return Err(ServiceError::Reported(message.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ServiceError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Reads a binary body; a JSON body at this point is a reported failure.
    async fn binary(&self, endpoint: &str, response: Response) -> Result<Vec<u8>, ServiceError> {
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let bytes = response.bytes().await.map_err(|e| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        if is_json {
            return match serde_json::from_slice::<ErrorPayload>(&bytes) {
                Ok(payload) => Err(ServiceError::Reported(payload.error)),
                Err(e) => Err(ServiceError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: format!("expected file content, got JSON: {}", e),
                }),
            };
        }

        Ok(bytes.to_vec())
    }

    /// Drains an acknowledgement body, surfacing a `{error: ...}` payload if present.
    async fn ack(&self, endpoint: &str, response: Response) -> Result<(), ServiceError> {
        let body = response.text().await.map_err(|e| ServiceError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        if let Ok(payload) = serde_json::from_str::<ErrorPayload>(&body) {
            return Err(ServiceError::Reported(payload.error));
        }
        Ok(())
    }
}

fn file_part(file: &UploadFile) -> Part {
    Part::bytes(file.content.to_vec()).file_name(file.name.clone())
}

/// Streams the document and fires `uploaded` once the last chunk has been taken.
fn streamed_file_part(file: &UploadFile, uploaded: UploadNotifier) -> Part {
    let content: Arc<[u8]> = Arc::clone(&file.content);
    let length = content.len() as u64;
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = content
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(|c| Ok(c.to_vec()))
        .collect();

    let finished = stream::once(async move {
        uploaded.notify();
    })
    .filter_map(|_| async { None::<Result<Vec<u8>, std::io::Error>> });

    let body = reqwest::Body::wrap_stream(stream::iter(chunks).chain(finished));
    Part::stream_with_length(body, length).file_name(file.name.clone())
}

#[async_trait]
impl ProcessingService for HttpService {
    async fn health(&self) -> Result<(), ServiceError> {
        let endpoint = "health";
        let response = self
            .send(endpoint, self.client.get(self.url(endpoint)?))
            .await?;
        self.ack(endpoint, response).await
    }

    async fn check_encryption(&self, file: &UploadFile) -> Result<EncryptionCheck, ServiceError> {
        let endpoint = "api/check_encryption";
        debug!("Checking encryption of {}", sanitize::redact_filename(&file.name));
        let form = Form::new().part("file", file_part(file));
        let response = self
            .send(endpoint, self.client.post(self.url(endpoint)?).multipart(form))
            .await?;
        self.json(endpoint, response).await
    }

    async fn decrypt(
        &self,
        file: &UploadFile,
        password: &SecretString,
    ) -> Result<Vec<u8>, ServiceError> {
        let endpoint = "api/decrypt";
        let form = Form::new()
            .part("file", file_part(file))
            .text("password", password.expose_secret().to_string());
        let response = self
            .send(endpoint, self.client.post(self.url(endpoint)?).multipart(form))
            .await?;
        self.binary(endpoint, response).await
    }

    async fn process(
        &self,
        request: ProcessRequest,
        uploaded: UploadNotifier,
    ) -> Result<OutputLocation, ServiceError> {
        let endpoint = "api/redact";
        let words = request.joined_words();
        let form = Form::new()
            .part("file", streamed_file_part(&request.file, uploaded))
            .text("words", words)
            .text("client_id", request.session_id.clone())
            .text("batch_id", request.batch_id.clone());
        let response = self
            .send(endpoint, self.client.post(self.url(endpoint)?).multipart(form))
            .await?;
        self.json(endpoint, response).await
    }

    async fn cancel(&self, session_id: &str) -> Result<(), ServiceError> {
        let endpoint = "api/cancel";
        let response = self
            .send(
                endpoint,
                self.client
                    .post(self.url(endpoint)?)
                    .form(&[("client_id", session_id)]),
            )
            .await?;
        self.ack(endpoint, response).await
    }

    async fn download(&self, location: &OutputLocation) -> Result<Vec<u8>, ServiceError> {
        let endpoint = "api/download";
        let response = self
            .send(
                endpoint,
                self.client.get(self.url(endpoint)?).query(&[
                    ("temp_dir", location.output_directory.as_str()),
                    ("filename", location.output_filename.as_str()),
                ]),
            )
            .await?;
        self.binary(endpoint, response).await
    }

    async fn archive(&self, files: &[OutputLocation]) -> Result<Vec<u8>, ServiceError> {
        let endpoint = "api/archive";
        let response = self
            .send(
                endpoint,
                self.client
                    .post(self.url(endpoint)?)
                    .json(&ArchiveRequest { files }),
            )
            .await?;
        self.binary(endpoint, response).await
    }

    async fn read_config(&self) -> Result<AppSettings, ServiceError> {
        let endpoint = "api/config";
        let response = self
            .send(endpoint, self.client.get(self.url(endpoint)?))
            .await?;
        self.json(endpoint, response).await
    }

    async fn write_config(&self, settings: &AppSettings) -> Result<(), ServiceError> {
        let endpoint = "api/config";
        let response = self
            .send(endpoint, self.client.post(self.url(endpoint)?).json(settings))
            .await?;
        self.ack(endpoint, response).await
    }

    async fn reveal_folder(&self, path: &str) -> Result<(), ServiceError> {
        let endpoint = "api/open_folder";
        let response = self
            .send(
                endpoint,
                self.client
                    .post(self.url(endpoint)?)
                    .json(&RevealRequest { path }),
            )
            .await?;
        self.ack(endpoint, response).await
    }

    async fn send_email(&self, email: &EmailRequest) -> Result<(), ServiceError> {
        let endpoint = "api/send_email";
        let response = self
            .send(endpoint, self.client.post(self.url(endpoint)?).json(email))
            .await?;
        self.ack(endpoint, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpService {
        HttpService::with_client(Client::new(), &server.uri()).unwrap()
    }

    fn upload(name: &str) -> UploadFile {
        UploadFile::new(name, Arc::from(b"%PDF-1.7 test".to_vec()))
    }

    fn location() -> OutputLocation {
        OutputLocation {
            output_directory: "/tmp/batch".to_string(),
            output_filename: "redacted_a.pdf".to_string(),
            save_directory: None,
        }
    }

    #[tokio::test]
    async fn test_check_encryption_with_auto_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/check_encryption"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"encrypted": true, "autoPassword": "secret"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let check = service(&server)
            .check_encryption(&upload("a.pdf"))
            .await
            .unwrap();
        assert!(check.encrypted);
        assert_eq!(check.auto_password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_decrypt_returns_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/decrypt"))
            .and(body_string_contains("hunter2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-open".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let bytes = service(&server)
            .decrypt(&upload("a.pdf"), &SecretString::from("hunter2".to_string()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-open");
    }

    #[tokio::test]
    async fn test_decrypt_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/decrypt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": "Decryption failed. Wrong password?"})),
            )
            .mount(&server)
            .await;

        let err = service(&server)
            .decrypt(&upload("a.pdf"), &SecretString::from("wrong".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Reported(ref m) if m.contains("Wrong password")));
    }

    #[tokio::test]
    async fn test_process_sends_form_fields_and_signals_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/redact"))
            .and(body_string_contains("Alice,Bob"))
            .and(body_string_contains("session-1"))
            .and(body_string_contains("batch-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "outputDirectory": "/tmp/batch-1",
                "outputFilename": "redacted_a.pdf",
                "saveDirectory": "/Users/me/Redacted/batch-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = ProcessRequest {
            file: upload("a.pdf"),
            words: vec!["Alice".to_string(), "Bob".to_string()],
            session_id: "session-1".to_string(),
            batch_id: "batch-1".to_string(),
        };
        let (notifier, uploaded) = UploadNotifier::channel();

        let output = service(&server).process(request, notifier).await.unwrap();
        assert_eq!(output.output_directory, "/tmp/batch-1");
        assert_eq!(output.output_filename, "redacted_a.pdf");
        assert_eq!(
            output.save_directory.as_deref(),
            Some("/Users/me/Redacted/batch-1")
        );
        assert!(uploaded.await.is_ok());
    }

    #[tokio::test]
    async fn test_process_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/redact"))
            .respond_with(ResponseTemplate::new(500).set_body_string("OCR crashed"))
            .mount(&server)
            .await;

        let request = ProcessRequest {
            file: upload("a.pdf"),
            words: vec!["Alice".to_string()],
            session_id: "s".to_string(),
            batch_id: "b".to_string(),
        };
        let err = service(&server)
            .process(request, UploadNotifier::noop())
            .await
            .unwrap_err();
        match err {
            ServiceError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "OCR crashed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_process_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/redact"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let request = ProcessRequest {
            file: upload("a.pdf"),
            words: vec!["Alice".to_string()],
            session_id: "s".to_string(),
            batch_id: "b".to_string(),
        };
        let err = service(&server)
            .process(request, UploadNotifier::noop())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_cancel_posts_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/cancel"))
            .and(body_string_contains("client_id=session-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "cancelling"})))
            .expect(1)
            .mount(&server)
            .await;

        service(&server).cancel("session-9").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_uses_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .and(query_param("temp_dir", "/tmp/batch"))
            .and(query_param("filename", "redacted_a.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-red".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let bytes = service(&server).download(&location()).await.unwrap();
        assert_eq!(bytes, b"%PDF-red");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "File not found"})),
            )
            .mount(&server)
            .await;

        let err = service(&server).download(&location()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Reported(ref m) if m == "File not found"));
    }

    #[tokio::test]
    async fn test_archive_posts_locations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/archive"))
            .and(body_string_contains("redacted_a.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"PK\x03\x04".to_vec(), "application/zip"),
            )
            .mount(&server)
            .await;

        let bytes = service(&server).archive(&[location()]).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[tokio::test]
    async fn test_read_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "words": ["Alice", "ACME"],
                "passwords": ["secret"]
            })))
            .mount(&server)
            .await;

        let settings = service(&server).read_config().await.unwrap();
        assert_eq!(settings.words, vec!["Alice", "ACME"]);
        assert_eq!(settings.passwords, vec!["secret"]);
    }

    #[tokio::test]
    async fn test_send_email_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send_email"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "SMTP login failed"})),
            )
            .mount(&server)
            .await;

        let email = EmailRequest {
            recipient: "legal@example.com".to_string(),
            subject: "Redacted".to_string(),
            body: "Attached".to_string(),
            attachment_path: "/tmp/batch".to_string(),
        };
        let err = service(&server).send_email(&email).await.unwrap_err();
        assert_eq!(err.to_string(), "SMTP login failed");
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let service = HttpService::with_client(Client::new(), "http://127.0.0.1:1").unwrap();
        let err = service.health().await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport { .. }));
    }

    #[test]
    fn test_base_url_with_prefix() {
        let service =
            HttpService::with_client(Client::new(), "http://127.0.0.1:8000/backend").unwrap();
        assert_eq!(
            service.url("api/redact").unwrap().as_str(),
            "http://127.0.0.1:8000/backend/api/redact"
        );
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("(truncated)"));
        assert!(truncated.len() < 250);
    }

    #[tokio::test]
    async fn test_truncated_ack_body_names_endpoint() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            // Promise more bytes than are sent, then hang up.
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 64\r\n\r\n{\"status\"")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let service = HttpService::with_client(Client::new(), &format!("http://{}", addr)).unwrap();
        let err = service.health().await.unwrap_err();

        assert!(matches!(err, ServiceError::Transport { endpoint, .. } if endpoint == "health"));
    }
}
