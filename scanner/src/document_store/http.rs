//! HTTP document store client.
//!
//! Talks to a REST front for the document database:
//!
//! - `GET {base}/{collection}/{id}` answers 200 with a JSON object, or 404
//! - `PATCH {base}/{collection}/{id}` with a JSON field map merges the fields
//!
//! `collection` and `id` are sent as single percent-encoded path segments.

use super::{Document, DocumentStore, DocumentStoreError, StoreFuture, StoreResult};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

/// Document store reached over HTTP
#[derive(Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpDocumentStore {
    /// Create a client for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::RequestFailed`] if `base_url` is not a
    /// usable base URL or the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                DocumentStoreError::RequestFailed(format!("invalid base URL '{base_url}'"))
            })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocumentStoreError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, collection: &str, id: &str) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DocumentStoreError::RequestFailed(format!("invalid base URL '{}'", self.base_url))
            })?
            .pop_if_empty()
            .push(collection)
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let response = self
            .authorize(self.client.get(self.url(collection, id)?))
            .send()
            .await
            .map_err(|e| DocumentStoreError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<Document>()
                .await
                .map(Some)
                .map_err(|e| DocumentStoreError::ResponseParseFailed(e.to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DocumentStoreError::Unauthorized)
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DocumentStoreError::Api {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }

    async fn patch(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let response = self
            .authorize(self.client.patch(self.url(collection, id)?))
            .json(&fields)
            .send()
            .await
            .map_err(|e| DocumentStoreError::RequestFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DocumentStoreError::Unauthorized)
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DocumentStoreError::Api {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}

impl DocumentStore for HttpDocumentStore {
    fn get_document(&self, collection: &str, id: &str) -> StoreFuture<Option<Document>> {
        let this = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            tracing::debug!(%collection, %id, "GET document");
            this.fetch(&collection, &id).await
        })
    }

    fn update_document(&self, collection: &str, id: &str, fields: Document) -> StoreFuture<()> {
        let this = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            tracing::debug!(%collection, %id, fields = fields.len(), "PATCH document");
            this.patch(&collection, &id, fields).await
        })
    }
}

impl std::fmt::Debug for HttpDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocumentStore")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, token: Option<&str>) -> HttpDocumentStore {
        HttpDocumentStore::new(
            format!("{}/", server.uri()),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_existing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets/T-101"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "userName": "Ada", "status": "issued" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let doc = store_for(&server, Some("secret"))
            .get_document("tickets", "T-101")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(doc.get("userName"), Some(&json!("Ada")));
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets/T-100"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let doc = store_for(&server, None)
            .get_document("tickets", "T-100")
            .await
            .unwrap();

        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .get_document("tickets", "T-1")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DocumentStoreError::Api {
                status: 503,
                message: "maintenance".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_object_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["not", "an", "object"])))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .get_document("tickets", "T-1")
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::ResponseParseFailed(_)));
    }

    #[tokio::test]
    async fn test_patch_sends_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/tickets/T-101"))
            .and(body_json(json!({ "status": "used", "remarks": "VIP" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut fields = Document::new();
        fields.insert("status".to_string(), json!("used"));
        fields.insert("remarks".to_string(), json!("VIP"));

        store_for(&server, None)
            .update_document("tickets", "T-101", fields)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_patch_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .update_document("tickets", "T-404", Document::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_failure() {
        let store =
            HttpDocumentStore::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();

        let err = store.get_document("tickets", "T-1").await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_reserved_characters_stay_in_the_id_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tickets/T-101%3Fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "issued" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tickets/T-101%23frag%2Fother"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, None);

        assert!(store
            .get_document("tickets", "T-101?x")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_document("tickets", "T-101#frag/other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_patch_encodes_the_id_segment() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/tickets/T-101%3Fstatus=issued"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, None)
            .update_document("tickets", "T-101?status=issued", Document::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tickets/T-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store =
            HttpDocumentStore::new(format!("{}/v1/", server.uri()), None, Duration::from_secs(5))
                .unwrap();

        assert!(store.get_document("tickets", "T-1").await.unwrap().is_some());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = HttpDocumentStore::new("not a url", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DocumentStoreError::RequestFailed(_)));

        let err =
            HttpDocumentStore::new("mailto:ops@example.com", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DocumentStoreError::RequestFailed(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let store =
            HttpDocumentStore::new("http://localhost", Some("secret".into()), Duration::from_secs(1))
                .unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret"));
    }
}
