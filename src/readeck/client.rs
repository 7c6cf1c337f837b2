use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{Bookmark, BookmarkBackend, BookmarkPage, SyncEvent};
use crate::error::{BackendError, BackendResult};

const TOTAL_PAGES_HEADER: &str = "Total-Pages";

pub struct ReadeckClient {
    http: Client,
    base_url: Url,
    access_token: String,
    timeout: Duration,
}

impl ReadeckClient {
    /// `http` is shared between clients so connections are pooled across
    /// credentials.
    pub fn new(http: Client, base_url: Url, access_token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            access_token: access_token.into(),
            timeout,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(segments))
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::rejected(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> BackendResult<(T, HeaderMap)> {
        let response = self.send(request).await?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        Ok((serde_json::from_slice(&bytes)?, headers))
    }
}

/// Boundary of a `multipart/*` content type.
fn batch_boundary(content_type: &str) -> BackendResult<String> {
    let parsed: mime::Mime = content_type
        .parse()
        .map_err(|_| BackendError::Multipart(format!("unparsable content type {:?}", content_type)))?;
    if parsed.type_() != mime::MULTIPART {
        return Err(BackendError::Multipart(format!(
            "expected a multipart body, got {}",
            parsed.essence_str()
        )));
    }
    parsed
        .get_param(mime::BOUNDARY)
        .map(|boundary| boundary.as_str().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| BackendError::Multipart("content type has no boundary".to_string()))
}

fn multipart_error(e: multer::Error) -> BackendError {
    BackendError::Multipart(e.to_string())
}

/// Reads bookmark details out of a batch body. Non-JSON and undecodable
/// parts are skipped; the first part for an id wins.
async fn decode_batch<S, O, E>(boundary: String, body: S) -> BackendResult<HashMap<String, Bookmark>>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut parts = multer::Multipart::new(body, boundary);
    let mut bookmarks = HashMap::new();

    while let Some(part) = parts.next_field().await.map_err(multipart_error)? {
        let is_json = part
            .content_type()
            .is_some_and(|ct| ct.type_() == mime::APPLICATION && ct.subtype() == mime::JSON);
        if !is_json {
            tracing::debug!(
                content_type = ?part.content_type(),
                "skipping non-json multipart part"
            );
            continue;
        }

        let data = part.bytes().await.map_err(multipart_error)?;
        match serde_json::from_slice::<Bookmark>(&data) {
            Ok(bookmark) => {
                bookmarks.entry(bookmark.id.clone()).or_insert(bookmark);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode bookmark part, skipping");
            }
        }
    }

    Ok(bookmarks)
}

fn total_pages(headers: &HeaderMap) -> u32 {
    headers
        .get(TOTAL_PAGES_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(1)
}

#[async_trait]
impl BookmarkBackend for ReadeckClient {
    async fn list_changes(&self, since: Option<DateTime<Utc>>) -> BackendResult<Vec<SyncEvent>> {
        let mut request = self.request(Method::GET, &["api", "bookmarks", "sync"]);
        if let Some(since) = since {
            request = request.query(&[("since", since.timestamp().to_string())]);
        }
        let (events, _) = self.send_json::<Vec<SyncEvent>>(request).await?;
        tracing::debug!(count = events.len(), full = since.is_none(), "fetched change feed");
        Ok(events)
    }

    async fn fetch_details_batch(&self, ids: &[String]) -> BackendResult<HashMap<String, Bookmark>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let body = json!({
            "id": ids,
            "resource_prefix": "%/img",
            "sort": ["created"],
            "with_html": false,
            "with_json": true,
            "with_markdown": false,
            "with_resources": false,
        });
        let request = self
            .request(Method::POST, &["api", "bookmarks", "sync"])
            .header(header::ACCEPT, "multipart/mixed")
            .json(&body);

        let response = self.send(request).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        let boundary = batch_boundary(content_type)?;

        let bookmarks = decode_batch(boundary, response.bytes_stream()).await?;
        if bookmarks.len() < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                returned = bookmarks.len(),
                "batch response is missing some bookmarks"
            );
        }
        Ok(bookmarks)
    }

    async fn search_by_site(
        &self,
        site: &str,
        page: u32,
        archived: Option<bool>,
    ) -> BackendResult<BookmarkPage> {
        let mut query = vec![("site", site.to_string()), ("page", page.to_string())];
        if let Some(archived) = archived {
            query.push(("is_archived", archived.to_string()));
        }
        let request = self.request(Method::GET, &["api", "bookmarks"]).query(&query);

        let (bookmarks, headers) = self.send_json::<Vec<Bookmark>>(request).await?;
        Ok(BookmarkPage {
            bookmarks,
            total_pages: total_pages(&headers),
        })
    }

    async fn fetch_article_html(&self, id: &str) -> BackendResult<String> {
        let request = self.request(Method::GET, &["api", "bookmarks", id, "article"]);
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    async fn update_bookmark(&self, id: &str, fields: Map<String, Value>) -> BackendResult<()> {
        let request = self
            .request(Method::PATCH, &["api", "bookmarks", id])
            .json(&fields);
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(item_id = %id, "bookmark not found on readeck, treating update as done");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_bookmark(&self, url: &str) -> BackendResult<()> {
        let request = self
            .request(Method::POST, &["api", "bookmarks"])
            .json(&json!({ "url": url }));
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readeck::SyncEventType;
    use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ReadeckClient {
        ReadeckClient::new(
            Client::new(),
            Url::parse(&server.uri()).unwrap(),
            "test-token",
            Duration::from_secs(5),
        )
    }

    const BATCH_BODY: &str = "--sep\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"id\":\"b1\",\"title\":\"One\",\"url\":\"https://example.com/1\",\"is_marked\":true}\r\n\
--sep\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>ignored</p>\r\n\
--sep\r\n\
Content-Type: application/json\r\n\
\r\n\
{not json\r\n\
--sep\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"id\":\"b2\",\"title\":\"Two\",\"is_archived\":true}\r\n\
--sep--\r\n";

    fn chunked(body: &[u8], size: usize) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        let chunks: Vec<_> = body
            .chunks(size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    #[test]
    fn test_batch_boundary() {
        assert_eq!(batch_boundary("multipart/mixed; boundary=abc123").unwrap(), "abc123");
        assert_eq!(
            batch_boundary("multipart/mixed; charset=utf-8; boundary=\"a b\"").unwrap(),
            "a b"
        );

        for bad in ["application/json", "multipart/mixed", "", "not a type"] {
            assert!(
                matches!(batch_boundary(bad), Err(BackendError::Multipart(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_decode_batch_across_small_chunks() {
        let details = decode_batch("sep".to_string(), chunked(BATCH_BODY.as_bytes(), 7))
            .await
            .unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details["b1"].title, "One");
        assert!(details["b2"].is_archived);
    }

    #[tokio::test]
    async fn test_decode_batch_part_bodies_are_opaque() {
        let body = b"--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
--not-the-boundary x--b\r\n\
--b\r\n\
Content-Type: application/json; charset=utf-8\r\n\
\r\n\
{\"id\":\"first\",\"title\":\"--b inside\"}\r\n\
--b\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"id\":\"first\",\"title\":\"later copy\"}\r\n\
--b--\r\n";

        let details = decode_batch("b".to_string(), chunked(body, 64)).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details["first"].title, "--b inside");
    }

    #[tokio::test]
    async fn test_decode_batch_truncated_body_is_an_error() {
        let body = b"--b\r\nContent-Type: application/json\r\n\r\n{\"id\":";
        let err = decode_batch("b".to_string(), chunked(body, 16)).await.unwrap_err();
        assert!(matches!(err, BackendError::Multipart(_)));
    }

    #[tokio::test]
    async fn test_list_changes_full_and_since() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/bookmarks/sync"))
            .and(query_param("since", "1700000000"))
            .and(header_eq("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "d1", "time": "2024-01-01T00:00:00Z", "type": "delete"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bookmarks/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "u1", "time": "2024-01-01T00:00:00Z", "type": "update"},
                {"id": "u2", "time": null, "type": "update"}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let full = client.list_changes(None).await.unwrap();
        assert_eq!(full.len(), 2);
        assert_eq!(full[0].event_type, SyncEventType::Update);

        let since = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let delta = client.list_changes(Some(since)).await.unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].event_type, SyncEventType::Delete);
    }

    #[tokio::test]
    async fn test_list_changes_rejected_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_changes(None).await.unwrap_err();
        match err {
            BackendError::Rejected { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_details_batch_skips_bad_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookmarks/sync"))
            .and(header_eq("accept", "multipart/mixed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(BATCH_BODY, "multipart/mixed; boundary=sep"),
            )
            .mount(&server)
            .await;

        let ids = vec!["b1".to_string(), "b2".to_string(), "b3".to_string()];
        let details = client_for(&server).fetch_details_batch(&ids).await.unwrap();
        assert_eq!(details.len(), 2);
        assert!(details["b1"].is_marked);
        assert!(details["b2"].is_archived);
        assert!(!details.contains_key("b3"));
    }

    #[tokio::test]
    async fn test_fetch_details_batch_empty_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let details = client_for(&server).fetch_details_batch(&[]).await.unwrap();
        assert!(details.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_details_batch_requires_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_details_batch(&["b1".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Multipart(_)));
    }

    #[tokio::test]
    async fn test_search_by_site_reads_total_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/bookmarks"))
            .and(query_param("site", "example.com"))
            .and(query_param("page", "2"))
            .and(query_param("is_archived", "false"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Total-Pages", "3")
                    .set_body_json(json!([{"id": "b1", "url": "https://example.com/a"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/bookmarks"))
            .and(query_param("site", "nopages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client
            .search_by_site("example.com", 2, Some(false))
            .await
            .unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.bookmarks[0].id, "b1");

        let page = client.search_by_site("nopages", 1, None).await.unwrap();
        assert_eq!(page.total_pages, 1);
        assert!(page.bookmarks.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_article_html_is_raw() {
        let server = MockServer::start().await;
        let html = "<section><h1>Title</h1><img src=\"a.png\"></section>";
        Mock::given(method("GET"))
            .and(path("/api/bookmarks/b1/article"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .mount(&server)
            .await;

        let article = client_for(&server).fetch_article_html("b1").await.unwrap();
        assert_eq!(article, html);
    }

    #[tokio::test]
    async fn test_update_bookmark_sends_fields_and_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/bookmarks/b1"))
            .and(body_json(json!({"is_archived": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/bookmarks/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/bookmarks/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut fields = Map::new();
        fields.insert("is_archived".into(), Value::Bool(true));

        client.update_bookmark("b1", fields.clone()).await.unwrap();
        client.update_bookmark("gone", fields.clone()).await.unwrap();
        assert!(client.update_bookmark("broken", fields).await.is_err());
    }

    #[tokio::test]
    async fn test_create_bookmark() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookmarks"))
            .and(body_json(json!({"url": "https://example.com/new"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .create_bookmark("https://example.com/new")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_base_url_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readeck/api/bookmarks/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReadeckClient::new(
            Client::new(),
            Url::parse(&format!("{}/readeck/", server.uri())).unwrap(),
            "test-token",
            Duration::from_secs(5),
        );
        assert!(client.list_changes(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = ReadeckClient::new(
            Client::new(),
            Url::parse(&server.uri()).unwrap(),
            "test-token",
            Duration::from_millis(50),
        );
        let err = client.list_changes(None).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout));
    }
}
