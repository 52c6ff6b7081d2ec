//! Blob service client
//!
//! Implements the `BlobStore` trait from cd-core over the Blob REST API.
//! Every exchange is signed with Shared Key and retried on throttling and
//! server errors.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use cd_core::{
    AccessPolicy, BlobEntry, BlobKind, BlobProperties, BlobStore, ContainerAcl, ContainerInfo, Drive, Error,
    ListSegment, ListingOptions, PageRange, Result, RetryConfig, SasResource, is_retryable_error,
    retry_with_backoff,
};

use crate::API_VERSION;
use crate::auth::{SharedKeyCredential, SignableRequest};
use crate::xml;

/// Blob names keep their `/` separators; everything else non-unreserved is escaped
const BLOB_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// One REST call, rebuilt and re-signed on every attempt
#[derive(Debug, Clone)]
struct BlobRequest<'a> {
    method: Method,
    container: Option<&'a str>,
    blob: Option<&'a str>,
    query: Vec<(&'static str, String)>,
    headers: Vec<(String, String)>,
    content_type: Option<String>,
    body: Bytes,
}

impl<'a> BlobRequest<'a> {
    fn new(method: Method) -> Self {
        Self {
            method,
            container: None,
            blob: None,
            query: Vec::new(),
            headers: Vec::new(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    fn container(mut self, container: &'a str) -> Self {
        self.container = Some(container);
        self
    }

    fn blob(mut self, container: &'a str, blob: &'a str) -> Self {
        self.container = Some(container);
        self.blob = Some(blob);
        self
    }

    fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    fn body(mut self, body: Bytes, content_type: Option<String>) -> Self {
        self.body = body;
        self.content_type = content_type;
        self
    }
}

/// Azure Blob Storage client for one drive
pub struct AzureBlobClient {
    http: reqwest::Client,
    endpoint: String,
    /// Path component of the endpoint, e.g. `/devstoreaccount1` for the emulator
    endpoint_path: String,
    credential: SharedKeyCredential,
    retry: RetryConfig,
}

impl AzureBlobClient {
    /// Connect to the account a drive describes
    pub fn new(drive: &Drive) -> Result<Self> {
        if !drive.kind.is_supported() {
            return Err(Error::UnsupportedFeature(format!(
                "Drive '{}' uses '{}' storage, only azureblob is supported",
                drive.name, drive.kind
            )));
        }
        drive.validate()?;

        let endpoint = drive.endpoint.trim_end_matches('/').to_string();
        let endpoint_path = url::Url::parse(&endpoint)
            .map(|u| u.path().trim_end_matches('/').to_string())
            .map_err(|e| Error::Config(format!("Invalid endpoint '{endpoint}': {e}")))?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        tracing::debug!(drive = %drive.name, endpoint = %endpoint, "Blob client created");

        Ok(Self {
            http,
            endpoint,
            endpoint_path,
            credential: SharedKeyCredential::new(&drive.account, &drive.key)?,
            retry: drive.retry_config(),
        })
    }

    /// Encoded URL path below the endpoint, starting with `/`
    fn resource_path(&self, container: Option<&str>, blob: Option<&str>) -> String {
        let mut path = self.endpoint_path.clone();
        path.push('/');
        if let Some(container) = container {
            path.push_str(container);
            if let Some(blob) = blob {
                path.push('/');
                path.extend(utf8_percent_encode(blob, BLOB_PATH_ENCODE_SET));
            }
        }
        path
    }

    fn url(&self, request: &BlobRequest<'_>) -> String {
        let base = self.endpoint.strip_suffix(&self.endpoint_path).unwrap_or(&self.endpoint);
        let mut url = format!("{base}{}", self.resource_path(request.container, request.blob));
        for (i, (k, v)) in request.query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(k);
            url.push('=');
            url.push_str(&urlencoding::encode(v));
        }
        url
    }

    async fn send(&self, request: BlobRequest<'_>) -> Result<reqwest::Response> {
        retry_with_backoff(&self.retry, || self.send_once(&request), is_retryable_error).await
    }

    async fn send_once(&self, request: &BlobRequest<'_>) -> Result<reqwest::Response> {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let mut ms_headers = request.headers.clone();
        ms_headers.push(("x-ms-date".to_string(), date));
        ms_headers.push(("x-ms-version".to_string(), API_VERSION.to_string()));

        let content_type = request.content_type.as_deref().unwrap_or_default();
        let resource_path = format!(
            "/{}{}",
            self.credential.account(),
            self.resource_path(request.container, request.blob)
        );
        let authorization = self.credential.authorization(&SignableRequest {
            method: request.method.as_str(),
            content_length: request.body.len() as u64,
            content_type,
            ms_headers: &ms_headers,
            resource_path: &resource_path,
            query: &request.query,
        })?;

        let url = self.url(request);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(http::header::AUTHORIZATION, authorization);
        for (name, value) in &ms_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !content_type.is_empty() {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        if request.method == Method::PUT {
            builder = builder.body(request.body.clone());
        }

        tracing::debug!(method = %request.method, url = %url, "Blob request");
        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = if request.method == Method::HEAD {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        Err(status_error(status, &body, &url))
    }

    async fn list_page(
        &self,
        container: &str,
        options: &ListingOptions,
        max_results: Option<usize>,
        marker: Option<String>,
    ) -> Result<ListSegment> {
        let mut request = BlobRequest::new(Method::GET)
            .container(container)
            .query("restype", "container")
            .query("comp", "list");
        if !options.prefix.is_empty() {
            request = request.query("prefix", options.prefix.as_str());
        }
        let include = options.include_list();
        if !include.is_empty() {
            request = request.query("include", include.join(","));
        }
        if let Some(max) = max_results {
            request = request.query("maxresults", max.to_string());
        }
        if let Some(marker) = marker {
            request = request.query("marker", marker);
        }

        let body = self.send(request).await?.text().await.map_err(transport_error)?;
        Ok(xml::parse_blobs(&body))
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request timed out: {e}"))
    } else if e.is_connect() {
        Error::Network(format!("connection refused: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str, url: &str) -> Error {
    let message = xml::error_message(body).unwrap_or_else(|| match body.trim() {
        "" => format!("{} {url}", status.canonical_reason().unwrap_or("error")),
        text => text.to_string(),
    });
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        _ => Error::Backend {
            status: status.as_u16(),
            message,
        },
    }
}

fn header<'h>(response: &'h reqwest::Response, name: &str) -> Option<&'h str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn range_header(offset: u64, length: u64) -> String {
    format!("bytes={offset}-{}", offset + length - 1)
}

#[async_trait]
impl BlobStore for AzureBlobClient {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut request = BlobRequest::new(Method::GET).query("comp", "list");
            if let Some(m) = marker.take() {
                request = request.query("marker", m);
            }
            let body = self.send(request).await?.text().await.map_err(transport_error)?;
            let (page, next) = xml::parse_containers(&body);
            containers.extend(page);
            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(containers)
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        let request = BlobRequest::new(Method::HEAD)
            .container(container)
            .query("restype", "container");
        match self.send(request).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .container(container)
            .query("restype", "container");
        self.send(request).await?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<bool> {
        let request = BlobRequest::new(Method::DELETE)
            .container(container)
            .query("restype", "container");
        match self.send(request).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_blobs(&self, container: &str, options: &ListingOptions) -> Result<Vec<BlobEntry>> {
        let mut items = Vec::new();
        let mut marker = None;
        loop {
            let segment = self.list_page(container, options, None, marker).await?;
            items.extend(segment.items);
            match segment.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    async fn list_blobs_segment(
        &self,
        container: &str,
        options: &ListingOptions,
        max_results: usize,
        marker: Option<String>,
    ) -> Result<ListSegment> {
        self.list_page(container, options, Some(max_results), marker).await
    }

    async fn blob_properties(&self, container: &str, blob: &str) -> Result<Option<BlobProperties>> {
        let request = BlobRequest::new(Method::HEAD).blob(container, blob);
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(BlobProperties {
            kind: header(&response, "x-ms-blob-type")
                .and_then(BlobKind::from_wire)
                .unwrap_or_default(),
            size: header(&response, "content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_modified: header(&response, "last-modified").and_then(xml::http_date),
            etag: header(&response, "etag").map(str::to_string),
            content_type: header(&response, "content-type").map(str::to_string),
        }))
    }

    async fn create_page_blob(&self, container: &str, blob: &str, size: u64) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .blob(container, blob)
            .header("x-ms-blob-type", BlobKind::Page.as_wire())
            .header("x-ms-blob-content-length", size.to_string());
        self.send(request).await?;
        Ok(())
    }

    async fn page_ranges(&self, container: &str, blob: &str, offset: u64, length: u64) -> Result<Vec<PageRange>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let request = BlobRequest::new(Method::GET)
            .blob(container, blob)
            .query("comp", "pagelist")
            .header("x-ms-range", range_header(offset, length));
        let body = self.send(request).await?.text().await.map_err(transport_error)?;
        Ok(xml::parse_page_list(&body))
    }

    async fn write_pages(&self, container: &str, blob: &str, offset: u64, data: Bytes) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .blob(container, blob)
            .query("comp", "page")
            .header("x-ms-page-write", "update")
            .header("x-ms-range", range_header(offset, data.len() as u64))
            .body(data, None);
        self.send(request).await?;
        Ok(())
    }

    async fn put_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .blob(container, blob)
            .header("x-ms-blob-type", BlobKind::Block.as_wire())
            .body(data, content_type);
        self.send(request).await?;
        Ok(())
    }

    async fn create_append_blob(&self, container: &str, blob: &str) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .blob(container, blob)
            .header("x-ms-blob-type", BlobKind::Append.as_wire());
        self.send(request).await?;
        Ok(())
    }

    async fn append_block(&self, container: &str, blob: &str, data: Bytes) -> Result<()> {
        let request = BlobRequest::new(Method::PUT)
            .blob(container, blob)
            .query("comp", "appendblock")
            .body(data, None);
        self.send(request).await?;
        Ok(())
    }

    async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes> {
        let request = BlobRequest::new(Method::GET).blob(container, blob);
        self.send(request).await?.bytes().await.map_err(transport_error)
    }

    async fn delete_blob(&self, container: &str, blob: &str, snapshot: Option<String>) -> Result<()> {
        let mut request = BlobRequest::new(Method::DELETE).blob(container, blob);
        request = match snapshot {
            Some(snapshot) => request.query("snapshot", snapshot),
            None => request.header("x-ms-delete-snapshots", "include"),
        };
        match self.send(request).await {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_container_acl(&self, container: &str) -> Result<ContainerAcl> {
        let request = BlobRequest::new(Method::GET)
            .container(container)
            .query("restype", "container")
            .query("comp", "acl");
        let response = self.send(request).await?;
        let public_access = header(&response, "x-ms-blob-public-access").map(str::to_string);
        let body = response.text().await.map_err(transport_error)?;
        Ok(ContainerAcl {
            public_access,
            policies: xml::parse_signed_identifiers(&body),
        })
    }

    async fn set_container_acl(&self, container: &str, acl: ContainerAcl) -> Result<()> {
        let mut request = BlobRequest::new(Method::PUT)
            .container(container)
            .query("restype", "container")
            .query("comp", "acl")
            .body(
                Bytes::from(xml::signed_identifiers(&acl.policies)),
                Some("application/xml".to_string()),
            );
        if let Some(access) = acl.public_access {
            request = request.header("x-ms-blob-public-access", access);
        }
        self.send(request).await?;
        Ok(())
    }

    fn sas_token(&self, resource: &SasResource, policy: &AccessPolicy, policy_name: Option<String>) -> Result<String> {
        self.credential.service_sas(resource, policy, policy_name.as_deref())
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        let base = self.endpoint.strip_suffix(&self.endpoint_path).unwrap_or(&self.endpoint);
        format!("{base}{}", self.resource_path(Some(container), Some(blob)))
    }
}
