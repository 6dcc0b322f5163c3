//! Azure Blob Storage over its REST API.
//!
//! Requests are authorized either with a Shared Key signature (account name +
//! key) or with a SAS token appended to the query string, depending on what
//! the connection string carries.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{BlobStore, StoreError, StoreResult};

const API_VERSION: &str = "2021-08-06";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
// Anonymous read access to the container and every blob in it
const PUBLIC_ACCESS_LEVEL: &str = "container";

// Well-known Azurite / storage emulator credentials
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

#[derive(Clone)]
pub enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => {
                write!(f, "SharedKey {{ account: {:?}, key: <redacted> }}", account)
            }
            Credential::Sas(_) => write!(f, "Sas(<redacted>)"),
        }
    }
}

/// A parsed storage account connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub blob_endpoint: Url,
    pub credential: Credential,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid("every segment must be key=value"))?;
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if fields
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Self::development();
        }

        let account = fields.get("accountname").cloned();

        let blob_endpoint = match fields.get("blobendpoint") {
            Some(endpoint) => Url::parse(endpoint)
                .map_err(|e| invalid(format!("BlobEndpoint is not a URL: {}", e)))?,
            None => {
                let account = account
                    .as_deref()
                    .ok_or_else(|| invalid("AccountName or BlobEndpoint is required"))?;
                let protocol = fields
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = fields
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                Url::parse(&format!("{}://{}.blob.{}", protocol, account, suffix))
                    .map_err(|e| invalid(format!("cannot build blob endpoint: {}", e)))?
            }
        };

        let credential = match (account, fields.get("accountkey"), fields.get("sharedaccesssignature")) {
            (Some(account), Some(key), _) => Credential::SharedKey {
                account,
                key: decode_key(key)?,
            },
            (_, _, Some(sas)) => Credential::Sas(sas.trim_start_matches('?').to_string()),
            _ => {
                return Err(invalid(
                    "expected AccountName + AccountKey or SharedAccessSignature",
                ))
            }
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }

    /// Local storage emulator.
    pub fn development() -> StoreResult<Self> {
        Ok(Self {
            blob_endpoint: Url::parse(DEV_BLOB_ENDPOINT)
                .map_err(|e| invalid(e.to_string()))?,
            credential: Credential::SharedKey {
                account: DEV_ACCOUNT_NAME.to_string(),
                key: decode_key(DEV_ACCOUNT_KEY)?,
            },
        })
    }
}

fn decode_key(key: &str) -> StoreResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(key)
        .map_err(|e| invalid(format!("AccountKey is not valid base64: {}", e)))
}

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::InvalidConnectionString {
        reason: reason.into(),
    }
}

pub struct AzureBlobStore {
    client: reqwest::Client,
    endpoint: Url,
    container: String,
    credential: Credential,
}

impl AzureBlobStore {
    pub fn new(connection: ConnectionString, container: impl Into<String>) -> StoreResult<Self> {
        let container = container.into();
        if container.is_empty() {
            return Err(StoreError::Other("container name must not be empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            endpoint: connection.blob_endpoint,
            container,
            credential: connection.credential,
        })
    }

    /// Parse the connection string and build a client. Fails before any
    /// network traffic when the credential is unusable.
    pub fn from_connection_string(raw: &str, container: impl Into<String>) -> StoreResult<Self> {
        Self::new(ConnectionString::parse(raw)?, container)
    }

    /// Bound every request to `timeout`. Without this, requests (and large
    /// uploads) may take as long as they need.
    pub fn with_timeout(mut self, timeout: Duration) -> StoreResult<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn url_for(&self, blob_path: Option<&str>) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Other(format!("unusable blob endpoint {}", self.endpoint)))?;
            segments.pop_if_empty().push(&self.container);
            if let Some(path) = blob_path {
                segments.extend(path.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        mut url: Url,
        ms_headers: Vec<(&'static str, String)>,
        content_type: Option<&str>,
        body: Bytes,
    ) -> StoreResult<reqwest::Response> {
        let mut ms_headers: BTreeMap<&'static str, String> = ms_headers.into_iter().collect();
        ms_headers.insert("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        ms_headers.insert("x-ms-version", API_VERSION.to_string());

        let mut headers = HeaderMap::new();
        for (name, value) in &ms_headers {
            headers.insert(HeaderName::from_static(*name), header_value(value)?);
        }
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, header_value(ct)?);
        }

        match &self.credential {
            Credential::SharedKey { account, key } => {
                let to_sign = string_to_sign(
                    method.as_str(),
                    body.len(),
                    content_type.unwrap_or(""),
                    &ms_headers,
                    &canonicalized_resource(account, &url),
                );
                let signature = sign(key, &to_sign)?;
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    header_value(&format!("SharedKey {}:{}", account, signature))?,
                );
            }
            Credential::Sas(token) => {
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{}&{}", existing, token),
                    _ => token.clone(),
                };
                url.set_query(Some(&query));
            }
        }

        debug!("{} {}", method, url.path());

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn create_container_if_not_exists(&self) -> StoreResult<bool> {
        let mut url = self.url_for(None)?;
        url.set_query(Some("restype=container"));
        let ms_headers = vec![("x-ms-blob-public-access", PUBLIC_ACCESS_LEVEL.to_string())];

        let response = self.send(Method::PUT, url, ms_headers, None, Bytes::new()).await?;
        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT if error_code(&response) == "ContainerAlreadyExists" => Ok(false),
            _ => Err(http_error(response).await),
        }
    }

    async fn upload(&self, remote_path: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        let url = self.url_for(Some(remote_path))?;
        let ms_headers = vec![("x-ms-blob-type", "BlockBlob".to_string())];

        let response = self
            .send(Method::PUT, url, ms_headers, Some(content_type), bytes)
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(http_error(response).await)
        }
    }
}

fn header_value(value: &str) -> StoreResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StoreError::Other(format!("invalid header value: {}", e)))
}

fn error_code(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn http_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let code = error_code(&response);
    let message = response.text().await.unwrap_or_default();
    StoreError::Http {
        status,
        code,
        message,
    }
}

/// Shared Key string-to-sign for the Blob service (version 2015-02-21+).
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &BTreeMap<&'static str, String>,
    canonicalized_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let standard = [
        verb, "", "", length.as_str(), "", content_type, "", "", "", "", "", "",
    ]
    .join("\n");

    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    format!("{}\n{}{}", standard, canonical_headers, canonicalized_resource)
}

fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    for (key, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{}:{}", key, values.join(",")));
    }
    resource
}

fn sign(key: &[u8], to_sign: &str) -> StoreResult<String> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Other(format!("invalid signing key: {}", e)))?;
    mac.update(to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "c2VjcmV0LWtleQ=="; // "secret-key"

    fn shared_key_store(server: &MockServer) -> AzureBlobStore {
        let cs = format!(
            "AccountName=acct;AccountKey={};BlobEndpoint={}",
            KEY,
            server.uri()
        );
        AzureBlobStore::from_connection_string(&cs, "reports").unwrap()
    }

    #[test]
    fn test_parse_account_key_connection_string() {
        let cs = ConnectionString::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        ))
        .unwrap();
        assert_eq!(cs.blob_endpoint.as_str(), "https://acct.blob.core.windows.net/");
        match cs.credential {
            Credential::SharedKey { account, key } => {
                assert_eq!(account, "acct");
                assert_eq!(key, b"secret-key");
            }
            Credential::Sas(_) => panic!("expected shared key"),
        }
    }

    #[test]
    fn test_parse_sas_connection_string() {
        let cs = ConnectionString::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=?sv=2021&sig=abc%3D",
        )
        .unwrap();
        match cs.credential {
            Credential::Sas(token) => assert_eq!(token, "sv=2021&sig=abc%3D"),
            Credential::SharedKey { .. } => panic!("expected SAS"),
        }
    }

    #[test]
    fn test_parse_development_storage() {
        let cs = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(cs.blob_endpoint.as_str(), "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_parse_rejects_missing_credentials() {
        let err = ConnectionString::parse("AccountName=acct").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConnectionString { .. }));
        assert!(ConnectionString::parse("garbage").is_err());
        assert!(ConnectionString::parse("AccountName=a;AccountKey=***").is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cs = ConnectionString::parse(&format!("AccountName=acct;AccountKey={}", KEY)).unwrap();
        let printed = format!("{:?}", cs);
        assert!(!printed.contains(KEY));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_string_to_sign_layout() {
        let mut ms = BTreeMap::new();
        ms.insert("x-ms-version", API_VERSION.to_string());
        ms.insert("x-ms-date", "Mon, 01 Jan 2024 00:00:00 GMT".to_string());
        ms.insert("x-ms-blob-type", "BlockBlob".to_string());

        let s = string_to_sign("PUT", 3, "image/png", &ms, "/acct/reports/a.png");
        assert_eq!(
            s,
            "PUT\n\n\n3\n\nimage/png\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             x-ms-version:2021-08-06\n\
             /acct/reports/a.png"
        );

        let empty = string_to_sign("PUT", 0, "", &BTreeMap::new(), "/acct/reports");
        assert_eq!(empty, "PUT\n\n\n\n\n\n\n\n\n\n\n\n/acct/reports");
    }

    #[test]
    fn test_canonicalized_resource_sorts_query() {
        let url = Url::parse("https://acct.blob.core.windows.net/reports?restype=container&Comp=list").unwrap();
        assert_eq!(
            canonicalized_resource("acct", &url),
            "/acct/reports\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn test_blob_url_encodes_segments() {
        let cs = ConnectionString::parse(&format!(
            "AccountName=acct;AccountKey={};BlobEndpoint=http://127.0.0.1:10000/acct",
            KEY
        ))
        .unwrap();
        let store = AzureBlobStore::new(cs, "reports").unwrap();
        let url = store.url_for(Some("ns/app/run/data/a b.png")).unwrap();
        assert_eq!(url.path(), "/acct/reports/ns/app/run/data/a%20b.png");
    }

    #[tokio::test]
    async fn test_create_container_created() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports"))
            .and(query_param("restype", "container"))
            .and(header("x-ms-blob-public-access", "container"))
            .and(header("x-ms-version", API_VERSION))
            .and(header_exists("x-ms-date"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        assert!(store
            .create_container_if_not_exists()
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_container_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports"))
            .respond_with(
                ResponseTemplate::new(409).insert_header("x-ms-error-code", "ContainerAlreadyExists"),
            )
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        assert!(!store
            .create_container_if_not_exists()
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_create_container_other_conflict_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports"))
            .respond_with(
                ResponseTemplate::new(409).insert_header("x-ms-error-code", "ContainerBeingDeleted"),
            )
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        let err = store
            .create_container_if_not_exists()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Http { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_upload_sends_block_blob() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports/ns/app/run/sub/b.png"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        store
            .upload("ns/app/run/sub/b.png", Bytes::from_static(&[1, 2, 3]), "image/png")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_with_sas_appends_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/reports/a.json"))
            .and(query_param("sig", "abc"))
            .and(query_param("sv", "2021"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let cs = format!("BlobEndpoint={};SharedAccessSignature=sv=2021&sig=abc", server.uri());
        let store = AzureBlobStore::from_connection_string(&cs, "reports").unwrap();
        store
            .upload("a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slow_upload_completes_without_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        store
            .upload("trace.zip", Bytes::from_static(b"zip"), "application/octet-stream")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_configured_timeout_bounds_requests() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let store = shared_key_store(&server)
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let err = store
            .upload("trace.zip", Bytes::from_static(b"zip"), "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Request(_)));
    }

    #[tokio::test]
    async fn test_upload_forbidden_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ms-error-code", "AuthenticationFailed")
                    .set_body_string("nope"),
            )
            .mount(&server)
            .await;

        let store = shared_key_store(&server);
        let err = store
            .upload("a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        match err {
            StoreError::Http { code, message, .. } => {
                assert_eq!(code, "AuthenticationFailed");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
