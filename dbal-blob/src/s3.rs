//! S3-compatible blob backend.
//!
//! Talks to any S3 API (AWS, MinIO, Ceph RGW) over plain HTTP with AWS
//! Signature Version 4, either path-style (`endpoint/bucket/key`, the
//! default, which MinIO expects) or virtual-hosted style
//! (`bucket.endpoint/key`). Only the handful of object operations the blob
//! facade needs are implemented, including query-string presigning.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dbal_core::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{BlobList, BlobListOptions, BlobMetadata, BlobStorage, UploadOptions, DEFAULT_MAX_KEYS};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct S3Config {
    /// Scheme + host (+ optional port) of the S3 endpoint.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_path_style: bool,
}

pub struct S3Storage {
    config: S3Config,
    http: reqwest::Client,
}

const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode per the SigV4 rules (unreserved characters stay literal).
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn xml_unescape(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Pull the text content of every `<tag>...</tag>` pair, in order.
fn extract_all<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        out.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    out
}

fn extract_one<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    extract_all(xml, tag).into_iter().next()
}

impl S3Storage {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint_parts(&self) -> (&str, &str) {
        self.config
            .endpoint
            .split_once("://")
            .unwrap_or(("http", self.config.endpoint.as_str()))
    }

    /// (host header value, canonical URI for the given encoded key path).
    fn host_and_path(&self, encoded_key: &str) -> (String, String) {
        let (_scheme, host) = self.endpoint_parts();
        if self.config.use_path_style {
            let path = if encoded_key.is_empty() {
                format!("/{}", self.config.bucket)
            } else {
                format!("/{}/{encoded_key}", self.config.bucket)
            };
            (host.to_string(), path)
        } else {
            (format!("{}.{host}", self.config.bucket), format!("/{encoded_key}"))
        }
    }

    fn url_for(&self, canonical_path: &str, host: &str) -> String {
        let (scheme, _) = self.endpoint_parts();
        format!("{scheme}://{host}{canonical_path}")
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{date}/{}/s3/aws4_request", self.config.region)
    }

    fn signing_key(&self, date: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.config.secret_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn canonical_query(query: &[(String, String)]) -> String {
        let mut pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
            .collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Produce the full signed header set for one request.
    fn sign_headers(
        &self,
        method: &str,
        canonical_path: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        host: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(
            extra_headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string())),
        );
        headers.sort();

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{method}\n{canonical_path}\n{}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            Self::canonical_query(query)
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{}\n{}",
            self.credential_scope(&date),
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date), string_to_sign.as_bytes()));

        headers.push((
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={signed_headers}, Signature={signature}",
                self.config.access_key,
                self.credential_scope(&date)
            ),
        ));
        headers
    }

    async fn send(
        &self,
        method: reqwest::Method,
        key: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<reqwest::Response> {
        let encoded_key = uri_encode(key, false);
        let (host, canonical_path) = self.host_and_path(&encoded_key);

        let payload_hash = match &body {
            Some(bytes) => sha256_hex(bytes),
            None => sha256_hex(b""),
        };
        let headers = self.sign_headers(
            method.as_str(),
            &canonical_path,
            query,
            extra_headers,
            &host,
            &payload_hash,
            Utc::now(),
        );

        let mut url = self.url_for(&canonical_path, &host);
        let query_string = Self::canonical_query(query);
        if !query_string.is_empty() {
            url = format!("{url}?{query_string}");
        }

        let mut request = self.http.request(method, url.as_str());
        for (name, value) in &headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        request
            .send()
            .await
            .map_err(|e| Error::Database(format!("S3 request failed: {e}")))
    }

    async fn check_response(key: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let err = match status.as_u16() {
            404 => Error::NotFound(format!("Blob '{key}' not found")),
            401 => Error::Unauthorized("S3 rejected the request credentials".to_string()),
            403 => Error::Forbidden("S3 denied access".to_string()),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Error::Database(format!("S3 returned {status}: {body}"))
            }
        };
        Err(err)
    }

    fn metadata_from_headers(key: &str, headers: &reqwest::header::HeaderMap) -> BlobMetadata {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let mut custom_metadata = BTreeMap::new();
        for (name, value) in headers {
            let name = name.as_str();
            if let Some(suffix) = name.strip_prefix("x-amz-meta-") {
                if let Ok(value) = value.to_str() {
                    custom_metadata.insert(suffix.to_string(), value.to_string());
                }
            }
        }

        BlobMetadata {
            key: key.to_string(),
            size: header_str("content-length").parse().unwrap_or(0),
            content_type: {
                let ct = header_str("content-type");
                if ct.is_empty() { "application/octet-stream".to_string() } else { ct }
            },
            etag: header_str("etag").trim_matches('"').to_string(),
            last_modified: DateTime::parse_from_rfc2822(&header_str("last-modified"))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            custom_metadata,
        }
    }

    fn presigned_url_at(&self, key: &str, expires: Duration, now: DateTime<Utc>) -> String {
        let encoded_key = uri_encode(key, false);
        let (host, canonical_path) = self.host_and_path(&encoded_key);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let query: Vec<(String, String)> = vec![
            ("X-Amz-Algorithm".to_string(), "AWS4-HMAC-SHA256".to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{}", self.config.access_key, self.credential_scope(&date)),
            ),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), expires.as_secs().to_string()),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
        ];

        let canonical_request = format!(
            "GET\n{canonical_path}\n{}\nhost:{host}\n\nhost\n{UNSIGNED_PAYLOAD}",
            Self::canonical_query(&query)
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{}\n{}",
            self.credential_scope(&date),
            sha256_hex(canonical_request.as_bytes())
        );
        let signature = hex::encode(hmac_sha256(&self.signing_key(&date), string_to_sign.as_bytes()));

        format!(
            "{}?{}&X-Amz-Signature={signature}",
            self.url_for(&canonical_path, &host),
            Self::canonical_query(&query)
        )
    }

    async fn list_page(&self, options: &BlobListOptions) -> Result<BlobList> {
        let mut query: Vec<(String, String)> = vec![
            ("list-type".to_string(), "2".to_string()),
            (
                "max-keys".to_string(),
                options.max_keys.unwrap_or(DEFAULT_MAX_KEYS).to_string(),
            ),
        ];
        if !options.prefix.is_empty() {
            query.push(("prefix".to_string(), options.prefix.clone()));
        }
        if let Some(token) = &options.continuation_token {
            query.push(("continuation-token".to_string(), token.clone()));
        }

        let response = self
            .send(reqwest::Method::GET, "", &query, &[], None)
            .await?;
        let response = Self::check_response("", response).await?;
        let xml = response
            .text()
            .await
            .map_err(|e| Error::Database(format!("S3 list response unreadable: {e}")))?;

        let items = extract_all(&xml, "Contents")
            .into_iter()
            .map(|entry| BlobMetadata {
                key: xml_unescape(extract_one(entry, "Key").unwrap_or_default()),
                size: extract_one(entry, "Size").and_then(|s| s.parse().ok()).unwrap_or(0),
                content_type: "application/octet-stream".to_string(),
                etag: extract_one(entry, "ETag")
                    .map(|e| xml_unescape(e).trim_matches('"').to_string())
                    .unwrap_or_default(),
                last_modified: extract_one(entry, "LastModified")
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
                custom_metadata: BTreeMap::new(),
            })
            .collect();

        Ok(BlobList {
            items,
            is_truncated: extract_one(&xml, "IsTruncated") == Some("true"),
            next_token: extract_one(&xml, "NextContinuationToken").map(xml_unescape),
        })
    }
}

#[async_trait::async_trait]
impl BlobStorage for S3Storage {
    fn backend(&self) -> &str {
        "s3"
    }

    async fn upload(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<BlobMetadata> {
        if key.is_empty() {
            return Err(Error::Validation("Blob key must not be empty".to_string()));
        }
        if !options.overwrite && self.metadata(key).await.is_ok() {
            return Err(Error::Conflict(format!("Blob '{key}' already exists")));
        }

        let mut headers: Vec<(String, String)> =
            vec![("content-type".to_string(), options.content_type.clone())];
        for (name, value) in &options.metadata {
            headers.push((format!("x-amz-meta-{name}"), value.clone()));
        }

        let size = data.len() as u64;
        let response = self
            .send(reqwest::Method::PUT, key, &[], &headers, Some(data.clone()))
            .await?;
        let response = Self::check_response(key, response).await?;

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_else(|| crate::content_etag(&data));

        Ok(BlobMetadata {
            key: key.to_string(),
            size,
            content_type: options.content_type.clone(),
            etag,
            last_modified: Utc::now(),
            custom_metadata: options.metadata.clone(),
        })
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        let response = self.send(reqwest::Method::GET, key, &[], &[], None).await?;
        let response = Self::check_response(key, response).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Database(format!("S3 download failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 DELETE is idempotent; probe first so a missing key surfaces as
        // NotFound like the other backends.
        self.metadata(key).await?;
        let response = self.send(reqwest::Method::DELETE, key, &[], &[], None).await?;
        Self::check_response(key, response).await?;
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<BlobMetadata> {
        let response = self.send(reqwest::Method::HEAD, key, &[], &[], None).await?;
        let response = Self::check_response(key, response).await?;
        Ok(Self::metadata_from_headers(key, response.headers()))
    }

    async fn list(&self, options: &BlobListOptions) -> Result<BlobList> {
        self.list_page(options).await
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<BlobMetadata> {
        let source = format!(
            "/{}/{}",
            self.config.bucket,
            uri_encode(source_key, false)
        );
        let headers = vec![("x-amz-copy-source".to_string(), source)];
        let response = self
            .send(reqwest::Method::PUT, dest_key, &[], &headers, None)
            .await?;
        Self::check_response(source_key, response).await?;
        self.metadata(dest_key).await
    }

    async fn presigned_url(&self, key: &str, expires: Duration) -> Result<String> {
        Ok(self.presigned_url_at(key, expires, Utc::now()))
    }

    async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        let mut options = BlobListOptions::default();
        loop {
            let page = self.list_page(&options).await?;
            total += page.items.iter().map(|m| m.size).sum::<u64>();
            if !page.is_truncated {
                return Ok(total);
            }
            match page.next_token {
                Some(token) => options.continuation_token = Some(token),
                None => return Ok(total),
            }
        }
    }

    async fn object_count(&self) -> Result<u64> {
        let mut count = 0;
        let mut options = BlobListOptions::default();
        loop {
            let page = self.list_page(&options).await?;
            count += page.items.len() as u64;
            if !page.is_truncated {
                return Ok(count);
            }
            match page.next_token {
                Some(token) => options.continuation_token = Some(token),
                None => return Ok(count),
            }
        }
    }
}
