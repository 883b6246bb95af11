use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hex;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::StorageSettings;
use crate::storage::{ObjectStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

const AWS_URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// S3-compatible object store speaking SigV4 directly (path-style requests).
/// Works against AWS S3 and anything S3-flavored (MinIO in dev).
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    bucket: String,
    region: String,
    endpoint: Url,
    host: String,
    access_key: String,
    secret_key: String,
    client: Client,
}

struct SignedRequest {
    url: Url,
    authorization: String,
    amz_date: String,
    payload_hash: String,
}

impl S3ObjectStore {
    pub fn new(settings: &StorageSettings, bucket: &str) -> Result<Self> {
        let access_key = settings
            .access_key
            .clone()
            .context("Object storage access key is not configured")?;
        let secret_key = settings
            .secret_key
            .clone()
            .context("Object storage secret key is not configured")?;

        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", settings.region));

        let endpoint = Url::parse(&endpoint).context("Invalid object storage endpoint URL")?;
        let host = endpoint
            .host_str()
            .map(|h| h.to_lowercase())
            .context("Object storage endpoint must include a host")?;

        // Enforce HTTPS in production mode (check APP_ENV at runtime)
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "prod".to_string());
        if app_env == "prod" && endpoint.scheme() != "https" {
            bail!(
                "Object storage endpoint must use HTTPS in production mode. Got: {}",
                endpoint.scheme()
            );
        }

        // In development, allow both HTTP and HTTPS
        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            bail!(
                "Invalid endpoint scheme: {}. Must be http or https.",
                endpoint.scheme()
            );
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for object storage")?;

        Ok(Self {
            bucket: bucket.to_string(),
            region: settings.region.clone(),
            endpoint,
            host,
            access_key,
            secret_key,
            client,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn encode_key(key: &str) -> String {
        key.split('/')
            .map(|segment| utf8_percent_encode(segment, AWS_URI_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Canonical URI is always path-style: `/{bucket}` for bucket-level
    /// operations, `/{bucket}/{key}` for object-level ones.
    fn canonical_uri(&self, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("/{}/{}", self.bucket, Self::encode_key(key)),
            None => format!("/{}", self.bucket),
        }
    }

    fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, AWS_URI_ENCODE_SET),
                    utf8_percent_encode(value, AWS_URI_ENCODE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Signs a header-authenticated request (SigV4). The canonical query
    /// string doubles as the request query so the signature always matches
    /// what goes on the wire.
    fn signed_request(
        &self,
        method: &str,
        key: Option<&str>,
        query: &BTreeMap<String, String>,
        payload: &[u8],
    ) -> SignedRequest {
        let canonical_uri = self.canonical_uri(key);
        let canonical_query = Self::canonical_query_string(query);

        let payload_hash = hex::encode(Sha256::digest(payload));
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            self.host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date, scope, hashed_canonical_request
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3");
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, scope, signed_headers, signature
        );

        let mut url = self.endpoint.clone();
        match key {
            Some(key) => url.set_path(&format!("{}/{}", self.bucket, Self::encode_key(key))),
            None => url.set_path(&self.bucket),
        }
        if !canonical_query.is_empty() {
            url.set_query(Some(&canonical_query));
        }

        SignedRequest {
            url,
            authorization,
            amz_date,
            payload_hash,
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<(Vec<String>, Option<String>), StoreError> {
        let mut query = BTreeMap::new();
        query.insert("list-type".to_string(), "2".to_string());
        query.insert("prefix".to_string(), prefix.to_string());
        if let Some(token) = continuation_token {
            query.insert("continuation-token".to_string(), token.to_string());
        }

        let signed = self.signed_request("GET", None, &query, b"");
        let response = self
            .client
            .get(signed.url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        parse_list_response(&body)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let signed = self.signed_request("GET", Some(key), &BTreeMap::new(), b"");
        let response = self
            .client
            .get(signed.url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StoreError::Http(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let signed = self.signed_request("PUT", Some(key), &BTreeMap::new(), &bytes);
        let response = self
            .client
            .put(signed.url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Http(status.as_u16()));
        }

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let (mut page, next) = self.list_page(prefix, token.as_deref()).await?;
            keys.append(&mut page);
            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(keys)
    }

    fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let ttl_secs = ttl.as_secs().min(604800) as u32;
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let canonical_uri = self.canonical_uri(Some(key));

        let mut params = BTreeMap::new();
        params.insert("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into());
        params.insert(
            "X-Amz-Credential".into(),
            format!("{}/{}", self.access_key, scope),
        );
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), ttl_secs.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "host".into());

        let canonical_query = Self::canonical_query_string(&params);
        let canonical_headers = format!("host:{}\n", self.host);
        let signed_headers = "host";
        let payload_hash = "UNSIGNED-PAYLOAD";

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let hashed_canonical_request = Sha256::digest(canonical_request.as_bytes());
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(hashed_canonical_request)
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3");
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

        let mut final_query = params;
        final_query.insert("X-Amz-Signature".into(), signature);
        let query_with_signature = Self::canonical_query_string(&final_query);

        let mut url = self.endpoint.clone();
        url.set_path(&format!("{}/{}", self.bucket, Self::encode_key(key)));
        url.set_query(Some(&query_with_signature));

        Ok(url.to_string())
    }
}

/// Parses a ListObjectsV2 response body into (keys, next continuation token).
fn parse_list_response(xml: &str) -> Result<(Vec<String>, Option<String>), StoreError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| StoreError::InvalidResponse(format!("ListObjectsV2 XML: {}", e)))?;

    let keys = doc
        .descendants()
        .filter(|node| node.has_tag_name("Key"))
        .filter_map(|node| node.text())
        .map(str::to_string)
        .collect();

    let truncated = doc
        .descendants()
        .find(|node| node.has_tag_name("IsTruncated"))
        .and_then(|node| node.text())
        .map(|text| text == "true")
        .unwrap_or(false);

    let next_token = if truncated {
        doc.descendants()
            .find(|node| node.has_tag_name("NextContinuationToken"))
            .and_then(|node| node.text())
            .map(str::to_string)
    } else {
        None
    };

    Ok((keys, next_token))
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let mut key = format!("AWS4{}", secret).into_bytes();
    key = hmac_sign(&key, date);
    key = hmac_sign(&key, region);
    key = hmac_sign(&key, service);
    hmac_sign(&key, b"aws4_request")
}

fn hmac_sign(key: &[u8], message: impl AsRef<[u8]>) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message.as_ref());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str) -> StorageSettings {
        StorageSettings {
            endpoint: Some(endpoint.to_string()),
            region: "us-east-1".into(),
            access_key: Some("key".into()),
            secret_key: Some("secret".into()),
            content_bucket: "word-puzzle-421".into(),
            ratings_bucket: None,
            url_ttl_seconds: 3600,
            fallback_dir: "fallback_storage".into(),
            example_puzzle_path: "assets/example_puzzle.json".into(),
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_https_required_in_prod() {
        std::env::set_var("APP_ENV", "prod");

        let result = S3ObjectStore::new(&settings("http://insecure.com"), "word-puzzle-421");
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("HTTPS"));
        assert!(err_msg.contains("production"));

        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_http_allowed_in_dev() {
        std::env::set_var("APP_ENV", "dev");

        let result = S3ObjectStore::new(&settings("http://localhost:9000"), "word-puzzle-421");
        assert!(result.is_ok());

        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_https_always_works() {
        std::env::set_var("APP_ENV", "prod");

        let result = S3ObjectStore::new(&settings("https://s3.us-east-1.amazonaws.com"), "bucket");
        assert!(result.is_ok());

        std::env::remove_var("APP_ENV");
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let result = S3ObjectStore::new(&settings("ftp://example.com"), "bucket");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut cfg = settings("https://s3.us-east-1.amazonaws.com");
        cfg.access_key = None;
        let result = S3ObjectStore::new(&cfg, "bucket");
        assert!(result.is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_presigned_url_shape() {
        std::env::set_var("APP_ENV", "dev");

        let store = S3ObjectStore::new(&settings("https://s3.us-east-1.amazonaws.com"), "bucket")
            .expect("store");
        let url = store
            .presign_get("images/green apple.png", Duration::from_secs(3600))
            .expect("presigned url");

        assert!(url.starts_with("https://s3.us-east-1.amazonaws.com/bucket/images/green%20apple.png?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));

        std::env::remove_var("APP_ENV");
    }

    #[test]
    fn test_parse_list_response_single_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
                <Name>word-puzzle-421</Name>
                <Prefix>puzzles/</Prefix>
                <KeyCount>2</KeyCount>
                <IsTruncated>false</IsTruncated>
                <Contents><Key>puzzles/a1.json</Key><Size>120</Size></Contents>
                <Contents><Key>puzzles/b2.json</Key><Size>98</Size></Contents>
            </ListBucketResult>"#;

        let (keys, token) = parse_list_response(xml).expect("parse");
        assert_eq!(keys, vec!["puzzles/a1.json", "puzzles/b2.json"]);
        assert!(token.is_none());
    }

    #[test]
    fn test_parse_list_response_truncated() {
        let xml = r#"<ListBucketResult>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>abc+123=</NextContinuationToken>
                <Contents><Key>puzzles/a1.json</Key></Contents>
            </ListBucketResult>"#;

        let (keys, token) = parse_list_response(xml).expect("parse");
        assert_eq!(keys, vec!["puzzles/a1.json"]);
        assert_eq!(token.as_deref(), Some("abc+123="));
    }

    #[test]
    fn test_parse_list_response_rejects_garbage() {
        assert!(parse_list_response("not xml at all <<<").is_err());
    }
}
