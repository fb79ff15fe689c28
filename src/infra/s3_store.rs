use crate::app::ports::BlobStorePort;
use async_trait::async_trait;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

/// Amazon S3 bucket, written with a single SigV4-signed `PutObject`.
///
/// Credentials and region come from the standard AWS chain (environment,
/// shared profile, instance or task role).
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    pub async fn from_env(bucket: &str, prefix: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::with_client(Client::new(&sdk_config), bucket, prefix)
    }

    pub fn with_client(client: Client, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl BlobStorePort for S3BlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> anyhow::Result<()> {
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 PutObject failed: {}", DisplayErrorContext(&e)))?;
        debug!("PutObject s3://{}/{}", self.bucket, object_key);
        Ok(())
    }

    fn describe(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{Credentials, Region};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one request, answers with `response` and returns the raw
    /// request head.
    async fn one_shot_server(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&raw).to_string();
            text.split("\r\n\r\n").next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn store_at(endpoint: &str, prefix: &str) -> S3BlobStore {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        S3BlobStore::with_client(Client::from_conf(config), "nba-stats", prefix)
    }

    #[tokio::test]
    async fn test_put_object_is_signed() {
        let (endpoint, server) = one_shot_server(response("200 OK", "")).await;
        let store = store_at(&endpoint, "daily");

        store
            .put("nba_team_stats_1.csv", b"Team,W\nBOS,64\n", "text/csv")
            .await
            .unwrap();

        let head = server.await.unwrap();
        let lower = head.to_ascii_lowercase();
        assert!(
            head.starts_with("PUT /nba-stats/daily/nba_team_stats_1.csv"),
            "{head}"
        );
        assert!(lower.contains("authorization: aws4-hmac-sha256 credential=akidtest/"));
        assert!(lower.contains("content-type: text/csv"));
    }

    #[tokio::test]
    async fn test_access_denied_is_failure() {
        let (endpoint, server) = one_shot_server(response(
            "403 Forbidden",
            "<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
        ))
        .await;
        let store = store_at(&endpoint, "");

        let err = store.put("x.csv", b"a\n", "text/csv").await.unwrap_err();

        assert!(err.to_string().contains("S3 PutObject failed"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_and_description_follow_prefix() {
        let store = store_at("http://127.0.0.1:9", "/exports/");
        assert_eq!(store.object_key("/a.csv"), "exports/a.csv");
        assert_eq!(store.describe(), "s3://nba-stats/exports");

        let bare = store_at("http://127.0.0.1:9", "");
        assert_eq!(bare.object_key("a.csv"), "a.csv");
        assert_eq!(bare.describe(), "s3://nba-stats");
    }
}
