use super::{ProbeError, ProbeKind, ProbeRunner, ProbeSample};
use crate::config::ProbeConfig;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use std::time::{Duration, Instant};

/// HTTP probe runner: sized GET downloads, POST uploads, HEAD pings.
pub struct HttpProbeRunner {
    client: Client,
    download_url: String,
    upload_url: String,
    ping_url: String,
}

impl HttpProbeRunner {
    pub fn new(cfg: &ProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(ProbeError::Client)?;
        Ok(Self {
            client,
            download_url: cfg.download_url.clone(),
            upload_url: cfg.upload_url.clone(),
            ping_url: cfg.ping_url.clone(),
        })
    }

    fn download_target(&self, bytes: usize) -> String {
        format!("{}{}", self.download_url, bytes)
    }
}

/// Random alphanumeric body of exactly `len` bytes.
pub fn synthetic_payload(len: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .collect()
}

fn check_status(kind: ProbeKind, resp: &reqwest::Response) -> Result<(), ProbeError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status {
            kind,
            status: status.as_u16(),
        })
    }
}

#[async_trait::async_trait]
impl ProbeRunner for HttpProbeRunner {
    async fn download(&self, bytes: usize) -> Result<ProbeSample, ProbeError> {
        let kind = ProbeKind::Download;
        let url = self.download_target(bytes);

        let start = Instant::now();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProbeError::Transport { kind, source })?;
        check_status(kind, &resp)?;
        let body = resp
            .bytes()
            .await
            .map_err(|source| ProbeError::Transport { kind, source })?;
        let elapsed = start.elapsed();

        tracing::debug!(%url, received = body.len(), ?elapsed, "download probe finished");
        Ok(ProbeSample::new(body.len() as u64, elapsed))
    }

    async fn upload(&self, bytes: usize) -> Result<ProbeSample, ProbeError> {
        let kind = ProbeKind::Upload;
        let payload = synthetic_payload(bytes);
        let sent = payload.len() as u64;

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|source| ProbeError::Transport { kind, source })?;
        let elapsed = start.elapsed();
        check_status(kind, &resp)?;

        tracing::debug!(url = %self.upload_url, sent, ?elapsed, "upload probe finished");
        Ok(ProbeSample::new(sent, elapsed))
    }

    async fn ping(&self) -> Result<Duration, ProbeError> {
        let kind = ProbeKind::Ping;

        let start = Instant::now();
        let resp = self
            .client
            .head(&self.ping_url)
            .send()
            .await
            .map_err(|source| ProbeError::Transport { kind, source })?;
        let elapsed = start.elapsed();
        check_status(kind, &resp)?;

        tracing::debug!(url = %self.ping_url, ?elapsed, "ping probe finished");
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_payload_length_and_charset() {
        let p = synthetic_payload(4096);
        assert_eq!(p.len(), 4096);
        assert!(p.iter().all(|b| b.is_ascii_alphanumeric()));
        assert!(synthetic_payload(0).is_empty());
    }

    #[test]
    fn test_download_target_appends_size() {
        let runner = HttpProbeRunner::new(&ProbeConfig::default()).unwrap();
        assert_eq!(
            runner.download_target(102400),
            "https://httpbin.org/bytes/102400"
        );
    }
}
