//! 네트워크 도달성 프로브
//!
//! 다운로드 전에 해석된 URL로 GET을 보내 "네트워크 없음"과
//! "다운로드 실패"를 구분합니다. 2xx가 아니면 전부 도달 불가로 취급합니다.

use std::time::Duration;

use async_trait::async_trait;

/// HTTP 연결 타임아웃
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP 읽기 타임아웃
const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// 도달성 프로브 — URL에 GET을 보내 2xx 응답이면 true
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

/// reqwest 기반 프로브
pub struct HttpReachabilityProbe {
    http: reqwest::Client,
}

impl HttpReachabilityProbe {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("omnistore-installer/0.1")
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .expect("Failed to create HTTP client for probe");

        Self { http }
    }
}

impl Default for HttpReachabilityProbe {
    fn default() -> Self {
        Self::new(HTTP_CONNECT_TIMEOUT, HTTP_READ_TIMEOUT)
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::debug!("[Probe] response: {}", resp.status());
                false
            }
            Err(e) => {
                tracing::debug!("[Probe] request failed: {}", e);
                false
            }
        }
    }
}
