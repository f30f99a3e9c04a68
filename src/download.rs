//! 다운로드 서비스
//!
//! `enqueue`는 핸들을 즉시 반환하고 전송은 별도 태스크에서 진행됩니다.
//! 완료는 등록 시 건네받은 채널로 `Signal::DownloadComplete`를 보내
//! 오케스트레이터의 직렬화된 신호 경로로 합류합니다. 핸들은 무관한
//! 다운로드의 완료 신호를 구분하는 상관관계 토큰입니다.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::InstallerError;
use crate::orchestrator::Signal;

/// 진행 중인 다운로드 요청의 상관관계 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadHandle(Uuid);

impl DownloadHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DownloadHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 다운로드 요청
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
}

/// 다운로드 완료 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// 전송 완료 — 설치기로 넘길 아티팩트 경로
    Success { artifact: PathBuf },
    /// 전송 실패
    Failed { reason: String },
    /// 사용자 취소
    Cancelled,
}

/// 다운로드 서비스 — 등록하고 핸들을 즉시 돌려받는다.
/// 완료는 `completions` 채널로 보고된다.
#[async_trait]
pub trait DownloadService: Send + Sync {
    async fn enqueue(
        &self,
        request: DownloadRequest,
        completions: mpsc::Sender<Signal>,
    ) -> Result<DownloadHandle, InstallerError>;
}

/// reqwest 스트리밍 기반 다운로드 서비스
pub struct HttpDownloadService {
    http: reqwest::Client,
}

impl HttpDownloadService {
    /// 전송 자체는 오래 걸릴 수 있으므로 연결 타임아웃만 둔다
    pub fn new(connect_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("omnistore-installer/0.1")
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to create HTTP client for downloads");

        Self { http }
    }
}

impl Default for HttpDownloadService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl DownloadService for HttpDownloadService {
    async fn enqueue(
        &self,
        request: DownloadRequest,
        completions: mpsc::Sender<Signal>,
    ) -> Result<DownloadHandle, InstallerError> {
        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                InstallerError::from_io(&e, "create_dir", &parent.to_string_lossy())
            })?;
        }

        let handle = DownloadHandle::new();
        let http = self.http.clone();

        tracing::info!("[Download] {} enqueued: {}", handle, request.url);

        tokio::spawn(async move {
            let outcome = transfer(&http, &request).await;
            match &outcome {
                DownloadOutcome::Success { artifact } => {
                    tracing::info!("[Download] {} completed: {:?}", handle, artifact);
                }
                DownloadOutcome::Failed { reason } => {
                    tracing::warn!("[Download] {} failed: {}", handle, reason);
                }
                DownloadOutcome::Cancelled => {
                    tracing::info!("[Download] {} cancelled", handle);
                }
            }
            if completions
                .send(Signal::DownloadComplete { handle, outcome })
                .await
                .is_err()
            {
                tracing::debug!("[Download] completion receiver dropped");
            }
        });

        Ok(handle)
    }
}

/// 청크 단위로 받아 파일에 기록
async fn transfer(http: &reqwest::Client, request: &DownloadRequest) -> DownloadOutcome {
    let response = match http.get(&request.url).send().await {
        Ok(r) => r,
        Err(e) => {
            return DownloadOutcome::Failed {
                reason: InstallerError::from_reqwest(&e, "download", &request.url).to_string(),
            }
        }
    };

    if !response.status().is_success() {
        return DownloadOutcome::Failed {
            reason: format!("HTTP {}", response.status()),
        };
    }

    let mut file = match tokio::fs::File::create(&request.destination).await {
        Ok(f) => f,
        Err(e) => {
            return DownloadOutcome::Failed {
                reason: format!("create {:?}: {}", request.destination, e),
            }
        }
    };

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                return DownloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = file.write_all(&bytes).await {
            return DownloadOutcome::Failed {
                reason: format!("write {:?}: {}", request.destination, e),
            };
        }
    }

    if let Err(e) = file.sync_all().await {
        return DownloadOutcome::Failed {
            reason: format!("sync {:?}: {}", request.destination, e),
        };
    }

    DownloadOutcome::Success {
        artifact: request.destination.clone(),
    }
}
