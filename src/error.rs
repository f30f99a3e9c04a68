//! 에러 처리
//!
//! ## 분류
//! - 네트워크 도달 불가 — 사용자에게 알리고 Idle로 복귀, 재시도 가능
//! - 권한 거부 — 조용히 Idle로 복귀, 자동 재시도 없음
//! - 다운로드 실패/취소 — 조용히 Idle로 복귀
//! - 스테일 신호(핸들 불일치, 잘못된 상태)는 에러가 아니라 무시 대상이며
//!   이 타입으로 표현하지 않는다

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 설치기 에러 타입
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum InstallerError {
    /// 스토어 서버에 도달할 수 없음 (프로브 실패 또는 타임아웃)
    #[error("store not reachable: {url}")]
    NetworkUnreachable { url: String },

    /// 사용자가 설치 권한을 거부함
    #[error("install permission denied")]
    PermissionDenied,

    /// 다운로드 실패 또는 사용자 취소 (둘을 구분하지 않는다)
    #[error("download failed: {reason}")]
    DownloadFailed { reason: String },

    /// HTTP 요청 타임아웃
    #[error("timeout after {duration_secs}s: {operation}")]
    Timeout { operation: String, duration_secs: u64 },

    /// HTTP 응답 오류 (non-2xx)
    #[error("http error ({status_code}): {message}")]
    HttpStatus { status_code: u16, message: String },

    /// 파일 시스템 오류
    #[error("file system error during {operation} on '{path}': {message}")]
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },

    /// 설정 오류
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl InstallerError {
    /// 사용자 행동(재시도)으로 복구 가능한 에러인지
    pub fn is_recoverable(&self) -> bool {
        match self {
            InstallerError::NetworkUnreachable { .. } => true,
            InstallerError::PermissionDenied => true,
            InstallerError::DownloadFailed { .. } => true,
            InstallerError::Timeout { .. } => true,
            InstallerError::HttpStatus { status_code, .. } => *status_code >= 500,
            InstallerError::FileSystem { .. } => false,
            InstallerError::Config { .. } => false,
        }
    }

    /// 사용자에게 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            InstallerError::NetworkUnreachable { url } => {
                format!("스토어 서버에 연결할 수 없습니다: {}", url)
            }
            InstallerError::PermissionDenied => {
                "설치 권한이 거부되었습니다.".to_string()
            }
            InstallerError::DownloadFailed { .. } => {
                "다운로드에 실패했습니다. 다시 시도해주세요.".to_string()
            }
            InstallerError::Timeout { .. } => {
                "서버 응답이 지연되고 있습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            InstallerError::HttpStatus { status_code, .. } => {
                if *status_code == 404 {
                    "요청한 파일을 찾을 수 없습니다.".to_string()
                } else if *status_code >= 500 {
                    "서버에 일시적인 문제가 있습니다. 잠시 후 다시 시도해주세요.".to_string()
                } else {
                    format!("서버 오류 ({})", status_code)
                }
            }
            InstallerError::FileSystem { .. } => {
                "파일 저장 중 오류가 발생했습니다. 디스크 공간을 확인해주세요.".to_string()
            }
            InstallerError::Config { message } => {
                format!("설정 오류: {}", message)
            }
        }
    }

    /// reqwest 에러를 InstallerError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str, url: &str) -> Self {
        if err.is_timeout() {
            InstallerError::Timeout {
                operation: operation.to_string(),
                duration_secs: 30,
            }
        } else if err.is_connect() {
            InstallerError::NetworkUnreachable {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            InstallerError::HttpStatus {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            InstallerError::DownloadFailed {
                reason: err.to_string(),
            }
        }
    }

    /// IO 에러를 InstallerError로 변환
    pub fn from_io(err: &std::io::Error, operation: &str, path: &str) -> Self {
        InstallerError::FileSystem {
            operation: operation.to_string(),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}
