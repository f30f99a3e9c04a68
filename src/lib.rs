//! # OmniStore 부트스트랩 설치기
//!
//! 동반 스토어 패키지가 기기에 없을 때 한 번만 동작하는 설치기입니다.
//! 설치 여부 확인 → 권한 확인 → 네트워크 도달성 확인 → 아티팩트 다운로드 →
//! 플랫폼 설치기 실행 → 자기 비활성화 순서로 진행합니다.
//!
//! ## 동작 원리
//! - **오케스트레이터(orchestrator.rs)**: 단일 tokio 태스크가 모든 수명주기
//!   상태를 소유하고, 외부 신호를 도착 순서대로 처리
//! - **상태 머신(state.rs)**: 허용된 전이만 담은 테이블. 테이블 밖의 신호는
//!   조용히 무시되는 것이 계약
//! - **협력자(probe.rs / download.rs / platform.rs)**: 플랫폼 서비스는 전부
//!   트레이트 뒤에 있고, 결과는 신호로 되돌아온다
//!
//! ## 아키텍처
//! 브로드캐스트/콜백이 여러 곳에서 상태를 건드리던 구조를 액터 하나로
//! 직렬화한 형태입니다:
//! - **신호 유입**: `mpsc` 채널 하나 — 사용자 액션, 권한 결과, 도달성 결과,
//!   다운로드 완료, 패키지 추가 알림, 연결 상태 변화
//! - **이벤트 유출**: `broadcast` 채널 — UI/CLI가 상태 변화를 구독
//! - **백그라운드 작업**: 프로브/프롬프트/전송은 별도 태스크에서 실행되고
//!   상태는 절대 직접 만지지 않는다

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod config;
pub mod download;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod probe;
pub mod state;


// Re-exports for convenience
pub use config::{EnvSettings, InstallerConfig, MapSettings, SettingsStore};
pub use download::{
    DownloadHandle, DownloadOutcome, DownloadRequest, DownloadService, HttpDownloadService,
};
pub use error::InstallerError;
pub use orchestrator::{
    Collaborators, InstallOrchestrator, InstallerEvent, OrchestratorHandle, Signal,
};
pub use platform::{
    CommandInstallLauncher, ConsolePermissionPrompt, FsPresenceChecker, FsSelfDisabler,
    InstallLauncher, PermissionPrompt, PresenceChecker, SelfDisabler,
};
pub use probe::{HttpReachabilityProbe, ReachabilityProbe};
pub use state::OrchestratorState;

use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════
// 코어 데이터 모델
// ══════════════════════════════════════════════════════

/// 설치 대상 — 패키지 식별자와 해석 완료된 다운로드 URL.
/// 세션 시작 시 한 번 해석되고 이후 불변이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTarget {
    /// 동반 패키지의 안정 식별자 (예: "org.omnirom.omnistore")
    pub package_id: String,
    /// 원격 아티팩트 파일명 (예: "OmniStore.apk")
    pub artifact_name: String,
    /// 설정/기본값으로부터 해석된 최종 다운로드 URL
    pub download_url: String,
}

impl InstallTarget {
    /// 설정 스토어 → config 값 → 기본값 순으로 URL을 해석하여 대상을 만든다
    pub fn resolve(config: &InstallerConfig, settings: &dyn SettingsStore) -> Self {
        Self {
            package_id: config.package_id.clone(),
            artifact_name: config.artifact_name.clone(),
            download_url: config.resolve_download_url(settings),
        }
    }
}

/// 런타임에 관찰한 능력 플래그 — 외부 콜백이 갱신하고
/// 오케스트레이터가 다음 전이를 결정할 때 읽는다. 저장하지 않는다.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityFlags {
    /// 네트워크 도달 가능 여부 (연결 콜백/프로브 결과로 갱신)
    pub network_reachable: bool,
    /// 외부 출처 설치 허용 여부
    pub install_permitted: bool,
    /// 저장소 읽기 권한 여부
    pub storage_granted: bool,
}

impl CapabilityFlags {
    /// 다운로드/설치를 진행해도 되는지
    pub fn install_allowed(&self) -> bool {
        self.install_permitted && self.storage_granted
    }
}

/// 관찰 가능한 설치기 상태 스냅샷 (구독자/CLI 표시용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerStatus {
    /// 현재 수명주기 상태
    pub state: OrchestratorState,
    /// 마지막 확인 시점에 대상 패키지가 설치되어 있었는지
    pub target_installed: bool,
    /// 진행 중인 다운로드가 있는지
    pub download_in_flight: bool,
    /// 마지막 설치 여부 확인 시각 (RFC3339)
    pub last_presence_check: Option<String>,
    /// 해석된 다운로드 URL (진단 표시용)
    pub resolved_url: String,
}

impl InstallerStatus {
    pub fn new(target: &InstallTarget) -> Self {
        Self {
            state: OrchestratorState::Idle,
            target_installed: false,
            download_in_flight: false,
            last_presence_check: None,
            resolved_url: target.download_url.clone(),
        }
    }
}
