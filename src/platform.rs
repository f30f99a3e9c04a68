//! 플랫폼 협력자
//!
//! 패키지 레지스트리 조회, 설치기 실행, 권한 프롬프트, 자기 비활성화 등
//! 플랫폼 서비스의 트레이트와 호스트 구현입니다. 오케스트레이터는 이
//! 트레이트만 알고, 결과는 신호로 되돌려받습니다.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// 대상 패키지 설치 여부 조회. 조회 실패는 미설치로 취급한다.
pub trait PresenceChecker: Send + Sync {
    fn is_installed(&self, package_id: &str) -> bool;
}

/// 레지스트리 디렉터리 기반 설치 여부 확인 —
/// `<registry_dir>/<package_id>` 항목이 있으면 설치된 것으로 본다
pub struct FsPresenceChecker {
    registry_dir: PathBuf,
}

impl FsPresenceChecker {
    pub fn new(registry_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
        }
    }
}

impl PresenceChecker for FsPresenceChecker {
    fn is_installed(&self, package_id: &str) -> bool {
        // 읽기 오류는 전부 미설치로 간주 (fail closed)
        std::fs::metadata(self.registry_dir.join(package_id)).is_ok()
    }
}

/// 다운로드된 아티팩트를 플랫폼 설치기로 넘긴다. fire-and-forget.
pub trait InstallLauncher: Send + Sync {
    fn launch(&self, artifact: &Path);
}

/// 설정된 커맨드에 아티팩트 경로를 붙여 실행하는 런처
pub struct CommandInstallLauncher {
    command: Vec<String>,
}

impl CommandInstallLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl InstallLauncher for CommandInstallLauncher {
    fn launch(&self, artifact: &Path) {
        let Some((program, args)) = self.command.split_first() else {
            tracing::error!("[Installer] no install command configured");
            return;
        };
        match std::process::Command::new(program)
            .args(args)
            .arg(artifact)
            .spawn()
        {
            Ok(child) => {
                tracing::info!(
                    "[Installer] launched {} (pid {}) for {:?}",
                    program,
                    child.id(),
                    artifact
                );
            }
            Err(e) => {
                tracing::error!("[Installer] failed to launch {}: {}", program, e);
            }
        }
    }
}

/// 권한 프롬프트 — 원샷, 허용 여부를 돌려준다
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn request(&self) -> bool;
}

/// 표준 입력으로 확인을 받는 프롬프트
pub struct ConsolePermissionPrompt;

#[async_trait]
impl PermissionPrompt for ConsolePermissionPrompt {
    async fn request(&self) -> bool {
        let answer = tokio::task::spawn_blocking(|| {
            print!("Allow installing packages from this source? [y/N] ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(_) => line,
                Err(_) => String::new(),
            }
        })
        .await
        .unwrap_or_default();

        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// 자기 비활성화 — 설치기의 실행 진입점을 끈다. 멱등.
pub trait SelfDisabler: Send + Sync {
    fn disable(&self, component_id: &str);
}

/// 마커 파일 기반 비활성화
pub struct FsSelfDisabler {
    state_dir: PathBuf,
}

impl FsSelfDisabler {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn marker_path(&self, component_id: &str) -> PathBuf {
        self.state_dir.join(format!("{}.disabled", component_id))
    }

    /// 이미 비활성화되었는지 (부팅 시 실행 여부 판단용)
    pub fn is_disabled(&self, component_id: &str) -> bool {
        self.marker_path(component_id).exists()
    }
}

impl SelfDisabler for FsSelfDisabler {
    fn disable(&self, component_id: &str) {
        let marker = self.marker_path(component_id);
        if marker.exists() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.state_dir) {
            tracing::warn!("[Disabler] failed to create state dir: {}", e);
            return;
        }
        if let Err(e) = std::fs::write(&marker, b"") {
            tracing::warn!("[Disabler] failed to write marker {:?}: {}", marker, e);
        } else {
            tracing::info!("[Disabler] component '{}' disabled", component_id);
        }
    }
}
