//! 설치 오케스트레이터 — 비동기 신호를 단일 수명주기로 직렬화하는 액터
//!
//! ## 아키텍처
//! - `InstallOrchestrator`: 독립적인 tokio 태스크로 실행, 상태를 단독 소유
//! - 모든 외부 신호(사용자 액션, 권한 결과, 도달성 결과, 다운로드 완료,
//!   패키지 추가 알림, 연결 상태 변화)는 mpsc 채널 하나로 들어와
//!   도착 순서대로 처리된다
//! - 프로브/프롬프트/전송은 별도 태스크에서 실행되고 결과를 신호로 되돌린다
//! - UI/CLI는 broadcast 채널 구독으로 상태 변화를 수신
//!
//! ## 경합 규칙
//! - 핸들이 일치하지 않는 다운로드 완료 신호는 어떤 경우에도 무시
//! - 현재 상태에서 처리할 수 없는 신호(스테일)는 조용히 버린다
//! - `Disabled` 진입 후에는 어떤 신호도 상태를 바꾸지 않는다

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::config::InstallerConfig;
use crate::download::{DownloadHandle, DownloadOutcome, DownloadRequest, DownloadService};
use crate::platform::{InstallLauncher, PermissionPrompt, PresenceChecker, SelfDisabler};
use crate::probe::ReachabilityProbe;
use crate::state::{OrchestratorState, StateMachine};
use crate::{CapabilityFlags, InstallTarget, InstallerStatus};

/// 오케스트레이터로 들어오는 외부 신호
#[derive(Debug, Clone)]
pub enum Signal {
    /// 사용자가 설치를 요청 (Idle에서만 유효)
    RequestInstall,
    /// 권한 프롬프트 결과
    PermissionResult { granted: bool },
    /// 도달성 프로브 결과
    ReachabilityResult { reachable: bool },
    /// 다운로드 완료 (무관한 다운로드의 신호일 수 있음)
    DownloadComplete {
        handle: DownloadHandle,
        outcome: DownloadOutcome,
    },
    /// 기기에 패키지가 추가됨 (대상 여부는 오케스트레이터가 판단)
    PackageAdded { package_id: String },
    /// 연결 상태 변화 — 능력 플래그만 갱신, 전이 없음
    ConnectivityChanged { reachable: bool },
    /// 설치 여부 재확인 (포그라운드 복귀 경계에서 호출)
    RefreshPresence,
    /// 액터 종료
    Shutdown,
}

/// 구독자(UI/CLI)에 브로드캐스트되는 이벤트
#[derive(Debug, Clone)]
pub enum InstallerEvent {
    /// 상태 전이
    StateChanged {
        from: OrchestratorState,
        to: OrchestratorState,
    },
    /// 권한 프롬프트 요청됨
    PermissionRequested,
    /// 도달성 프로브 시작
    ProbeStarted { url: String },
    /// 다운로드 시작
    DownloadStarted { handle: DownloadHandle, url: String },
    /// 네트워크 오류 — 진단 표시용 URL 포함
    NetworkError { url: String },
    /// 플랫폼 설치기 실행됨
    InstallLaunched { artifact: PathBuf },
    /// 대상 설치 확인, 자기 비활성화 완료 (종단)
    Disabled,
}

/// 협력자 묶음 — 플랫폼 서비스는 전부 이 트레이트 뒤에 있다
pub struct Collaborators {
    pub presence: Arc<dyn PresenceChecker>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub downloads: Arc<dyn DownloadService>,
    pub installer: Arc<dyn InstallLauncher>,
    pub permissions: Arc<dyn PermissionPrompt>,
    pub disabler: Arc<dyn SelfDisabler>,
}

/// 설치 오케스트레이터
pub struct InstallOrchestrator {
    target: InstallTarget,
    config: InstallerConfig,
    machine: StateMachine,
    caps: CapabilityFlags,
    /// 유효한 다운로드 핸들 슬롯 — Downloading 진입 시 기록,
    /// Downloading/AwaitingInstallLaunch를 떠나는 전이에서만 비운다
    pending_download: Option<DownloadHandle>,
    download_dir: PathBuf,
    collab: Collaborators,
    /// 백그라운드 태스크가 결과를 되돌려 보내는 송신자
    signal_tx: mpsc::Sender<Signal>,
    event_tx: broadcast::Sender<InstallerEvent>,
    status: Arc<RwLock<InstallerStatus>>,
}

impl InstallOrchestrator {
    /// 오케스트레이터와 신호 수신자를 만든다.
    /// 수신자는 `spawn`에 넘기거나 테스트에서 직접 소비한다.
    pub fn new(
        config: InstallerConfig,
        target: InstallTarget,
        collab: Collaborators,
    ) -> (Self, mpsc::Receiver<Signal>) {
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>(32);
        let (event_tx, _) = broadcast::channel::<InstallerEvent>(64);

        let caps = CapabilityFlags {
            network_reachable: false,
            install_permitted: config.assume_install_permitted,
            storage_granted: config.assume_install_permitted,
        };
        let download_dir = config.resolve_download_dir();
        let status = Arc::new(RwLock::new(InstallerStatus::new(&target)));

        let orchestrator = Self {
            target,
            config,
            machine: StateMachine::new(),
            caps,
            pending_download: None,
            download_dir,
            collab,
            signal_tx,
            event_tx,
            status,
        };

        (orchestrator, signal_rx)
    }

    /// 액터 태스크를 시작하고 핸들을 돌려준다.
    /// 루프 진입 전에 설치 여부를 한 번 확인한다 — 이미 설치되어 있으면
    /// 곧바로 Disabled로 시작한다.
    pub fn spawn(mut self, mut signal_rx: mpsc::Receiver<Signal>) -> OrchestratorHandle {
        let handle = OrchestratorHandle {
            signals: self.signal_tx.clone(),
            events: self.event_tx.clone(),
            status: self.status.clone(),
        };

        tokio::spawn(async move {
            tracing::info!(
                "[Orchestrator] started for {} ({})",
                self.target.package_id,
                self.target.download_url
            );
            self.handle_signal(Signal::RefreshPresence).await;

            while let Some(signal) = signal_rx.recv().await {
                if matches!(signal, Signal::Shutdown) {
                    tracing::info!("[Orchestrator] shutdown requested");
                    break;
                }
                self.handle_signal(signal).await;
            }

            tracing::info!("[Orchestrator] stopped");
        });

        handle
    }

    /// 현재 상태
    pub fn state(&self) -> OrchestratorState {
        self.machine.state()
    }

    /// 이벤트 구독 (spawn 전에 구독하면 초기 이벤트도 놓치지 않는다)
    pub fn subscribe(&self) -> broadcast::Receiver<InstallerEvent> {
        self.event_tx.subscribe()
    }

    /// 신호 하나를 처리한다. 호출은 반드시 직렬이어야 한다 —
    /// 액터 루프가 보장하며, 테스트는 순서를 직접 제어한다.
    pub async fn handle_signal(&mut self, signal: Signal) {
        if self.machine.is_terminal() {
            // Disabled 이후에는 어떤 신호도 상태를 바꾸지 않는다
            tracing::debug!("[Orchestrator] signal ignored in Disabled: {:?}", signal);
            return;
        }

        match signal {
            Signal::RequestInstall => self.on_request_install().await,
            Signal::PermissionResult { granted } => self.on_permission_result(granted).await,
            Signal::ReachabilityResult { reachable } => {
                self.on_reachability_result(reachable).await
            }
            Signal::DownloadComplete { handle, outcome } => {
                self.on_download_complete(handle, outcome).await
            }
            Signal::PackageAdded { package_id } => self.on_package_added(&package_id).await,
            Signal::ConnectivityChanged { reachable } => {
                self.caps.network_reachable = reachable;
            }
            Signal::RefreshPresence => self.on_refresh_presence().await,
            Signal::Shutdown => {}
        }
    }

    // ─── 신호별 처리 ────────────────────────────────────────────────────────

    async fn on_request_install(&mut self) {
        if self.machine.state() != OrchestratorState::Idle {
            // 더블 클릭 방어: Idle 외에는 무시
            tracing::debug!(
                "[Orchestrator] install request ignored in {:?}",
                self.machine.state()
            );
            return;
        }

        if !self.caps.install_allowed() {
            self.transition(OrchestratorState::AwaitingPermission).await;
            self.emit(InstallerEvent::PermissionRequested);

            let permissions = self.collab.permissions.clone();
            let signals = self.signal_tx.clone();
            tokio::spawn(async move {
                let granted = permissions.request().await;
                let _ = signals.send(Signal::PermissionResult { granted }).await;
            });
            return;
        }

        self.begin_acquisition().await;
    }

    async fn on_permission_result(&mut self, granted: bool) {
        if self.machine.state() != OrchestratorState::AwaitingPermission {
            tracing::debug!("[Orchestrator] stale permission result ignored");
            return;
        }

        if granted {
            self.caps.install_permitted = true;
            self.caps.storage_granted = true;
            self.begin_acquisition().await;
        } else {
            // 정책: 조용히 Idle로 복귀, 자동 재시도 없음
            tracing::info!("[Orchestrator] install permission denied");
            self.transition(OrchestratorState::Idle).await;
        }
    }

    async fn on_reachability_result(&mut self, reachable: bool) {
        if self.machine.state() != OrchestratorState::ProbingNetwork {
            tracing::debug!("[Orchestrator] stale reachability result ignored");
            return;
        }

        self.caps.network_reachable = reachable;
        if reachable {
            self.start_download().await;
        } else {
            let url = self.target.download_url.clone();
            tracing::warn!("[Orchestrator] store not reachable: {}", url);
            self.transition(OrchestratorState::Idle).await;
            self.emit(InstallerEvent::NetworkError { url });
        }
    }

    async fn on_download_complete(&mut self, handle: DownloadHandle, outcome: DownloadOutcome) {
        if self.machine.state() != OrchestratorState::Downloading {
            tracing::debug!("[Orchestrator] download completion ignored, not downloading");
            return;
        }
        if self.pending_download != Some(handle) {
            // 무관한 다운로드의 완료 신호 — 핸들 불일치는 항상 무시
            tracing::debug!("[Orchestrator] completion for unknown handle {}", handle);
            return;
        }

        self.pending_download = None;

        match outcome {
            DownloadOutcome::Success { artifact } => {
                self.transition(OrchestratorState::AwaitingInstallLaunch)
                    .await;
                self.collab.installer.launch(&artifact);
                self.emit(InstallerEvent::InstallLaunched { artifact });
            }
            DownloadOutcome::Failed { reason } => {
                // 실패는 조용히 Idle로 복귀 — 사용자 취소와 구분하지 않는다
                tracing::info!("[Orchestrator] download failed: {}", reason);
                self.transition(OrchestratorState::Idle).await;
            }
            DownloadOutcome::Cancelled => {
                tracing::info!("[Orchestrator] download cancelled");
                self.transition(OrchestratorState::Idle).await;
            }
        }
    }

    async fn on_package_added(&mut self, package_id: &str) {
        if package_id != self.target.package_id {
            return;
        }
        if !self.config.package_added_any_state
            && self.machine.state() != OrchestratorState::Idle
        {
            tracing::debug!(
                "[Orchestrator] package-added ignored in {:?} (idle-only policy)",
                self.machine.state()
            );
            return;
        }

        tracing::info!("[Orchestrator] target package {} installed", package_id);
        self.disable().await;
    }

    async fn on_refresh_presence(&mut self) {
        let installed = self.collab.presence.is_installed(&self.target.package_id);
        {
            let mut st = self.status.write().await;
            st.last_presence_check = Some(chrono::Utc::now().to_rfc3339());
            st.target_installed = installed;
        }

        if installed {
            tracing::info!(
                "[Orchestrator] target {} already installed",
                self.target.package_id
            );
            self.disable().await;
        } else if self.machine.state() == OrchestratorState::AwaitingInstallLaunch {
            // 설치기 세션이 결과 없이 끝났다 — 다시 요청할 수 있게 되돌린다
            tracing::info!("[Orchestrator] install launch abandoned, back to idle");
            self.transition(OrchestratorState::Idle).await;
        }
    }

    // ─── 진행 단계 ────────────────────────────────────────────────────────

    /// 권한 확보 이후의 공통 경로: 프로브를 쓰면 ProbingNetwork로,
    /// 아니면 바로 다운로드로
    async fn begin_acquisition(&mut self) {
        if self.config.probe_before_download {
            self.transition(OrchestratorState::ProbingNetwork).await;
            let url = self.target.download_url.clone();
            self.emit(InstallerEvent::ProbeStarted { url: url.clone() });

            let probe = self.collab.probe.clone();
            let signals = self.signal_tx.clone();
            tokio::spawn(async move {
                let reachable = probe.probe(&url).await;
                let _ = signals.send(Signal::ReachabilityResult { reachable }).await;
            });
        } else {
            self.start_download().await;
        }
    }

    async fn start_download(&mut self) {
        let request = DownloadRequest {
            url: self.target.download_url.clone(),
            destination: self.download_dir.join(&self.target.artifact_name),
        };

        match self
            .collab
            .downloads
            .enqueue(request, self.signal_tx.clone())
            .await
        {
            Ok(handle) => {
                self.transition(OrchestratorState::Downloading).await;
                self.pending_download = Some(handle);
                self.sync_status().await;
                self.emit(InstallerEvent::DownloadStarted {
                    handle,
                    url: self.target.download_url.clone(),
                });
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] download enqueue failed: {}", e);
                if self.machine.state() != OrchestratorState::Idle {
                    self.transition(OrchestratorState::Idle).await;
                }
            }
        }
    }

    /// 어느 상태에서든 Disabled로 — 자기 비활성화를 실행하고 종단에 들어간다
    async fn disable(&mut self) {
        let from = self.machine.disable();
        self.pending_download = None;
        {
            let mut st = self.status.write().await;
            st.state = OrchestratorState::Disabled;
            st.target_installed = true;
            st.download_in_flight = false;
        }
        self.emit(InstallerEvent::StateChanged {
            from,
            to: OrchestratorState::Disabled,
        });

        self.collab.disabler.disable(&self.config.component_id);
        self.emit(InstallerEvent::Disabled);
    }

    // ─── 내부 유틸리티 ────────────────────────────────────────────────────────

    async fn transition(&mut self, to: OrchestratorState) {
        let from = self.machine.state();
        match self.machine.transition(to) {
            Ok(()) => {
                self.sync_status().await;
                self.emit(InstallerEvent::StateChanged { from, to });
            }
            Err(e) => {
                tracing::warn!("[Orchestrator] {}", e);
            }
        }
    }

    async fn sync_status(&self) {
        let mut st = self.status.write().await;
        st.state = self.machine.state();
        st.download_in_flight = self.pending_download.is_some();
    }

    fn emit(&self, event: InstallerEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// 실행 중인 오케스트레이터에 신호를 보내고 상태를 구독하는 핸들
#[derive(Clone)]
pub struct OrchestratorHandle {
    signals: mpsc::Sender<Signal>,
    events: broadcast::Sender<InstallerEvent>,
    status: Arc<RwLock<InstallerStatus>>,
}

impl OrchestratorHandle {
    /// 신호 제출
    pub async fn send(&self, signal: Signal) -> Result<(), String> {
        self.signals
            .send(signal)
            .await
            .map_err(|e| format!("Failed to submit signal: {}", e))
    }

    /// 설치 요청 (사용자 액션)
    pub async fn request_install(&self) -> Result<(), String> {
        self.send(Signal::RequestInstall).await
    }

    /// 설치 여부 재확인 요청
    pub async fn refresh_presence(&self) -> Result<(), String> {
        self.send(Signal::RefreshPresence).await
    }

    /// 패키지 추가 알림 전달
    pub async fn notify_package_added(&self, package_id: &str) -> Result<(), String> {
        self.send(Signal::PackageAdded {
            package_id: package_id.to_string(),
        })
        .await
    }

    /// 연결 상태 변화 전달
    pub async fn notify_connectivity(&self, reachable: bool) -> Result<(), String> {
        self.send(Signal::ConnectivityChanged { reachable }).await
    }

    /// 액터 종료
    pub async fn shutdown(&self) -> Result<(), String> {
        self.send(Signal::Shutdown).await
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<InstallerEvent> {
        self.events.subscribe()
    }

    /// 현재 상태 스냅샷
    pub async fn status(&self) -> InstallerStatus {
        self.status.read().await.clone()
    }
}
