//! ═══════════════════════════════════════════════════════════════════
//! 설치기 통합 테스트
//! ═══════════════════════════════════════════════════════════════════
//!
//! 실제 HTTP 경로를 사용해 전체 설치 파이프라인을 테스트합니다:
//!
//! 1. **도달성 프로브** — 로컬 모킹 스토어 서버에 대해 2xx/404/연결 거부
//! 2. **HTTP 다운로드** — 스트리밍 전송, 완료 신호, 실패 보고
//! 3. **URL 해석** — 절대 루트 오버라이드로 모킹 서버를 가리키는 경로
//! 4. **전체 플로우** — 실 프로브/다운로드 + 가짜 플랫폼 협력자
//!
//! 모든 테스트는 `tempfile`로 파일시스템을 격리합니다.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tempfile::TempDir;

use omnistore_installer::config::{InstallerConfig, MapSettings, SETTING_ROOT_URI};
use omnistore_installer::{
    Collaborators, DownloadOutcome, DownloadRequest, DownloadService, HttpDownloadService,
    HttpReachabilityProbe, InstallLauncher, InstallOrchestrator, InstallTarget, InstallerEvent,
    OrchestratorState, PermissionPrompt, PresenceChecker, ReachabilityProbe, SelfDisabler, Signal,
};

const APK_BYTES: &[u8] = b"not-really-an-apk-but-close-enough";

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

/// 로컬 모킹 스토어 서버 시작.
/// `/store/OmniStore.apk`만 제공한다 — 그 외 경로는 404.
async fn start_mock_store() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        "/store/OmniStore.apk",
        get(|| async { APK_BYTES.to_vec() }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

/// 연결이 거부되는 주소 확보 — 리스너를 바인드했다가 바로 닫는다
async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// 모킹 서버를 가리키는 설정/대상 생성 —
/// 절대 URL 루트 오버라이드가 베이스를 무시하는 실제 해석 경로를 그대로 탄다
fn target_for(addr: SocketAddr, download_dir: &Path) -> (InstallerConfig, InstallTarget) {
    let config = InstallerConfig {
        assume_install_permitted: true,
        download_dir: Some(download_dir.to_string_lossy().to_string()),
        ..Default::default()
    };
    let settings =
        MapSettings::new().set(SETTING_ROOT_URI, &format!("http://{}/store/", addr));
    let target = InstallTarget::resolve(&config, &settings);
    (config, target)
}

// ═══════════════════════════════════════════════════════
// 가짜 플랫폼 협력자 (프로브/다운로드는 실물)
// ═══════════════════════════════════════════════════════

#[derive(Default)]
struct FakePresence {
    installed: AtomicBool,
}

impl PresenceChecker for FakePresence {
    fn is_installed(&self, _package_id: &str) -> bool {
        self.installed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingLauncher {
    calls: AtomicUsize,
    last_artifact: Mutex<Option<std::path::PathBuf>>,
}

impl InstallLauncher for RecordingLauncher {
    fn launch(&self, artifact: &Path) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_artifact.lock().unwrap() = Some(artifact.to_path_buf());
    }
}

struct GrantingPrompt;

#[async_trait]
impl PermissionPrompt for GrantingPrompt {
    async fn request(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingDisabler {
    calls: AtomicUsize,
}

impl SelfDisabler for RecordingDisabler {
    fn disable(&self, _component_id: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn collaborators(
    presence: Arc<FakePresence>,
    launcher: Arc<RecordingLauncher>,
    disabler: Arc<RecordingDisabler>,
) -> Collaborators {
    Collaborators {
        presence,
        probe: Arc::new(HttpReachabilityProbe::new(
            Duration::from_secs(5),
            Duration::from_secs(5),
        )),
        downloads: Arc::new(HttpDownloadService::new(Duration::from_secs(5))),
        installer: launcher,
        permissions: Arc::new(GrantingPrompt),
        disabler,
    }
}

/// 조건에 맞는 이벤트가 올 때까지 수신 (5초 타임아웃)
async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<InstallerEvent>,
    pred: impl Fn(&InstallerEvent) -> bool,
) -> InstallerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ═══════════════════════════════════════════════════════
// 테스트 1: 도달성 프로브
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn probe_reaches_mock_store() {
    let (addr, server) = start_mock_store().await;
    let probe = HttpReachabilityProbe::new(Duration::from_secs(5), Duration::from_secs(5));

    let url = format!("http://{}/store/OmniStore.apk", addr);
    assert!(probe.probe(&url).await);

    println!("✓ 프로브 도달 테스트 통과");
    server.abort();
}

#[tokio::test]
async fn probe_rejects_missing_artifact() {
    let (addr, server) = start_mock_store().await;
    let probe = HttpReachabilityProbe::new(Duration::from_secs(5), Duration::from_secs(5));

    // 404는 도달 불가로 취급된다
    let url = format!("http://{}/store/missing.apk", addr);
    assert!(!probe.probe(&url).await);

    server.abort();
}

#[tokio::test]
async fn probe_rejects_refused_connection() {
    let addr = dead_addr().await;
    let probe = HttpReachabilityProbe::new(Duration::from_secs(5), Duration::from_secs(5));

    let url = format!("http://{}/store/OmniStore.apk", addr);
    assert!(!probe.probe(&url).await);
}

// ═══════════════════════════════════════════════════════
// 테스트 2: HTTP 다운로드
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn download_streams_artifact_and_signals_completion() {
    let (addr, server) = start_mock_store().await;
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("OmniStore.apk");

    let service = HttpDownloadService::new(Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel::<Signal>(8);

    let handle = service
        .enqueue(
            DownloadRequest {
                url: format!("http://{}/store/OmniStore.apk", addr),
                destination: destination.clone(),
            },
            tx,
        )
        .await
        .unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    match signal {
        Signal::DownloadComplete {
            handle: completed,
            outcome: DownloadOutcome::Success { artifact },
        } => {
            assert_eq!(completed, handle);
            assert_eq!(artifact, destination);
            assert_eq!(std::fs::read(&destination).unwrap(), APK_BYTES);
        }
        other => panic!("unexpected signal: {:?}", other),
    }

    println!("✓ 다운로드 스트리밍 테스트 통과");
    server.abort();
}

#[tokio::test]
async fn download_reports_http_error_as_failure() {
    let (addr, server) = start_mock_store().await;
    let dir = TempDir::new().unwrap();

    let service = HttpDownloadService::new(Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel::<Signal>(8);

    let handle = service
        .enqueue(
            DownloadRequest {
                url: format!("http://{}/store/missing.apk", addr),
                destination: dir.path().join("missing.apk"),
            },
            tx,
        )
        .await
        .unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();

    match signal {
        Signal::DownloadComplete {
            handle: completed,
            outcome: DownloadOutcome::Failed { reason },
        } => {
            assert_eq!(completed, handle);
            assert!(reason.contains("404"), "reason: {}", reason);
        }
        other => panic!("unexpected signal: {:?}", other),
    }

    server.abort();
}

// ═══════════════════════════════════════════════════════
// 테스트 3: 전체 플로우
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn full_flow_downloads_and_launches_installer() {
    let (addr, server) = start_mock_store().await;
    let dir = TempDir::new().unwrap();
    let (config, target) = target_for(addr, dir.path());
    assert_eq!(
        target.download_url,
        format!("http://{}/store/OmniStore.apk", addr)
    );

    let presence = Arc::new(FakePresence::default());
    let launcher = Arc::new(RecordingLauncher::default());
    let disabler = Arc::new(RecordingDisabler::default());
    let collab = collaborators(presence.clone(), launcher.clone(), disabler.clone());

    let (orchestrator, signal_rx) = InstallOrchestrator::new(config, target, collab);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator.spawn(signal_rx);

    handle.request_install().await.unwrap();

    let launched = wait_for_event(&mut events, |e| {
        matches!(e, InstallerEvent::InstallLaunched { .. })
    })
    .await;

    let artifact = match launched {
        InstallerEvent::InstallLaunched { artifact } => artifact,
        other => panic!("unexpected event: {:?}", other),
    };
    assert_eq!(std::fs::read(&artifact).unwrap(), APK_BYTES);
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        launcher.last_artifact.lock().unwrap().as_deref(),
        Some(artifact.as_path())
    );

    let status = handle.status().await;
    assert_eq!(status.state, OrchestratorState::AwaitingInstallLaunch);

    // 패키지 추가 알림 → 자기 비활성화까지
    handle
        .notify_package_added("org.omnirom.omnistore")
        .await
        .unwrap();
    wait_for_event(&mut events, |e| matches!(e, InstallerEvent::Disabled)).await;
    assert_eq!(disabler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.status().await.state, OrchestratorState::Disabled);

    println!("✓ 전체 플로우 테스트 통과");
    server.abort();
}

#[tokio::test]
async fn full_flow_surfaces_network_error_when_store_unreachable() {
    let addr = dead_addr().await;
    let dir = TempDir::new().unwrap();
    let (config, target) = target_for(addr, dir.path());
    let expected_url = target.download_url.clone();

    let presence = Arc::new(FakePresence::default());
    let launcher = Arc::new(RecordingLauncher::default());
    let disabler = Arc::new(RecordingDisabler::default());
    let collab = collaborators(presence, launcher.clone(), disabler);

    let (orchestrator, signal_rx) = InstallOrchestrator::new(config, target, collab);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator.spawn(signal_rx);

    handle.request_install().await.unwrap();

    let event = wait_for_event(&mut events, |e| {
        matches!(e, InstallerEvent::NetworkError { .. })
    })
    .await;
    match event {
        InstallerEvent::NetworkError { url } => assert_eq!(url, expected_url),
        other => panic!("unexpected event: {:?}", other),
    }

    assert_eq!(handle.status().await.state, OrchestratorState::Idle);
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn full_flow_skips_when_target_already_installed() {
    let (addr, server) = start_mock_store().await;
    let dir = TempDir::new().unwrap();
    let (config, target) = target_for(addr, dir.path());

    let presence = Arc::new(FakePresence::default());
    presence.installed.store(true, Ordering::SeqCst);
    let launcher = Arc::new(RecordingLauncher::default());
    let disabler = Arc::new(RecordingDisabler::default());
    let collab = collaborators(presence, launcher.clone(), disabler.clone());

    let (orchestrator, signal_rx) = InstallOrchestrator::new(config, target, collab);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator.spawn(signal_rx);

    // 시작 시 설치 확인만으로 Disabled가 되어야 한다
    wait_for_event(&mut events, |e| matches!(e, InstallerEvent::Disabled)).await;
    assert_eq!(disabler.calls.load(Ordering::SeqCst), 1);

    // 이후 설치 요청은 전부 무시된다
    handle.request_install().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.status().await.state, OrchestratorState::Disabled);
    assert_eq!(launcher.calls.load(Ordering::SeqCst), 0);

    server.abort();
}
