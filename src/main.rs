//! 설치기 CLI 드라이버
//!
//! 오케스트레이터를 띄우고 설치 요청을 보낸 뒤, 이벤트를 구독하며
//! 주기적으로 설치 여부를 재확인합니다. `--boot` 모드는 부팅 수신기처럼
//! 동작합니다 — 대상이 이미 있거나 컴포넌트가 비활성화되어 있으면
//! 조용히 종료합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use omnistore_installer::{
    Collaborators, CommandInstallLauncher, ConsolePermissionPrompt, EnvSettings,
    FsPresenceChecker, FsSelfDisabler, HttpDownloadService, HttpReachabilityProbe,
    InstallOrchestrator, InstallTarget, InstallerConfig, InstallerError, InstallerEvent,
    OrchestratorState, PresenceChecker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let boot_mode = args.iter().any(|a| a == "--boot");
    let auto_grant = args.iter().any(|a| a == "--yes");
    let json_status = args.iter().any(|a| a == "--json");

    let mut config = InstallerConfig::load()?;
    if auto_grant {
        config.assume_install_permitted = true;
    }

    let target = InstallTarget::resolve(&config, &EnvSettings);
    tracing::info!(
        "Store installer starting for {} ({})",
        target.package_id,
        target.download_url
    );

    let presence = Arc::new(FsPresenceChecker::new(config.resolve_registry_dir()));
    let disabler = Arc::new(FsSelfDisabler::new(config.resolve_state_dir()));

    if disabler.is_disabled(&config.component_id) {
        tracing::info!("Installer component is disabled, exiting");
        return Ok(());
    }
    if boot_mode && presence.is_installed(&target.package_id) {
        // 부팅 시에는 대상이 이미 있으면 조용히 종료
        return Ok(());
    }

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let read_timeout = Duration::from_secs(config.read_timeout_secs);

    let collab = Collaborators {
        presence,
        probe: Arc::new(HttpReachabilityProbe::new(connect_timeout, read_timeout)),
        downloads: Arc::new(HttpDownloadService::new(connect_timeout)),
        installer: Arc::new(CommandInstallLauncher::new(config.install_command.clone())),
        permissions: Arc::new(ConsolePermissionPrompt),
        disabler,
    };

    let (orchestrator, signal_rx) = InstallOrchestrator::new(config, target, collab);
    let mut events = orchestrator.subscribe();
    let handle = orchestrator.spawn(signal_rx);

    handle
        .request_install()
        .await
        .map_err(anyhow::Error::msg)?;

    // 이벤트를 따라가며 주기적으로 설치 여부를 재확인한다
    let mut poll = tokio::time::interval(Duration::from_secs(5));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let exit_code = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(InstallerEvent::NetworkError { url }) => {
                    let err = InstallerError::NetworkUnreachable { url };
                    eprintln!("{}", err.user_message());
                    break 1;
                }
                Ok(InstallerEvent::InstallLaunched { artifact }) => {
                    tracing::info!("Installer launched for {:?}, waiting for package", artifact);
                }
                Ok(InstallerEvent::Disabled) => {
                    println!("Store package installed, installer disabled");
                    break 0;
                }
                Ok(InstallerEvent::StateChanged { from, to }) => {
                    tracing::debug!("State: {:?} -> {:?}", from, to);
                    // 에러를 내지 않는 복귀 경로들: 권한 거부, 다운로드 실패
                    match from {
                        OrchestratorState::AwaitingPermission
                            if to == OrchestratorState::Idle =>
                        {
                            eprintln!("Install permission denied");
                            break 1;
                        }
                        OrchestratorState::Downloading if to == OrchestratorState::Idle => {
                            eprintln!("Download failed or was cancelled");
                            break 1;
                        }
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream lagged, skipped {}", skipped);
                }
                Err(RecvError::Closed) => break 1,
            },
            _ = poll.tick() => {
                if handle.status().await.state == OrchestratorState::Disabled {
                    break 0;
                }
                let _ = handle.refresh_presence().await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                let _ = handle.shutdown().await;
                break 1;
            }
        }
    };

    if json_status {
        let status = handle.status().await;
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    std::process::exit(exit_code);
}
