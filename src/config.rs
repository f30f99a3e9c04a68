//! 설치기 설정 및 스토어 URL 해석
//!
//! `config/installer.toml`을 읽고, 시스템 설정 스토어(키/값 오버라이드)를
//! 거쳐 최종 다운로드 URL을 결정합니다. 설정된 루트가 이미 절대 네트워크
//! URL이면 그대로 사용하고, 아니면 베이스 URL에 이어붙입니다.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 기본 스토어 베이스 URL
pub const DEFAULT_BASE_URL: &str = "https://dl.omnirom.org/";
/// 기본 스토어 루트 경로 (베이스 기준 상대경로)
pub const DEFAULT_ROOT_URI: &str = "store/";
/// 기본 대상 패키지 식별자
pub const DEFAULT_PACKAGE_ID: &str = "org.omnirom.omnistore";
/// 기본 아티팩트 파일명
pub const DEFAULT_ARTIFACT_NAME: &str = "OmniStore.apk";

/// 설정 스토어 키: 베이스 URL 오버라이드
pub const SETTING_BASE_URL: &str = "store_base_url";
/// 설정 스토어 키: 루트 URI 오버라이드
pub const SETTING_ROOT_URI: &str = "store_root_uri";

/// 시스템 설정 스토어 — 키/값 오버라이드 조회
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// 환경변수 기반 설정 스토어 (`store_base_url` → `STORE_BASE_URL`)
pub struct EnvSettings;

impl SettingsStore for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key.to_ascii_uppercase())
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}

/// 고정 키/값 설정 스토어 (테스트 및 임베딩용)
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl SettingsStore for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// 설치기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// 대상 패키지 식별자
    pub package_id: String,
    /// 원격 아티팩트 파일명
    pub artifact_name: String,
    /// 스토어 베이스 URL (설정 스토어 오버라이드가 우선)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_base_url: Option<String>,
    /// 스토어 루트 URI (절대 URL이면 베이스를 무시하고 그대로 사용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_root_uri: Option<String>,
    /// 다운로드 전에 도달성 프로브를 수행할지 여부
    pub probe_before_download: bool,
    /// 패키지 추가 알림을 어느 상태에서나 수용할지 (false면 Idle에서만)
    pub package_added_any_state: bool,
    /// 외부 출처 설치/저장소 권한이 이미 허용된 것으로 간주할지
    pub assume_install_permitted: bool,
    /// 아티팩트 저장 디렉터리 (기본값: 캐시 디렉터리)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    /// 설치된 패키지 레지스트리 디렉터리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<String>,
    /// 비활성화 마커 등 상태 파일 디렉터리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
    /// 아티팩트를 넘길 플랫폼 설치기 커맨드
    pub install_command: Vec<String>,
    /// HTTP 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// HTTP 읽기 타임아웃 (초)
    pub read_timeout_secs: u64,
    /// 자기 비활성화에 쓰는 컴포넌트 식별자
    pub component_id: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            store_base_url: None,
            store_root_uri: None,
            probe_before_download: true,
            package_added_any_state: true,
            assume_install_permitted: false,
            download_dir: None,
            registry_dir: None,
            state_dir: None,
            install_command: vec!["xdg-open".to_string()],
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            component_id: "omnistore-installer".to_string(),
        }
    }
}

impl InstallerConfig {
    /// `config/installer.toml`에서 로드. 파일이 없으면 기본값 사용
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from("config/installer.toml")
    }

    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path).unwrap_or_default();
        let cfg: Self = toml::from_str(&s).unwrap_or_default();
        Ok(cfg)
    }

    /// 베이스 URL: 설정 스토어 → config → 기본값
    pub fn base_url(&self, settings: &dyn SettingsStore) -> String {
        settings
            .get(SETTING_BASE_URL)
            .or_else(|| self.store_base_url.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// 루트 URI: 설정 스토어 → config → 기본값
    pub fn root_uri(&self, settings: &dyn SettingsStore) -> String {
        settings
            .get(SETTING_ROOT_URI)
            .or_else(|| self.store_root_uri.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROOT_URI.to_string())
    }

    /// 스토어 루트 해석 — 절대 네트워크 URL 루트는 그대로,
    /// 상대 경로는 베이스 URL에 이어붙인다
    pub fn resolve_store_root(&self, settings: &dyn SettingsStore) -> String {
        let root = self.root_uri(settings);
        if is_network_url(&root) {
            root
        } else {
            join_url(&self.base_url(settings), &root)
        }
    }

    /// 최종 다운로드 URL: 해석된 루트 + 아티팩트 파일명
    pub fn resolve_download_url(&self, settings: &dyn SettingsStore) -> String {
        join_url(&self.resolve_store_root(settings), &self.artifact_name)
    }

    /// 아티팩트 저장 디렉터리: config 경로 또는 사용자 캐시 디렉터리
    pub fn resolve_download_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.download_dir {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .map(|appdata| {
                    PathBuf::from(appdata)
                        .join("omnistore-installer")
                        .join("downloads")
                })
                .unwrap_or_else(|_| PathBuf::from("./downloads"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("HOME")
                .map(|home| {
                    PathBuf::from(home)
                        .join(".cache")
                        .join("omnistore-installer")
                        .join("downloads")
                })
                .unwrap_or_else(|_| PathBuf::from("./downloads"))
        }
    }

    /// 설치된 패키지 레지스트리 디렉터리
    pub fn resolve_registry_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.registry_dir {
            return PathBuf::from(dir);
        }
        if let Ok(p) = std::env::var("STORE_PACKAGES_DIR") {
            if !p.is_empty() {
                return PathBuf::from(p);
            }
        }
        PathBuf::from("./packages")
    }

    /// 비활성화 마커 등 상태 파일 디렉터리
    pub fn resolve_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .map(|appdata| PathBuf::from(appdata).join("omnistore-installer"))
                .unwrap_or_else(|_| PathBuf::from("./state"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".omnistore-installer"))
                .unwrap_or_else(|_| PathBuf::from("./state"))
        }
    }
}

/// http:// 또는 https:// 로 시작하는 절대 네트워크 URL인지
pub fn is_network_url(s: &str) -> bool {
    let t = s.trim();
    t.starts_with("http://") || t.starts_with("https://")
}

/// 슬래시 하나로 두 URL 조각을 잇는다
fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
