//! 설치 수명주기 상태 머신
//!
//! 상태는 이 모듈의 전이 테이블을 통해서만 바뀐다. 테이블에 없는 전이를
//! 요구하는 신호는 호출측에서 무시하는 것이 계약이며, 그것이 중복/지연된
//! 플랫폼 신호에 대한 안전장치다. `Disabled`는 종단 상태로, 전이 테이블이
//! 아니라 전용 경로(`disable`)로만 진입한다.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 설치 오케스트레이터의 수명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    /// 대기 — 사용자 요청을 받을 수 있는 유일한 상태
    Idle,
    /// 권한 프롬프트 결과 대기
    AwaitingPermission,
    /// 네트워크 도달성 프로브 결과 대기
    ProbingNetwork,
    /// 다운로드 진행 중 (핸들 하나가 유효)
    Downloading,
    /// 플랫폼 설치기로 넘긴 뒤 설치 완료 대기
    AwaitingInstallLaunch,
    /// 종단 — 대상이 설치되어 자기 비활성화 완료
    Disabled,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(OrchestratorState, OrchestratorState),
}

pub struct StateMachine {
    state: OrchestratorState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Idle,
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Disabled에 도달했는지 — 이후 어떤 신호도 상태를 바꾸지 않는다
    pub fn is_terminal(&self) -> bool {
        self.state == OrchestratorState::Disabled
    }

    pub fn can_transition(&self, to: OrchestratorState) -> bool {
        use OrchestratorState::*;
        matches!(
            (self.state, to),
            (Idle, AwaitingPermission)
                | (Idle, ProbingNetwork)
                | (Idle, Downloading)
                | (AwaitingPermission, ProbingNetwork)
                | (AwaitingPermission, Downloading)
                | (AwaitingPermission, Idle)
                | (ProbingNetwork, Downloading)
                | (ProbingNetwork, Idle)
                | (Downloading, AwaitingInstallLaunch)
                | (Downloading, Idle)
                | (AwaitingInstallLaunch, Idle)
        )
    }

    pub fn transition(&mut self, to: OrchestratorState) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::info!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }

    /// 어느 상태에서든 Disabled로 진입. 이미 Disabled면 no-op.
    /// 이전 상태를 반환한다.
    pub fn disable(&mut self) -> OrchestratorState {
        let from = self.state;
        if from != OrchestratorState::Disabled {
            tracing::info!("State transition: {:?} -> Disabled", from);
            self.state = OrchestratorState::Disabled;
        }
        from
    }
}
