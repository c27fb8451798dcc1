//! 채팅 세션
//!
//! 세션마다 화면용 대화 기록(transcript)과 채팅 엔진 메모리를 따로 가집니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::chat::ChatMemory;
use crate::resolver::{Resolution, ResponseResolver};

/// 첫 화면 안내 메시지
pub const WELCOME_MESSAGE: &str = "Ask me anything from your file! I am here to help you.";

/// 발화자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 대화 한 턴
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 세션 입력 에러
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Session not found: {0}")]
    NotFound(Uuid),
}

// ============================================================================
// Session
// ============================================================================

/// 대화 세션 하나
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    transcript: Vec<ChatTurn>,
    memory: ChatMemory,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// 안내 메시지 한 턴으로 시작
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transcript: vec![ChatTurn::assistant(WELCOME_MESSAGE)],
            memory: ChatMemory::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// 사용자 메시지 한 번 처리
    ///
    /// 답이 나온 뒤에 사용자/어시스턴트 두 턴을 함께 기록합니다.
    /// 실패하거나 도중에 future가 drop되면 기록은 호출 전과 같습니다.
    pub async fn interact(
        &mut self,
        resolver: &ResponseResolver,
        prompt: &str,
    ) -> Result<Resolution> {
        if prompt.trim().is_empty() {
            return Err(SessionError::EmptyMessage.into());
        }

        self.last_active = Utc::now();
        let resolution = resolver.resolve(&mut self.memory, prompt).await?;

        self.transcript.push(ChatTurn::user(prompt));
        self.transcript
            .push(ChatTurn::assistant(resolution.content()));
        Ok(resolution)
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active).to_std().unwrap_or_default()
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// 공유 세션 핸들
pub type SessionHandle = Arc<Mutex<Session>>;

/// 메모리 내 세션 저장소
///
/// 세션별 뮤텍스로 같은 세션의 턴은 순서대로, 다른 세션은 동시에 처리합니다.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 세션 생성
    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let session = Session::new();
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        tracing::debug!("Session created: {}", id);
        (id, handle)
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// id가 없으면 새로 만들고, 있는데 모르는 id면 에러
    pub async fn get_or_create(&self, id: Option<Uuid>) -> Result<(Uuid, SessionHandle)> {
        match id {
            Some(id) => self
                .get(id)
                .await
                .map(|handle| (id, handle))
                .ok_or_else(|| SessionError::NotFound(id).into()),
            None => Ok(self.create().await),
        }
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 오래 쉬고 있는 세션 정리
    ///
    /// 처리 중인(잠긴) 세션은 건너뜁니다. 제거한 개수를 반환합니다.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.idle_for(now) <= max_idle,
            Err(_) => true,
        });

        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("Pruned {} idle sessions", removed);
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
