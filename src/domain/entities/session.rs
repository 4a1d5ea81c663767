use crate::domain::value_objects::DeviceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// アクセス／リフレッシュトークンと絶対有効期限（エポックミリ秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl TokenData {
    pub fn from_expires_in(
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
        now_millis: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now_millis + (expires_in_secs as i64) * 1000,
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    /// 有効期限まで `buffer_millis` 未満なら true
    pub fn expires_within(&self, now_millis: i64, buffer_millis: i64) -> bool {
        self.expires_at - now_millis <= buffer_millis
    }
}

/// 永続ストアに保存される認証状態。トークンはこの中に入る
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateBlob {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub tokens: Option<TokenData>,
    #[serde(default)]
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user: UserProfile,
    pub expires_at: i64,
    pub last_activity: i64,
    pub device_id: DeviceId,
    pub remember_me: bool,
}

impl SessionData {
    pub fn new(user: UserProfile, remember_me: bool, timeout_millis: i64, now_millis: i64) -> Self {
        Self {
            user,
            expires_at: now_millis + timeout_millis,
            last_activity: now_millis,
            device_id: DeviceId::generate(),
            remember_me,
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    /// 在席判定用。有効期限とは無関係
    pub fn is_active(&self, now_millis: i64, idle_window_millis: i64) -> bool {
        now_millis - self.last_activity < idle_window_millis
    }

    /// 操作を記録する。remember-me でなければ有効期限を延長する
    pub fn touch(&mut self, now_millis: i64, timeout_millis: i64) {
        self.last_activity = now_millis;
        if !self.remember_me {
            self.expires_at = now_millis + timeout_millis;
        }
    }

    pub fn remaining_millis(&self, now_millis: i64) -> i64 {
        (self.expires_at - now_millis).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Unauthenticated,
    Authenticated,
    Refreshing,
    Expired,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated | AuthStatus::Refreshing)
    }
}

/// セッション延長の対象となる操作イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::PointerDown,
        ActivityKind::KeyDown,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
    ];

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "pointerdown" | "mousedown" => Some(ActivityKind::PointerDown),
            "keydown" => Some(ActivityKind::KeyDown),
            "scroll" => Some(ActivityKind::Scroll),
            "touchstart" => Some(ActivityKind::TouchStart),
            _ => None,
        }
    }
}
