/// 永続ストアに保存する認証状態ブロブのキー
pub const AUTH_STORAGE_KEY: &str = "auth-storage";
/// セッション情報のキー（remember-me の有無で保存先が変わる）
pub const SESSION_DATA_KEY: &str = "session-data";
pub const USER_PREFERENCES_KEY: &str = "user-preferences";
pub const NOTIFICATIONS_KEY: &str = "notifications";
pub const GUEST_SESSION_KEY: &str = "guest-session";
pub const SAVED_JOBS_KEY: &str = "saved-jobs";

/// GET 以外でも重複排除を強制するヘッダー
pub const DEDUPE_HEADER: &str = "X-Dedupe";
/// GET でも重複排除を無効にするヘッダー
pub const NO_DEDUPE_HEADER: &str = "X-No-Dedupe";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

pub const JOBS_PATH: &str = "/jobs";
pub const SAVED_JOBS_PATH: &str = "/jobs/saved";
/// 楽観的更新で使うエンティティ種別
pub const JOB_ENTITY_TYPE: &str = "job";
