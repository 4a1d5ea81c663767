/// 認証切れ時のサインイン画面への遷移先
pub trait SignInNavigator: Send + Sync {
    fn current_path(&self) -> Option<String>;
    fn redirect_to(&self, path: &str);
}
