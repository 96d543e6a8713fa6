//! 値オブジェクト定義
//!
//! ユーザー ID・会話 ID は接続 URL やペイロードから渡される不透明な識別子です。
//! 生成時にバリデーションを行い、ドメイン層の内側では常に正しい値であることを保証します。

use thiserror::Error;

/// 識別子の最大長（文字数）
const MAX_ID_LENGTH: usize = 256;

/// 値オブジェクトのバリデーションエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be at most {1} characters")]
    TooLong(&'static str, usize),
}

fn validate_id(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if value.chars().count() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong(field, MAX_ID_LENGTH));
    }
    Ok(())
}

/// ユーザー ID
///
/// 認証は外部で解決済みのため、ここでは形式のみ検証する不透明な識別子。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// 新しい UserId を作成（バリデーション付き）
    pub fn new(value: String) -> Result<Self, ValidationError> {
        validate_id(&value, "user_id")?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 会話 ID
///
/// 会話（メッセージの論理チャンネル）は外部ストアで管理され、ここでは識別子のみ扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    /// 新しい ConversationId を作成（バリデーション付き）
    pub fn new(value: String) -> Result<Self, ValidationError> {
        validate_id(&value, "conversation_id")?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// タイムスタンプ（Unix ミリ秒、UTC）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}
