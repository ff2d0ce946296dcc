//! Compliance Types
//!
//! 個人データ保護・同意管理に関連する型定義。
//! ストレージ上では列挙型を文字列で保持するため、読み出し時に必ず
//! `FromStr` で検証してから下流に渡す。

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::crypto::{EncryptedField, HashedIdentifier};
use crate::error::{Error, Result};

/// 文字列表現を持つ閉じた列挙型を定義する
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// 全バリアント
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// ストレージ用の文字列表現
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "unknown {} value: {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// データカテゴリ
    pub enum DataCategory {
        /// 個人識別情報（氏名・ID番号）
        PersonalIdentifier => "personal_identifier",
        /// 連絡先情報
        ContactInfo => "contact_info",
        /// 財務情報
        FinancialData => "financial_data",
        /// 通信データ
        CommunicationData => "communication_data",
        /// サービス利用データ
        ServiceData => "service_data",
    }
}

string_enum! {
    /// 処理目的
    pub enum ProcessingPurpose {
        /// サービス提供
        ServiceProvision => "service_provision",
        /// 請求・支払い
        BillingPayment => "billing_payment",
        /// カスタマーサポート
        CustomerSupport => "customer_support",
        /// 法令遵守
        LegalCompliance => "legal_compliance",
        /// マーケティング
        Marketing => "marketing",
    }
}

string_enum! {
    /// 法的根拠
    pub enum LegalBasis {
        /// 同意
        Consent => "consent",
        /// 契約履行
        Contract => "contract",
        /// 法的義務
        LegalObligation => "legal_obligation",
        /// 重要な利益
        VitalInterests => "vital_interests",
        /// 正当な利益
        LegitimateInterests => "legitimate_interests",
    }
}

string_enum! {
    /// アクセス種別
    pub enum AccessAction {
        Create => "create",
        Read => "read",
        Update => "update",
        Delete => "delete",
        Export => "export",
    }
}

string_enum! {
    /// 通信チャネル
    pub enum Channel {
        Sms => "sms",
        ChatMessage => "chat_message",
        Email => "email",
    }
}

string_enum! {
    /// 通信方向
    pub enum Direction {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}

string_enum! {
    /// 請求ステータス
    pub enum BillStatus {
        Pending => "pending",
        Overdue => "overdue",
        Paid => "paid",
        Cancelled => "cancelled",
    }
}

impl BillStatus {
    /// 未払い（消去をブロックする）状態か
    pub fn is_outstanding(&self) -> bool {
        matches!(self, BillStatus::Pending | BillStatus::Overdue)
    }
}

/// リクエスト元の情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// IPアドレス
    pub ip_address: Option<String>,
    /// ユーザーエージェント
    pub user_agent: Option<String>,
    /// 操作した管理者のID
    pub acting_admin: Option<String>,
}

impl RequestContext {
    /// リクエスト情報を設定
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip.into()),
            user_agent: Some(user_agent.into()),
            acting_admin: None,
        }
    }

    /// 管理者を設定
    pub fn with_admin(mut self, admin_id: impl Into<String>) -> Self {
        self.acting_admin = Some(admin_id.into());
        self
    }
}

/// 同意の付与内容（1件分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentGrant {
    pub category: DataCategory,
    pub purpose: ProcessingPurpose,
    pub legal_basis: LegalBasis,
    pub given: bool,
    pub timestamp: DateTime<Utc>,
    pub policy_version: String,
}

impl ConsentGrant {
    /// 現在時刻で同意を付与
    pub fn given(
        category: DataCategory,
        purpose: ProcessingPurpose,
        legal_basis: LegalBasis,
        policy_version: impl Into<String>,
    ) -> Self {
        Self {
            category,
            purpose,
            legal_basis,
            given: true,
            timestamp: Utc::now(),
            policy_version: policy_version.into(),
        }
    }

    /// タイムスタンプを指定
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 拒否として記録
    pub fn refused(mut self) -> Self {
        self.given = false;
        self
    }
}

/// 同意記録
///
/// 作成後は不変。唯一の例外は撤回日時で、撤回は削除ではなく新しい事実として残る。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// 同意ID
    pub id: Uuid,
    /// データ主体の識別子
    pub subject_id: String,
    pub category: DataCategory,
    pub purpose: ProcessingPurpose,
    pub legal_basis: LegalBasis,
    /// 同意したか
    pub consent_given: bool,
    /// 同意日時
    pub consented_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// ポリシーバージョン
    pub policy_version: String,
    /// 撤回日時
    pub withdrawn_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// 付与内容から記録を作成
    pub fn from_grant(subject_id: &str, grant: &ConsentGrant, context: &RequestContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            category: grant.category,
            purpose: grant.purpose,
            legal_basis: grant.legal_basis,
            consent_given: grant.given,
            consented_at: grant.timestamp,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            policy_version: grant.policy_version.clone(),
            withdrawn_at: None,
        }
    }

    /// 同意が有効か（付与済みかつ未撤回）
    pub fn is_active(&self) -> bool {
        self.consent_given && self.withdrawn_at.is_none()
    }

    /// (カテゴリ, 目的) が一致するか
    pub fn matches(&self, category: DataCategory, purpose: ProcessingPurpose) -> bool {
        self.category == category && self.purpose == purpose
    }
}

/// アクセス監査ログエントリ（追記専用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// ログID
    pub id: Uuid,
    /// データ主体の識別子
    pub subject_id: String,
    pub category: DataCategory,
    pub action: AccessAction,
    pub purpose: ProcessingPurpose,
    /// 実行した管理者
    pub acting_admin: Option<String>,
    /// タイムスタンプ
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// 対象フィールド名
    pub fields: Vec<String>,
    /// 補足（消去結果など）
    pub details: Option<String>,
}

impl AccessLogEntry {
    /// 新しいエントリを作成
    pub fn new(
        subject_id: impl Into<String>,
        action: AccessAction,
        category: DataCategory,
        purpose: ProcessingPurpose,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            category,
            action,
            purpose,
            acting_admin: None,
            timestamp: Utc::now(),
            ip_address: None,
            user_agent: None,
            fields: Vec::new(),
            details: None,
        }
    }

    /// 対象フィールドを設定
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// リクエスト元情報を設定
    pub fn with_context(mut self, context: &RequestContext) -> Self {
        self.ip_address = context.ip_address.clone();
        self.user_agent = context.user_agent.clone();
        self.acting_admin = context.acting_admin.clone();
        self
    }

    /// 補足を設定
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 通信保持ログエントリ
///
/// 本文は保存しない。保存するのはハッシュ化された送受信者とダイジェストのみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationLogEntry {
    pub id: Uuid,
    pub sender_hash: HashedIdentifier,
    pub recipient_hash: HashedIdentifier,
    /// 本文のSHA-256
    pub content_digest: String,
    pub channel: Channel,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    /// 本文の文字数
    pub message_length: usize,
    /// 作成時に確定する削除期限
    pub expires_at: DateTime<Utc>,
}

/// 保持期間（年単位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionWindow {
    years: u32,
}

impl RetentionWindow {
    pub fn years(years: u32) -> Self {
        Self { years }
    }

    pub fn as_years(&self) -> u32 {
        self.years
    }

    fn months(&self) -> Months {
        Months::new(self.years.saturating_mul(12))
    }

    /// 作成時刻から削除期限を計算
    pub fn expiry_from(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at
            .checked_add_months(self.months())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// この時刻以降に作成された記録は保持義務の対象
    pub fn cutoff_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(self.months())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self::years(3)
    }
}

/// データ主体（外部所有のUserコレクション）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub id: String,
    pub full_name: Option<EncryptedField>,
    /// ログインに使うため平文
    pub email: String,
    pub phone: Option<EncryptedField>,
    pub phone_hash: Option<HashedIdentifier>,
    pub national_id: Option<EncryptedField>,
    pub national_id_hash: Option<HashedIdentifier>,
    pub address: Option<EncryptedField>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

impl SubjectRecord {
    /// 最小構成のデータ主体を作成
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: None,
            email: email.into(),
            phone: None,
            phone_hash: None,
            national_id: None,
            national_id_hash: None,
            address: None,
            is_active: true,
            created_at: Utc::now(),
            anonymized_at: None,
        }
    }
}

/// 請求（外部所有のBillコレクション）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    pub id: Uuid,
    pub subject_id: String,
    /// 最小通貨単位での金額
    pub amount_cents: i64,
    pub status: BillStatus,
    pub due_date: DateTime<Utc>,
}

impl BillRecord {
    pub fn new(subject_id: impl Into<String>, amount_cents: i64, status: BillStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            amount_cents,
            status,
            due_date: Utc::now(),
        }
    }
}

/// メッセージ（外部所有のMessageコレクション）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(subject_id: impl Into<String>, channel: Channel, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            channel,
            created_at,
        }
    }
}

/// ベストエフォート書き込みの結果
///
/// 呼び出し側は破棄してよい。失敗は運用ログとカウンタで観測する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 記録済み
    Recorded(Uuid),
    /// 永続化に失敗して破棄された
    Dropped,
}

impl WriteOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, WriteOutcome::Recorded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_enum_roundtrip_through_storage_strings() {
        for category in DataCategory::ALL {
            assert_eq!(category.as_str().parse::<DataCategory>().unwrap(), *category);
        }
        for purpose in ProcessingPurpose::ALL {
            assert_eq!(purpose.as_str().parse::<ProcessingPurpose>().unwrap(), *purpose);
        }
        for action in AccessAction::ALL {
            assert_eq!(action.to_string().parse::<AccessAction>().unwrap(), *action);
        }
    }

    #[test]
    fn test_unknown_enum_value_is_validation_error() {
        assert!(matches!(
            "profiling".parse::<ProcessingPurpose>(),
            Err(Error::Validation(_))
        ));
        assert!(matches!("SMS".parse::<Channel>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_serde_uses_storage_names() {
        let json = serde_json::to_string(&DataCategory::FinancialData).unwrap();
        assert_eq!(json, "\"financial_data\"");
    }

    #[test]
    fn test_consent_record_activity() {
        let grant = ConsentGrant::given(
            DataCategory::FinancialData,
            ProcessingPurpose::BillingPayment,
            LegalBasis::Contract,
            "2024-01",
        );
        let mut record = ConsentRecord::from_grant("u1", &grant, &RequestContext::default());
        assert!(record.is_active());

        record.withdrawn_at = Some(Utc::now());
        assert!(!record.is_active());

        let refused = ConsentRecord::from_grant("u1", &grant.refused(), &RequestContext::default());
        assert!(!refused.is_active());
    }

    #[test]
    fn test_retention_window_arithmetic() {
        let window = RetentionWindow::years(3);
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();

        assert_eq!(window.expiry_from(t), Utc.with_ymd_and_hms(2027, 2, 28, 12, 0, 0).unwrap());
        assert_eq!(window.cutoff_from(t), Utc.with_ymd_and_hms(2021, 2, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_outstanding_bill_statuses() {
        assert!(BillStatus::Pending.is_outstanding());
        assert!(BillStatus::Overdue.is_outstanding());
        assert!(!BillStatus::Paid.is_outstanding());
        assert!(!BillStatus::Cancelled.is_outstanding());
    }
}
