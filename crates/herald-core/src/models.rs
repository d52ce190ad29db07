//! Core domain models and strongly-typed identifiers.
//!
//! Defines notification requests, durable records, delivery jobs, and the
//! newtype id wrapper used to correlate a record with its published job and
//! any later status callback. Includes database serialization for JSONB
//! documents and the channel/status enums backed by Postgres enum types.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed notification identifier.
///
/// Wraps a UUID to prevent mixing with other identifiers. The id is the sole
/// correlator between the durable record, the published delivery job, and any
/// subsequent status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    /// Creates a new random notification ID.
    ///
    /// Uses UUID v4 for globally unique identifiers without coordination.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NotificationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for NotificationId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for NotificationId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for NotificationId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "notification_type", rename_all = "lowercase")]
pub enum Channel {
    /// Email delivery via the SMTP worker.
    Email,
    /// Mobile push delivery.
    Push,
}

impl Channel {
    /// Returns the wire name of the channel (`email` or `push`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            other => Err(format!("unsupported notification type: {other}")),
        }
    }
}

/// Lifecycle status of a notification.
///
/// A record is created `pending` (or `failed` for channel opt-outs) and is
/// moved to a terminal status by the delivery worker's callback. Terminal
/// statuses never transition back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Persisted and handed off to the message log.
    Pending,
    /// Delivery worker reported success.
    Delivered,
    /// Channel opt-out, publish failure, or delivery exhaustion.
    Failed,
}

impl NotificationStatus {
    /// Whether this status is terminal for the record.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Delivered => f.write_str("delivered"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("status must be one of pending, delivered, failed: {other}")),
        }
    }
}

/// JSON document type for dynamic mappings (variables, metadata).
///
/// Stored as JSONB. The empty case is `{}`, never absent; nullable columns
/// are modelled as `Option<JsonMap>` so `null` and absent stay distinct at
/// the API boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonMap(pub serde_json::Map<String, serde_json::Value>);

impl JsonMap {
    /// Creates an empty document (`{}`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a string-valued entry.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for JsonMap {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

impl sqlx::Type<PgDb> for JsonMap {
    fn type_info() -> PgTypeInfo {
        <serde_json::Value as sqlx::Type<PgDb>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <serde_json::Value as sqlx::Type<PgDb>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JsonMap {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let value = <serde_json::Value as sqlx::Decode<PgDb>>::decode(value)?;
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(format!("expected JSON object, got {other}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for JsonMap {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        let value = serde_json::Value::Object(self.0.clone());
        <serde_json::Value as sqlx::Encode<PgDb>>::encode_by_ref(&value, buf)
    }
}

/// Ingress payload for creating a notification.
///
/// `request_id` is the client-supplied idempotency key; duplicate submissions
/// with the same key replay the original response instead of reprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Client-supplied idempotency key.
    pub request_id: String,
    /// Target user.
    pub user_id: String,
    /// Template to render.
    pub template_code: String,
    /// Delivery channel.
    pub notification_type: Channel,
    /// Template variables.
    #[serde(default)]
    pub variables: JsonMap,
    /// Free-form priority; empty becomes `normal`.
    #[serde(default)]
    pub priority: String,
    /// Optional future delivery time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Optional caller metadata, passed through to the delivery job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
}

impl NotificationRequest {
    /// Validates required fields, returning the name of the first offending
    /// field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.request_id.trim().is_empty() {
            return Err("request_id");
        }
        if self.user_id.trim().is_empty() {
            return Err("user_id");
        }
        if self.template_code.trim().is_empty() {
            return Err("template_code");
        }
        Ok(())
    }

    /// Effective priority: an empty field defaults to `normal`.
    pub fn effective_priority(&self) -> String {
        if self.priority.is_empty() {
            "normal".to_string()
        } else {
            self.priority.clone()
        }
    }
}

/// Response returned by the orchestration pipeline.
///
/// This is the value cached by the idempotency layer and replayed verbatim
/// for duplicate submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    /// Server-generated notification id.
    pub notification_id: NotificationId,
    /// Status at response time (`pending`, or `failed` for opt-outs).
    pub status: NotificationStatus,
    /// Response timestamp.
    pub timestamp: DateTime<Utc>,
    /// Error detail for failed outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable record of a notification attempt.
///
/// Created exactly once per (non-cached) ingress call; later transitions only
/// update `status`, `error_message`, and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    /// Unique identifier, generated by the pipeline.
    pub id: NotificationId,
    /// Target user.
    pub user_id: String,
    /// Template that was (or would have been) rendered.
    pub template_code: String,
    /// Delivery channel.
    pub notification_type: Channel,
    /// Lifecycle status.
    pub status: NotificationStatus,
    /// Free-form priority.
    pub priority: String,
    /// Template variables as a JSON document; empty is `{}`.
    pub variables: JsonMap,
    /// Caller metadata; absent stays absent.
    pub metadata: Option<JsonMap>,
    /// Failure detail for `failed` records.
    pub error_message: Option<String>,
    /// Set on insert, never mutated.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
    /// Optional future delivery time.
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// On-wire payload published to the channel topic.
///
/// Serialized as JSON and keyed by `notification_id`, pinning all jobs for
/// one notification to one partition and preserving per-notification order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    /// Correlates the job with its durable record.
    pub notification_id: NotificationId,
    /// Delivery channel, repeated for consumers that share a codebase.
    pub notification_type: Channel,
    /// Target user.
    pub user_id: String,
    /// Source template.
    pub template_code: String,
    /// Rendered subject (email) or push title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Rendered primary content: HTML for email, text for push.
    pub body: String,
    /// Plain-text alternative for email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    /// Free-form priority.
    pub priority: String,
    /// Caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
    /// Publish timestamp.
    pub created_at: DateTime<Utc>,
    /// Redelivery count, bumped by consumers that requeue.
    #[serde(default)]
    pub retry_count: u32,
    /// Timestamp of the last redelivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,
}

/// Status callback posted by a delivery worker to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The notification being reported on.
    pub notification_id: NotificationId,
    /// Terminal (or explicitly pending) status.
    pub status: NotificationStatus,
    /// When the outcome was observed.
    pub timestamp: DateTime<Utc>,
    /// Failure detail for `failed` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-channel delivery preferences returned by the user service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Whether the user accepts email notifications.
    pub email_enabled: bool,
    /// Whether the user accepts push notifications.
    pub push_enabled: bool,
}

impl UserPreferences {
    /// Whether the given channel is enabled for this user.
    pub const fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Push => self.push_enabled,
        }
    }
}

/// Rendered template body with HTML and plain-text variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateBody {
    /// HTML variant, used as the email body.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub html: String,
    /// Plain-text variant, used for push and as the email alternative.
    pub text: String,
}

/// Rendered content for one template/language pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    /// Rendered subject line.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    /// Rendered body variants.
    pub body: TemplateBody,
}

/// Response from the template service's render endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    /// Source template id.
    pub template_id: String,
    /// Language the render was produced in.
    pub language: String,
    /// Template version used.
    #[serde(default)]
    pub version: String,
    /// Rendered content.
    pub rendered: RenderedContent,
    /// When the render happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_at: Option<DateTime<Utc>>,
    /// Variables consumed during the render.
    #[serde(default)]
    pub variables_used: Vec<String>,
}

/// Declared variable in a template's catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Variable name as referenced in the template body.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether a render without this variable fails.
    pub required: bool,
    /// Human description.
    #[serde(default)]
    pub description: String,
}

/// Template catalog entry returned by the template service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Stable template identifier.
    pub template_id: String,
    /// Human-readable name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Language of this entry.
    pub language: String,
    /// Template kind (`email`, `push`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Subject template for email kinds.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    /// Body templates.
    pub body: TemplateBody,
    /// Declared variables.
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> NotificationRequest {
        NotificationRequest {
            request_id: "req-1".into(),
            user_id: "user-1".into(),
            template_code: "welcome".into(),
            notification_type: Channel::Email,
            variables: JsonMap::new(),
            priority: String::new(),
            scheduled_for: None,
            metadata: None,
        }
    }

    #[test]
    fn request_validation_names_offending_field() {
        assert!(base_request().validate().is_ok());

        let mut req = base_request();
        req.request_id = "  ".into();
        assert_eq!(req.validate(), Err("request_id"));

        let mut req = base_request();
        req.user_id = String::new();
        assert_eq!(req.validate(), Err("user_id"));

        let mut req = base_request();
        req.template_code = String::new();
        assert_eq!(req.validate(), Err("template_code"));
    }

    #[test]
    fn empty_priority_defaults_to_normal() {
        let req = base_request();
        assert_eq!(req.effective_priority(), "normal");

        let mut req = base_request();
        req.priority = "high".into();
        assert_eq!(req.effective_priority(), "high");
    }

    #[test]
    fn channel_round_trips_through_serde_and_str() {
        assert_eq!(serde_json::to_string(&Channel::Email).unwrap(), r#""email""#);
        assert_eq!(serde_json::from_str::<Channel>(r#""push""#).unwrap(), Channel::Push);
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert!("sms".parse::<Channel>().is_err());
    }

    #[test]
    fn terminal_statuses_identified() {
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
    }

    #[test]
    fn request_rejects_unknown_channel() {
        let raw = r#"{
            "request_id": "r",
            "user_id": "u",
            "template_code": "t",
            "notification_type": "fax"
        }"#;
        assert!(serde_json::from_str::<NotificationRequest>(raw).is_err());
    }

    #[test]
    fn request_missing_required_field_fails_deserialization() {
        let raw = r#"{"user_id": "u", "template_code": "t", "notification_type": "email"}"#;
        assert!(serde_json::from_str::<NotificationRequest>(raw).is_err());
    }

    #[test]
    fn delivery_job_omits_absent_optionals() {
        let job = DeliveryJob {
            notification_id: NotificationId::new(),
            notification_type: Channel::Push,
            user_id: "user-1".into(),
            template_code: "welcome".into(),
            subject: None,
            body: "Hello A!".into(),
            text_body: None,
            priority: "normal".into(),
            metadata: None,
            created_at: Utc::now(),
            retry_count: 0,
            last_retry_at: None,
        };

        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("subject").is_none());
        assert!(json.get("text_body").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["body"], "Hello A!");
    }

    #[test]
    fn delivery_job_round_trips() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("recipient".into(), serde_json::Value::String("a@example.com".into()));

        let job = DeliveryJob {
            notification_id: NotificationId::new(),
            notification_type: Channel::Email,
            user_id: "user-1".into(),
            template_code: "welcome".into(),
            subject: Some("Welcome".into()),
            body: "<p>Hello A!</p>".into(),
            text_body: Some("Hello A!".into()),
            priority: "normal".into(),
            metadata: Some(JsonMap(metadata)),
            created_at: Utc::now(),
            retry_count: 2,
            last_retry_at: Some(Utc::now()),
        };

        let encoded = serde_json::to_vec(&job).unwrap();
        let decoded: DeliveryJob = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, job);
        assert_eq!(decoded.metadata.as_ref().unwrap().get_str("recipient"), Some("a@example.com"));
    }

    #[test]
    fn preferences_gate_by_channel() {
        let prefs = UserPreferences { email_enabled: true, push_enabled: false };
        assert!(prefs.allows(Channel::Email));
        assert!(!prefs.allows(Channel::Push));
    }

    #[test]
    fn json_map_defaults_to_empty_object() {
        let map = JsonMap::default();
        assert!(map.is_empty());
        assert_eq!(serde_json::to_string(&map).unwrap(), "{}");
    }

    #[test]
    fn render_response_parses_service_shape() {
        let raw = r#"{
            "template_id": "welcome",
            "language": "en",
            "version": "latest",
            "rendered": {
                "subject": "Welcome!",
                "body": {"html": "<p>Hello A!</p>", "text": "Hello A!"}
            },
            "variables_used": ["name"]
        }"#;

        let response: RenderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.rendered.subject, "Welcome!");
        assert_eq!(response.rendered.body.html, "<p>Hello A!</p>");
        assert_eq!(response.rendered.body.text, "Hello A!");
        assert_eq!(response.variables_used, vec!["name"]);
    }
}
