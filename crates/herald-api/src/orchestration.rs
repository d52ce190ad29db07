//! End-to-end request processing for notification creation.
//!
//! Coordinates the preference lookup, channel gate, template render, durable
//! persistence, and log publication. The audit-trail rules live here: a
//! channel opt-out persists a failed record and still succeeds at the
//! transport layer, a pending-insert failure is tolerated to protect
//! publication liveness, and a publish failure marks the record failed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use herald_core::{
    models::{
        Channel, DeliveryJob, NotificationId, NotificationRecord, NotificationRequest,
        NotificationResponse, NotificationStatus, RenderResponse,
    },
    storage::notifications::NotificationStore,
};
use tracing::{error, info, warn};

use crate::clients::{TemplateApi, UserApi};

/// Language requested from the template service. Language routing is
/// handled upstream of this core.
const DEFAULT_LANGUAGE: &str = "en";

/// Publication seam between the pipeline and the message log.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publishes a delivery job to the topic for `kind`, keyed by `key`.
    async fn publish_job(
        &self,
        kind: &str,
        key: &str,
        job: &DeliveryJob,
    ) -> herald_queue::Result<()>;
}

#[async_trait]
impl JobPublisher for herald_queue::Manager {
    async fn publish_job(
        &self,
        kind: &str,
        key: &str,
        job: &DeliveryJob,
    ) -> herald_queue::Result<()> {
        self.publish_by_type(kind, key, job).await
    }
}

/// Orchestration service coordinating the notification pipeline.
pub struct Orchestrator {
    users: Arc<dyn UserApi>,
    templates: Arc<dyn TemplateApi>,
    publisher: Arc<dyn JobPublisher>,
    store: Arc<dyn NotificationStore>,
}

impl Orchestrator {
    /// Creates an orchestrator over the four collaborators.
    pub fn new(
        users: Arc<dyn UserApi>,
        templates: Arc<dyn TemplateApi>,
        publisher: Arc<dyn JobPublisher>,
        store: Arc<dyn NotificationStore>,
    ) -> Self {
        Self { users, templates, publisher, store }
    }

    /// Processes a notification request end to end.
    ///
    /// Returns `Ok` with `status = failed` when the user has opted out of
    /// the channel; the request itself was valid. Errors are request-level
    /// failures: preference lookup, template render, or publication.
    pub async fn process(
        &self,
        request: &NotificationRequest,
    ) -> anyhow::Result<NotificationResponse> {
        let notification_id = NotificationId::new();

        info!(
            notification_id = %notification_id,
            user_id = %request.user_id,
            template_code = %request.template_code,
            notification_type = %request.notification_type,
            "processing notification"
        );

        let preferences = self.users.get_preferences(&request.user_id).await.map_err(|err| {
            error!(user_id = %request.user_id, error = %err, "failed to get user preferences");
            err.context("failed to get user preferences")
        })?;

        if !preferences.allows(request.notification_type) {
            let message = format!("{} notifications disabled", request.notification_type);
            warn!(
                user_id = %request.user_id,
                notification_type = %request.notification_type,
                "channel validation failed"
            );

            // Persist the opt-out for the audit trail; the response does not
            // depend on the insert succeeding.
            let mut record =
                self.compose_record(notification_id, request, NotificationStatus::Failed);
            record.error_message = Some(message.clone());
            if let Err(persist_err) = self.store.create(&record).await {
                error!(
                    notification_id = %notification_id,
                    error = %persist_err,
                    "failed to persist failed notification record"
                );
            }

            return Ok(NotificationResponse {
                notification_id,
                status: NotificationStatus::Failed,
                timestamp: Utc::now(),
                error: Some(message),
            });
        }

        let rendered = self
            .templates
            .render_template(&request.template_code, DEFAULT_LANGUAGE, &request.variables)
            .await
            .map_err(|err| {
                error!(
                    template_code = %request.template_code,
                    error = %err,
                    "failed to render template"
                );
                err.context("failed to render template")
            })?;

        // Persist before publishing so a published job always has a prior
        // record. Insert failure is tolerated: the audit gap is accepted in
        // exchange for publication liveness.
        let record = self.compose_record(notification_id, request, NotificationStatus::Pending);
        if let Err(err) = self.store.create(&record).await {
            error!(
                notification_id = %notification_id,
                error = %err,
                "failed to persist notification record"
            );
        }

        let job = compose_job(notification_id, request, &rendered);
        if let Err(err) = self
            .publisher
            .publish_job(
                request.notification_type.as_str(),
                &notification_id.to_string(),
                &job,
            )
            .await
        {
            error!(notification_id = %notification_id, error = %err, "failed to publish job");

            let reason = err.to_string();
            if let Err(update_err) = self
                .store
                .update_status(notification_id, NotificationStatus::Failed, Some(&reason))
                .await
            {
                error!(
                    notification_id = %notification_id,
                    error = %update_err,
                    "failed to update notification status after publish error"
                );
            }

            return Err(anyhow::Error::new(err).context("failed to queue notification"));
        }

        info!(
            notification_id = %notification_id,
            notification_type = %request.notification_type,
            "notification queued successfully"
        );

        Ok(NotificationResponse {
            notification_id,
            status: NotificationStatus::Pending,
            timestamp: Utc::now(),
            error: None,
        })
    }

    /// Applies a status callback to the store.
    pub async fn update_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        error_message: Option<&str>,
    ) -> herald_core::Result<()> {
        self.store.update_status(id, status, error_message).await
    }

    fn compose_record(
        &self,
        id: NotificationId,
        request: &NotificationRequest,
        status: NotificationStatus,
    ) -> NotificationRecord {
        let now = Utc::now();
        NotificationRecord {
            id,
            user_id: request.user_id.clone(),
            template_code: request.template_code.clone(),
            notification_type: request.notification_type,
            status,
            priority: request.effective_priority(),
            variables: request.variables.clone(),
            metadata: request.metadata.clone(),
            error_message: None,
            created_at: now,
            updated_at: now,
            scheduled_for: request.scheduled_for,
        }
    }
}

/// Builds the delivery job from the rendered template.
///
/// Email jobs always carry the rendered subject and the rendered HTML as
/// the body with the text variant as the alternative; push jobs carry the
/// text as the body with the subject as the title only when one was
/// rendered.
fn compose_job(
    id: NotificationId,
    request: &NotificationRequest,
    rendered: &RenderResponse,
) -> DeliveryJob {
    let content = &rendered.rendered;

    let (subject, body, text_body) = match request.notification_type {
        Channel::Email => (
            Some(content.subject.clone()),
            content.body.html.clone(),
            (!content.body.text.is_empty()).then(|| content.body.text.clone()),
        ),
        Channel::Push => (
            (!content.subject.is_empty()).then(|| content.subject.clone()),
            content.body.text.clone(),
            None,
        ),
    };

    DeliveryJob {
        notification_id: id,
        notification_type: request.notification_type,
        user_id: request.user_id.clone(),
        template_code: request.template_code.clone(),
        subject,
        body,
        text_body,
        priority: request.effective_priority(),
        metadata: request.metadata.clone(),
        created_at: Utc::now(),
        retry_count: 0,
        last_retry_at: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use herald_core::models::{
        Channel, JsonMap, RenderedContent, TemplateBody, Template, UserPreferences,
    };
    use herald_core::CoreError;
    use herald_queue::QueueError;

    use super::*;

    struct FakeUsers {
        preferences: Option<UserPreferences>,
    }

    #[async_trait]
    impl UserApi for FakeUsers {
        async fn get_preferences(&self, _user_id: &str) -> anyhow::Result<UserPreferences> {
            self.preferences
                .ok_or_else(|| anyhow::anyhow!("user service returned status 503: overloaded"))
        }
    }

    struct FakeTemplates {
        fail: bool,
        subject: String,
    }

    impl FakeTemplates {
        fn rendering(subject: &str) -> Self {
            Self { fail: false, subject: subject.into() }
        }
    }

    #[async_trait]
    impl TemplateApi for FakeTemplates {
        async fn get_template(
            &self,
            _template_id: &str,
            _language: &str,
        ) -> anyhow::Result<Template> {
            Err(anyhow::anyhow!("not used in these tests"))
        }

        async fn render_template(
            &self,
            template_id: &str,
            language: &str,
            _variables: &JsonMap,
        ) -> anyhow::Result<RenderResponse> {
            if self.fail {
                return Err(anyhow::anyhow!("max retries (3) exceeded: template service returned status 503: overloaded"));
            }
            Ok(RenderResponse {
                template_id: template_id.into(),
                language: language.into(),
                version: "latest".into(),
                rendered: RenderedContent {
                    subject: self.subject.clone(),
                    body: TemplateBody { html: "<p>Hello A!</p>".into(), text: "Hello A!".into() },
                },
                rendered_at: None,
                variables_used: vec!["name".into()],
            })
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        fail: bool,
        published: Mutex<Vec<(String, String, DeliveryJob)>>,
    }

    #[async_trait]
    impl JobPublisher for FakePublisher {
        async fn publish_job(
            &self,
            kind: &str,
            key: &str,
            job: &DeliveryJob,
        ) -> herald_queue::Result<()> {
            if self.fail {
                return Err(QueueError::PublishTimeout {
                    topic: "email.queue".into(),
                    timeout_secs: 10,
                });
            }
            self.published.lock().unwrap().push((kind.into(), key.into(), job.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        fail_create: bool,
        records: Mutex<Vec<NotificationRecord>>,
        updates: Mutex<Vec<(NotificationId, NotificationStatus, Option<String>)>>,
    }

    #[async_trait]
    impl NotificationStore for FakeStore {
        async fn create(&self, record: &NotificationRecord) -> herald_core::Result<()> {
            if self.fail_create {
                return Err(CoreError::Database("connection lost".into()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: NotificationId) -> herald_core::Result<NotificationRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("notification {id}")))
        }

        async fn update_status(
            &self,
            id: NotificationId,
            status: NotificationStatus,
            error_message: Option<&str>,
        ) -> herald_core::Result<()> {
            self.updates.lock().unwrap().push((id, status, error_message.map(String::from)));
            Ok(())
        }

        async fn list_by_user(
            &self,
            _user_id: &str,
            _limit: i64,
            _offset: i64,
        ) -> herald_core::Result<Vec<NotificationRecord>> {
            Ok(self.records.lock().unwrap().clone())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        publisher: Arc<FakePublisher>,
        store: Arc<FakeStore>,
    }

    fn harness(
        preferences: Option<UserPreferences>,
        render_fails: bool,
        publish_fails: bool,
        create_fails: bool,
    ) -> Harness {
        let publisher = Arc::new(FakePublisher { fail: publish_fails, ..Default::default() });
        let store = Arc::new(FakeStore { fail_create: create_fails, ..Default::default() });
        let orchestrator = Orchestrator::new(
            Arc::new(FakeUsers { preferences }),
            Arc::new(FakeTemplates { fail: render_fails, subject: "Welcome!".into() }),
            publisher.clone(),
            store.clone(),
        );
        Harness { orchestrator, publisher, store }
    }

    fn harness_with_subject(subject: &str) -> Harness {
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(FakeStore::default());
        let orchestrator = Orchestrator::new(
            Arc::new(FakeUsers { preferences: all_enabled() }),
            Arc::new(FakeTemplates::rendering(subject)),
            publisher.clone(),
            store.clone(),
        );
        Harness { orchestrator, publisher, store }
    }

    fn all_enabled() -> Option<UserPreferences> {
        Some(UserPreferences { email_enabled: true, push_enabled: true })
    }

    fn email_request() -> NotificationRequest {
        let mut variables = serde_json::Map::new();
        variables.insert("name".into(), serde_json::Value::String("A".into()));
        NotificationRequest {
            request_id: "req-1".into(),
            user_id: "user-1".into(),
            template_code: "welcome".into(),
            notification_type: Channel::Email,
            variables: JsonMap(variables),
            priority: String::new(),
            scheduled_for: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn happy_path_persists_then_publishes() {
        let h = harness(all_enabled(), false, false, false);

        let response = h.orchestrator.process(&email_request()).await.unwrap();

        assert_eq!(response.status, NotificationStatus::Pending);
        assert!(response.error.is_none());

        // Exactly one pending record, sharing the response's id.
        let records = h.store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, response.notification_id);
        assert_eq!(records[0].status, NotificationStatus::Pending);
        assert_eq!(records[0].priority, "normal");

        // Exactly one job on the email topic, keyed by the record id.
        let published = h.publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let (kind, key, job) = &published[0];
        assert_eq!(kind, "email");
        assert_eq!(*key, response.notification_id.to_string());
        assert_eq!(job.notification_id, response.notification_id);
        assert_eq!(job.body, "<p>Hello A!</p>");
        assert_eq!(job.text_body.as_deref(), Some("Hello A!"));
        assert_eq!(job.subject.as_deref(), Some("Welcome!"));
    }

    #[tokio::test]
    async fn push_job_uses_text_body() {
        let h = harness(all_enabled(), false, false, false);
        let mut request = email_request();
        request.notification_type = Channel::Push;

        h.orchestrator.process(&request).await.unwrap();

        let published = h.publisher.published.lock().unwrap();
        let (kind, _, job) = &published[0];
        assert_eq!(kind, "push");
        assert_eq!(job.body, "Hello A!");
        assert!(job.text_body.is_none());
        assert_eq!(job.subject.as_deref(), Some("Welcome!"));
    }

    #[tokio::test]
    async fn email_job_carries_subject_even_when_empty() {
        let h = harness_with_subject("");

        h.orchestrator.process(&email_request()).await.unwrap();

        let published = h.publisher.published.lock().unwrap();
        let job = &published[0].2;
        assert_eq!(job.subject.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn push_job_omits_empty_subject() {
        let h = harness_with_subject("");
        let mut request = email_request();
        request.notification_type = Channel::Push;

        h.orchestrator.process(&request).await.unwrap();

        let published = h.publisher.published.lock().unwrap();
        let job = &published[0].2;
        assert!(job.subject.is_none());
    }

    #[tokio::test]
    async fn opt_out_persists_failed_record_and_publishes_nothing() {
        let h = harness(
            Some(UserPreferences { email_enabled: false, push_enabled: true }),
            false,
            false,
            false,
        );

        let response = h.orchestrator.process(&email_request()).await.unwrap();

        assert_eq!(response.status, NotificationStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("email notifications disabled"));

        let records = h.store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, NotificationStatus::Failed);
        assert_eq!(records[0].error_message.as_deref(), Some("email notifications disabled"));

        assert!(h.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn preference_failure_creates_no_record() {
        let h = harness(None, false, false, false);

        let err = h.orchestrator.process(&email_request()).await.unwrap_err();

        assert!(format!("{err:#}").contains("failed to get user preferences"));
        assert!(h.store.records.lock().unwrap().is_empty());
        assert!(h.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn render_failure_creates_no_record() {
        let h = harness(all_enabled(), true, false, false);

        let err = h.orchestrator.process(&email_request()).await.unwrap_err();

        let rendered = format!("{err:#}");
        assert!(rendered.contains("failed to render template"));
        assert!(rendered.contains("max retries (3) exceeded"));
        assert!(h.store.records.lock().unwrap().is_empty());
        assert!(h.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_insert_failure_does_not_block_publication() {
        let h = harness(all_enabled(), false, false, true);

        let response = h.orchestrator.process(&email_request()).await.unwrap();

        assert_eq!(response.status, NotificationStatus::Pending);
        assert_eq!(h.publisher.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_marks_record_failed() {
        let h = harness(all_enabled(), false, true, false);

        let err = h.orchestrator.process(&email_request()).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to queue notification"));

        // The prior record exists and was transitioned to failed.
        let records = h.store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let updates = h.store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, records[0].id);
        assert_eq!(updates[0].1, NotificationStatus::Failed);
        assert!(updates[0].2.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn metadata_and_priority_flow_into_job() {
        let h = harness(all_enabled(), false, false, false);
        let mut request = email_request();
        request.priority = "high".into();
        let mut metadata = serde_json::Map::new();
        metadata.insert("recipient".into(), serde_json::Value::String("a@example.com".into()));
        request.metadata = Some(JsonMap(metadata));

        h.orchestrator.process(&request).await.unwrap();

        let published = h.publisher.published.lock().unwrap();
        let job = &published[0].2;
        assert_eq!(job.priority, "high");
        assert_eq!(job.metadata.as_ref().unwrap().get_str("recipient"), Some("a@example.com"));
    }
}
