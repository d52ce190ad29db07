//! In-process mock services for local development.
//!
//! Selected by the `use_mock_services` flag so the orchestrator can run
//! without the real user and template services. The template mock performs
//! simple `{{variable}}` substitution over a small built-in catalog.

use async_trait::async_trait;
use chrono::Utc;
use herald_core::models::{
    JsonMap, RenderResponse, RenderedContent, Template, TemplateBody, TemplateVariable,
    UserPreferences,
};

use super::{TemplateApi, UserApi};

/// User service mock: every channel enabled for every user.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockUserService;

#[async_trait]
impl UserApi for MockUserService {
    async fn get_preferences(&self, _user_id: &str) -> anyhow::Result<UserPreferences> {
        Ok(UserPreferences { email_enabled: true, push_enabled: true })
    }
}

/// Template service mock with a built-in catalog and naive substitution.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockTemplateService;

impl MockTemplateService {
    fn catalog(template_id: &str, language: &str) -> Option<Template> {
        match template_id {
            "welcome_email" => Some(Template {
                template_id: "welcome_email".into(),
                name: "Welcome Email".into(),
                version: "2.3.0".into(),
                language: language.into(),
                kind: "email".into(),
                subject: "Welcome to {{app_name}}, {{user_name}}!".into(),
                body: TemplateBody {
                    html: "<html><body><h1>Welcome {{user_name}}!</h1>\
                           <p>Thank you for joining {{app_name}}.</p></body></html>"
                        .into(),
                    text: "Welcome {{user_name}}!\n\nThank you for joining {{app_name}}.".into(),
                },
                variables: vec![
                    TemplateVariable {
                        name: "user_name".into(),
                        kind: "string".into(),
                        required: true,
                        description: "User's display name".into(),
                    },
                    TemplateVariable {
                        name: "app_name".into(),
                        kind: "string".into(),
                        required: true,
                        description: "Application name".into(),
                    },
                ],
            }),
            "password_reset" => Some(Template {
                template_id: "password_reset".into(),
                name: "Password Reset".into(),
                version: "1.5.2".into(),
                language: language.into(),
                kind: "email".into(),
                subject: "Reset your password for {{app_name}}".into(),
                body: TemplateBody {
                    html: "<html><body><h1>Password Reset Request</h1>\
                           <p>Click here to reset: {{reset_url}}</p></body></html>"
                        .into(),
                    text: "Password Reset Request\n\nClick here to reset: {{reset_url}}".into(),
                },
                variables: vec![
                    TemplateVariable {
                        name: "app_name".into(),
                        kind: "string".into(),
                        required: true,
                        description: "Application name".into(),
                    },
                    TemplateVariable {
                        name: "reset_url".into(),
                        kind: "string".into(),
                        required: true,
                        description: "Password reset URL".into(),
                    },
                ],
            }),
            _ => None,
        }
    }

    fn substitute(text: &str, variables: &JsonMap, used: &mut Vec<String>) -> String {
        let mut rendered = text.to_string();
        for (key, value) in &variables.0 {
            let placeholder = format!("{{{{{key}}}}}");
            if rendered.contains(&placeholder) {
                let replacement = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&placeholder, &replacement);
                if !used.contains(key) {
                    used.push(key.clone());
                }
            }
        }
        rendered
    }
}

#[async_trait]
impl TemplateApi for MockTemplateService {
    async fn get_template(&self, template_id: &str, language: &str) -> anyhow::Result<Template> {
        Self::catalog(template_id, language)
            .ok_or_else(|| anyhow::anyhow!("template not found: {template_id}"))
    }

    async fn render_template(
        &self,
        template_id: &str,
        language: &str,
        variables: &JsonMap,
    ) -> anyhow::Result<RenderResponse> {
        let template = self.get_template(template_id, language).await?;

        let mut used = Vec::new();
        let subject = Self::substitute(&template.subject, variables, &mut used);
        let html = Self::substitute(&template.body.html, variables, &mut used);
        let text = Self::substitute(&template.body.text, variables, &mut used);

        Ok(RenderResponse {
            template_id: template_id.into(),
            language: language.into(),
            version: template.version,
            rendered: RenderedContent { subject, body: TemplateBody { html, text } },
            rendered_at: Some(Utc::now()),
            variables_used: used,
        })
    }
}
