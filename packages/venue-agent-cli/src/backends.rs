use tracing::info;
use venue_agent::{AnthropicBackend, BackendRegistry, GeminiBackend, OpenAiBackend};

use crate::config::{ApiTokens, ModelLists};

/// Build one backend per configured model of every vendor with a token.
pub fn register_backends(tokens: &ApiTokens, models: &ModelLists) -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    if let Some(token) = &tokens.chatgpt {
        for model in &models.gpt_models {
            registry.register(Box::new(
                OpenAiBackend::openai(token.clone(), model.as_str()).with_image_support(true),
            ));
        }
    }
    if let Some(token) = &tokens.claude {
        for model in &models.claude_models {
            registry.register(Box::new(
                AnthropicBackend::new(token.clone(), model.as_str()).with_image_support(true),
            ));
        }
    }
    if let Some(token) = &tokens.mistral {
        for model in &models.mistral_models {
            registry.register(Box::new(OpenAiBackend::mistral(token.clone(), model.as_str())));
        }
    }
    if let Some(token) = &tokens.together {
        for model in &models.together_models {
            registry.register(Box::new(OpenAiBackend::together(token.clone(), model.as_str())));
        }
    }
    if let Some(token) = &tokens.jamba {
        for model in &models.jamba_models {
            registry.register(Box::new(OpenAiBackend::jamba(token.clone(), model.as_str())));
        }
    }
    if let (Some(project), Some(token)) = (&tokens.gcloud.project_id, &tokens.gcloud.access_token) {
        for model in &models.gemini_models {
            registry.register(Box::new(GeminiBackend::vertex(
                project.as_str(),
                tokens.gcloud.location_id.as_str(),
                token.clone(),
                model.as_str(),
            )));
        }
    }

    for name in registry.names() {
        info!(backend = name, "registered backend");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcloudOptions;
    use venue_agent::Backend;

    fn models() -> ModelLists {
        ModelLists {
            gpt_models: vec!["gpt-4o-mini".into()],
            claude_models: vec!["claude-3-5-sonnet-20240620".into()],
            mistral_models: vec!["mistral-large-2407".into()],
            together_models: vec!["meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo".into()],
            jamba_models: vec!["jamba-1.5-large".into(), "jamba-1.5-mini".into()],
            gemini_models: vec!["gemini-1.5-flash-001".into(), "gemini-1.5-pro-001".into()],
        }
    }

    #[test]
    fn test_only_vendors_with_tokens_are_registered() {
        let tokens = ApiTokens {
            chatgpt: Some("sk".into()),
            jamba: Some("j".into()),
            ..Default::default()
        };

        let registry = register_backends(&tokens, &models());

        assert_eq!(
            registry.names(),
            vec!["gpt-4o-mini", "jamba-1.5-large", "jamba-1.5-mini"]
        );
        assert!(registry.get("gpt-4o-mini").unwrap().supports_images());
        assert!(!registry.get("jamba-1.5-mini").unwrap().supports_images());
    }

    #[test]
    fn test_gemini_needs_project_and_token() {
        let mut tokens = ApiTokens {
            gcloud: GcloudOptions {
                project_id: Some("rooms".into()),
                location_id: "europe-west3".into(),
                access_token: None,
            },
            ..Default::default()
        };
        assert!(register_backends(&tokens, &models()).is_empty());

        tokens.gcloud.access_token = Some("ya29.abc".into());
        let registry = register_backends(&tokens, &models());
        assert_eq!(registry.names(), vec!["gemini-1.5-flash-001", "gemini-1.5-pro-001"]);
        assert!(!registry.get("gemini-1.5-pro-001").unwrap().supports_images());
    }

    #[test]
    fn test_no_tokens_no_backends() {
        assert!(register_backends(&ApiTokens::default(), &models()).is_empty());
    }
}
