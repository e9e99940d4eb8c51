pub mod api_client;
mod parse;
mod prompt;

pub use api_client::{ApiClient, ChatBackend, ChatRequest, Message};

use async_trait::async_trait;
use log::error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{AiConfig, LMSTUDIO_MODEL};
use crate::error::AssistantError;

/// Items per categorization prompt unless the caller asks otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 50;

const CONNECT_TEST_TIMEOUT: Duration = Duration::from_secs(5);
const CORS_HINT: &str = "Enable CORS in LM Studio (Server Options).";

/// One inventory item to categorize. `original_idx` is the caller's stable
/// identifier, echoed back by the model so responses can be matched to
/// inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizationItem {
    #[serde(rename = "originalIdx")]
    pub original_idx: u64,
    pub item_name: String,
}

/// One category assignment from the model. Not validated against the input
/// set beyond being well-formed; the category may be a novel suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub id: u64,
    pub category: String,
}

/// One suggested merge: fold `source` into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub source: String,
    pub target: String,
    pub reason: String,
}

/// Terminal outcome of a connectivity test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Verified,
    Failed(String),
}

/// Receives each batch's results as they arrive. Called once per
/// successfully parsed chunk, strictly in input order, and awaited before
/// the next request is issued.
#[async_trait]
pub trait BatchHandler: Send {
    async fn on_batch(
        &mut self,
        updates: Vec<CategoryUpdate>,
        processed: usize,
        total: usize,
    ) -> anyhow::Result<()>;
}

/// The AI assistant client. Holds the connection settings and the backend;
/// every operation is one or more outbound chat completions.
pub struct Assistant {
    config: AiConfig,
    backend: Box<dyn ChatBackend>,
}

impl Assistant {
    pub fn new(config: AiConfig) -> Self {
        Assistant {
            config,
            backend: Box::new(ApiClient::new()),
        }
    }

    pub fn with_backend(config: AiConfig, backend: Box<dyn ChatBackend>) -> Self {
        Assistant { config, backend }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn require_api_key(&self) -> Result<(), AssistantError> {
        if self.config.provider.requires_api_key() && self.config.api_key.trim().is_empty() {
            return Err(AssistantError::MissingApiKey);
        }
        Ok(())
    }

    /// Issues one minimal completion (a single "Test" message capped at one
    /// token) against the configured endpoint, with a 5-second timeout.
    /// Every outcome is terminal; network failures against LM Studio get a
    /// CORS remediation hint.
    pub async fn test_connection(&self) -> ConnectionStatus {
        let mut config = self.config.clone();
        if config.model.trim().is_empty() {
            config.model = LMSTUDIO_MODEL.to_string();
        }

        let request = ChatRequest {
            messages: vec![Message::user("Test")],
            temperature: None,
            max_tokens: Some(1),
            timeout: Some(CONNECT_TEST_TIMEOUT),
        };

        match self.backend.complete(&config, request).await {
            Ok(_) => ConnectionStatus::Verified,
            Err(err @ AssistantError::Network(_)) => {
                let mut message = err.to_string();
                if config.provider == crate::config::Provider::LmStudio {
                    message = format!("{message}. {CORS_HINT}");
                }
                ConnectionStatus::Failed(message)
            }
            Err(err) => ConnectionStatus::Failed(err.to_string()),
        }
    }

    /// Categorizes `items` against `all_categories` in order-preserving
    /// chunks of at most `batch_size`, one completion per chunk, strictly
    /// sequential. Each parsed chunk is handed to `handler` before the next
    /// request goes out. A failed chunk (request, parse, or handler error)
    /// is logged and skipped; the loop always runs to the end.
    pub async fn run_batch_categorization(
        &self,
        items: &[CategorizationItem],
        all_categories: &[String],
        handler: &mut dyn BatchHandler,
        batch_size: usize,
    ) -> Result<(), AssistantError> {
        self.require_api_key()?;

        let total = items.len();
        let batch_size = batch_size.max(1);
        let mut processed = 0;

        for chunk in items.chunks(batch_size) {
            processed += chunk.len();

            let request = ChatRequest {
                messages: vec![
                    Message::system(prompt::STRICT_JSON_SYSTEM),
                    Message::user(prompt::categorization_prompt(all_categories, chunk)),
                ],
                temperature: Some(0.1),
                max_tokens: None,
                timeout: None,
            };

            let text = match self.backend.complete(&self.config, request).await {
                Ok(text) => text,
                Err(err) => {
                    error!("batch request failed at {processed}/{total}: {err}");
                    continue;
                }
            };

            let updates = match parse::parse_category_updates(&text) {
                Ok(updates) => updates,
                Err(err) => {
                    error!("skipping unparseable batch at {processed}/{total}: {err}");
                    continue;
                }
            };

            if let Err(err) = handler.on_batch(updates, processed, total).await {
                error!("batch handler failed at {processed}/{total}: {err}");
            }
        }

        Ok(())
    }

    /// Asks the model for duplicate/abbreviation/variant category pairs in
    /// one shot. Unlike batch categorization, every failure propagates.
    pub async fn find_category_merges(
        &self,
        categories: &[String],
    ) -> Result<Vec<MergeSuggestion>, AssistantError> {
        self.require_api_key()?;

        let request = ChatRequest {
            messages: vec![Message::user(prompt::merge_prompt(categories))],
            temperature: Some(0.1),
            max_tokens: None,
            timeout: None,
        };

        let text = self.backend.complete(&self.config, request).await?;
        parse::parse_merge_suggestions(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::api_client::testing::{FailingBackend, MockBackend};
    use super::*;
    use crate::config::Provider;
    use std::sync::Arc;

    fn items(count: u64) -> Vec<CategorizationItem> {
        (0..count)
            .map(|i| CategorizationItem {
                original_idx: i,
                item_name: format!("Item {i}"),
            })
            .collect()
    }

    fn categories() -> Vec<String> {
        vec!["Beverages".to_string(), "Snacks".to_string()]
    }

    fn keyed_config() -> AiConfig {
        AiConfig {
            api_key: "sk-test".to_string(),
            ..AiConfig::default()
        }
    }

    struct Recorder {
        calls: Vec<(Vec<CategoryUpdate>, usize, usize)>,
    }

    impl Recorder {
        fn new() -> Self {
            Recorder { calls: Vec::new() }
        }
    }

    #[async_trait]
    impl BatchHandler for Recorder {
        async fn on_batch(
            &mut self,
            updates: Vec<CategoryUpdate>,
            processed: usize,
            total: usize,
        ) -> anyhow::Result<()> {
            self.calls.push((updates, processed, total));
            Ok(())
        }
    }

    struct BackendHandle(Arc<MockBackend>);

    #[async_trait]
    impl ChatBackend for BackendHandle {
        async fn complete(
            &self,
            config: &AiConfig,
            request: ChatRequest,
        ) -> Result<String, AssistantError> {
            self.0.complete(config, request).await
        }
    }

    fn assistant_with_mock(config: AiConfig, mock: Arc<MockBackend>) -> Assistant {
        Assistant::with_backend(config, Box::new(BackendHandle(mock)))
    }

    #[tokio::test]
    async fn test_batch_issues_ceil_n_over_b_requests() {
        let mock = Arc::new(MockBackend::new(["[]", "[]", "[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(5), &categories(), &mut recorder, 2)
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(recorder.calls.len(), 3);
        assert_eq!(recorder.calls[0].1, 2);
        assert_eq!(recorder.calls[1].1, 4);
        assert_eq!(recorder.calls[2].1, 5);
        assert!(recorder.calls.iter().all(|call| call.2 == 5));
    }

    #[tokio::test]
    async fn test_batches_are_disjoint_and_in_order() {
        let mock = Arc::new(MockBackend::new(["[]", "[]", "[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(5), &categories(), &mut recorder, 2)
            .await
            .unwrap();

        let prompts: Vec<String> = mock
            .requests()
            .iter()
            .map(|req| req.messages.last().unwrap().content.clone())
            .collect();

        assert!(prompts[0].contains("0 | Item 0") && prompts[0].contains("1 | Item 1"));
        assert!(!prompts[0].contains("2 | Item 2"));
        assert!(prompts[1].contains("2 | Item 2") && prompts[1].contains("3 | Item 3"));
        assert!(prompts[2].contains("4 | Item 4"));
        assert!(!prompts[2].contains("3 | Item 3"));
    }

    #[tokio::test]
    async fn test_batch_requests_carry_system_message_and_temperature() {
        let mock = Arc::new(MockBackend::new(["[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(1), &categories(), &mut recorder, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].messages[0].role, "system");
        assert_eq!(requests[0].temperature, Some(0.1));
        assert_eq!(requests[0].max_tokens, None);
    }

    #[tokio::test]
    async fn test_missing_api_key_blocks_both_operations() {
        let config = AiConfig::default(); // openai provider, empty key
        let mock = Arc::new(MockBackend::new(["[]"]));
        let assistant = assistant_with_mock(config, mock.clone());
        let mut recorder = Recorder::new();

        let batch = assistant
            .run_batch_categorization(&items(3), &categories(), &mut recorder, 2)
            .await;
        assert!(matches!(batch, Err(AssistantError::MissingApiKey)));

        let merges = assistant.find_category_merges(&categories()).await;
        assert!(matches!(merges, Err(AssistantError::MissingApiKey)));

        assert!(mock.requests().is_empty());
        assert!(recorder.calls.is_empty());
    }

    #[tokio::test]
    async fn test_local_provider_needs_no_api_key() {
        let config = AiConfig {
            provider: Provider::LmStudio,
            api_key: String::new(),
            ..AiConfig::default()
        };
        let mock = Arc::new(MockBackend::new(["[]"]));
        let assistant = assistant_with_mock(config, mock.clone());
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(1), &categories(), &mut recorder, 1)
            .await
            .unwrap();
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_chunk_skipped_but_loop_continues() {
        let good = r#"[{"id": 2, "category": "Snacks"}]"#;
        let mock = Arc::new(MockBackend::new(["this is not JSON", good]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(4), &categories(), &mut recorder, 2)
            .await
            .unwrap();

        assert_eq!(mock.requests().len(), 2);
        assert_eq!(recorder.calls.len(), 1);
        assert_eq!(recorder.calls[0].0[0].id, 2);
        assert_eq!(recorder.calls[0].1, 4);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_the_loop() {
        struct Flaky {
            calls: usize,
        }

        #[async_trait]
        impl BatchHandler for Flaky {
            async fn on_batch(
                &mut self,
                _updates: Vec<CategoryUpdate>,
                _processed: usize,
                _total: usize,
            ) -> anyhow::Result<()> {
                self.calls += 1;
                anyhow::bail!("render failed")
            }
        }

        let mock = Arc::new(MockBackend::new(["[]", "[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        let mut handler = Flaky { calls: 0 };

        assistant
            .run_batch_categorization(&items(2), &categories(), &mut handler, 1)
            .await
            .unwrap();

        assert_eq!(handler.calls, 2);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fenced_batch_response_parses() {
        let fenced = "```json\n[{\"id\": 0, \"category\": \"Beverages\"}]\n```";
        let mock = Arc::new(MockBackend::new([fenced]));
        let assistant = assistant_with_mock(keyed_config(), mock);
        let mut recorder = Recorder::new();

        assistant
            .run_batch_categorization(&items(1), &categories(), &mut recorder, 1)
            .await
            .unwrap();

        assert_eq!(recorder.calls[0].0[0].category, "Beverages");
    }

    #[tokio::test]
    async fn test_merges_empty_array_resolves_empty() {
        let mock = Arc::new(MockBackend::new(["[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock);
        let merges = assistant.find_category_merges(&categories()).await.unwrap();
        assert!(merges.is_empty());
    }

    #[tokio::test]
    async fn test_merge_parse_failure_propagates() {
        let mock = Arc::new(MockBackend::new(["I could not find any merges."]));
        let assistant = assistant_with_mock(keyed_config(), mock);
        let merges = assistant.find_category_merges(&categories()).await;
        assert!(matches!(merges, Err(AssistantError::Parse(_))));
    }

    #[tokio::test]
    async fn test_merge_request_is_single_user_turn() {
        let mock = Arc::new(MockBackend::new(["[]"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        assistant.find_category_merges(&categories()).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].role, "user");
        assert_eq!(requests[0].temperature, Some(0.1));
    }

    #[tokio::test]
    async fn test_connection_verified_on_success() {
        let mock = Arc::new(MockBackend::new(["Hi"]));
        let assistant = assistant_with_mock(keyed_config(), mock.clone());
        assert_eq!(assistant.test_connection().await, ConnectionStatus::Verified);

        let requests = mock.requests();
        assert_eq!(requests[0].max_tokens, Some(1));
        assert_eq!(requests[0].messages[0].content, "Test");
        assert_eq!(requests[0].timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_connection_network_failure_gets_cors_hint_for_lmstudio() {
        let config = AiConfig {
            provider: Provider::LmStudio,
            ..AiConfig::default()
        };
        let assistant = Assistant::with_backend(config, Box::new(FailingBackend));

        match assistant.test_connection().await {
            ConnectionStatus::Failed(message) => {
                assert!(message.contains("network error"));
                assert!(message.contains("Enable CORS in LM Studio"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_cloud_failure_has_no_cors_hint() {
        let assistant = Assistant::with_backend(keyed_config(), Box::new(FailingBackend));
        match assistant.test_connection().await {
            ConnectionStatus::Failed(message) => {
                assert!(!message.contains("LM Studio"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_endpoint_reports_network_failure() {
        // Grab a port the OS considers free, then release it so the
        // connection is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = AiConfig {
            provider: Provider::LmStudio,
            base_url: format!("http://127.0.0.1:{port}/v1"),
            ..AiConfig::default()
        };
        let assistant = Assistant::new(config);

        match assistant.test_connection().await {
            ConnectionStatus::Failed(message) => {
                assert!(message.contains("network error"), "got: {message}");
            }
            ConnectionStatus::Verified => panic!("nothing should be listening"),
        }
    }
}
