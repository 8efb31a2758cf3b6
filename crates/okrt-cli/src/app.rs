use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use okrt_core::{Config, JsonlRecorder, RequestDescriptor, StreamEngine};
use okrt_wire::provider::anthropic::AnthropicConnector;
use okrt_wire::provider::gemini::GeminiConnector;
use okrt_wire::provider::ollama::OllamaConnector;
use okrt_wire::provider::openai::OpenAiConnector;
use okrt_wire::{ByteStream, ChatRequest, ProviderKind};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::cli::Cli;

/// The assembled application: resolved config plus the engine.
pub struct App {
    config: Config,
    engine: StreamEngine,
}

impl App {
    /// Resolves config from file and flags; flags win.
    pub fn create(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config_file {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(provider) = cli.provider {
            config.provider = provider;
        }
        if let Some(model) = &cli.model {
            config.model = model.clone();
        }
        if let Some(base_url) = &cli.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(key) = &cli.api_key {
            config.api_key = SecretString::new(key.clone());
        }
        if let Some(path) = &cli.audit_log {
            config.audit_log = Some(path.display().to_string());
        }
        if config.model.is_empty() {
            anyhow::bail!("no model configured; pass --model or set one in the config file");
        }

        let mut engine = StreamEngine::new(config.registry())
            .with_raw_capture_limit(config.raw_capture_limit);
        if let Some(path) = &config.audit_log {
            engine = engine.with_recorder(Arc::new(JsonlRecorder::new(path)));
        }

        Ok(Self { config, engine })
    }

    /// Runs one prompt and writes each canonical event as an NDJSON line.
    pub async fn run(&self, prompt: &str) -> Result<()> {
        let request = ChatRequest::from_prompt(prompt);
        let descriptor = RequestDescriptor {
            model: self.config.model.clone(),
            message_count: request.messages.len(),
        };
        info!(provider = %self.config.provider, model = %self.config.model, "opening stream");

        let bytes = self.open_stream(&request).await?;
        let adapter = self.config.provider.adapter();
        let mut events = self.engine.run_session(adapter, descriptor, bytes);
        while let Some(event) = events.next().await {
            println!("{}", event.to_json()?);
        }
        Ok(())
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let key = self.config.api_key.expose_secret().to_string();
        let model = self.config.model.clone();
        let stream = match self.config.provider {
            ProviderKind::Anthropic => {
                let mut connector = AnthropicConnector::new(key, model)?;
                if let Some(url) = &self.config.base_url {
                    connector = connector.with_base_url(url);
                }
                connector.open(request).await?
            }
            ProviderKind::OpenAi => {
                let mut connector = OpenAiConnector::new(key, model)?;
                if let Some(url) = &self.config.base_url {
                    connector = connector.with_base_url(url);
                }
                connector.open(request).await?
            }
            ProviderKind::Ollama => {
                let mut connector = OllamaConnector::new(model)?;
                if let Some(url) = &self.config.base_url {
                    connector = connector.with_base_url(url);
                }
                connector.open(request).await?
            }
            ProviderKind::Gemini => {
                let mut connector = GeminiConnector::new(key, model)?;
                if let Some(url) = &self.config.base_url {
                    connector = connector.with_base_url(url);
                }
                connector.open(request).await?
            }
        };
        Ok(stream)
    }
}
