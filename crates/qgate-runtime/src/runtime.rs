//! Bot orchestration.
//!
//! [`BotRuntime`] wires configuration into the shared pieces (one
//! [`HttpClient`] with its [`RequestQueue`], one [`EventDispatcher`], one
//! [`StopHandle`]) and runs one [`GatewayConnection`] per shard until a
//! shutdown signal or a fatal gateway error.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use qgate_runtime::BotRuntime;
//! use qgate_core::{Callback, Event, EventKind};
//!
//! let runtime = BotRuntime::builder()
//!     .config_file("qgate.toml")
//!     .on(EventKind::Message, Callback::sync(|event: Event| {
//!         tracing::info!(content = ?event.content(), "Got a message");
//!         Ok(())
//!     }))
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use qgate_core::{
    BotIdentity, Callback, Event, EventDispatcher, EventKind, IdentitySource, MessageTreater,
    Scheduler, StopHandle,
};
use qgate_transport::{GatewayConnection, HttpClient, RequestQueue, create_gateway};
use tokio::runtime::Handle;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ConfigLoader, QgateConfig, validate_config, validate_shard_plan};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// A configured bot, ready to connect.
pub struct BotRuntime {
    config: QgateConfig,
    http: HttpClient,
    dispatcher: Arc<EventDispatcher>,
    stop: StopHandle,
}

impl BotRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The validated configuration.
    pub fn config(&self) -> &QgateConfig {
        &self.config
    }

    /// The shared REST client.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// A handle that stops every shard when triggered.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Requests shutdown of every shard.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Resolves the gateway URL and total shard count.
    ///
    /// A configured URL is used as-is. Otherwise `GET /gateway/bot` supplies
    /// the URL and, unless `bot.shard_total` is set, the shard count.
    pub async fn resolve_gateway(&self) -> RuntimeResult<(String, u32)> {
        let bot = &self.config.bot;
        if let Some(url) = &bot.gateway_url {
            return Ok((url.clone(), bot.shard_total.unwrap_or(1)));
        }
        let info = self.http.gateway_info().await?;
        Ok((info.url, bot.shard_total.unwrap_or(info.shards).max(1)))
    }

    fn connections(&self, url: &str, shard_total: u32) -> RuntimeResult<Vec<GatewayConnection>> {
        let intents = self.config.bot.parsed_intents()?;
        let token = self.http.config().authorization();
        let identity: Arc<dyn IdentitySource> = Arc::new(self.http.clone());

        self.config
            .bot
            .shard_plan(shard_total)
            .into_iter()
            .map(|shard| {
                let config = self.config.gateway.to_gateway_config(
                    url,
                    token.clone(),
                    intents,
                    shard,
                    shard_total,
                );
                create_gateway(
                    config,
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&identity),
                    self.stop.clone(),
                )
                .map_err(|source| RuntimeError::Gateway { shard, source })
            })
            .collect()
    }

    /// Runs until Ctrl+C, SIGTERM or a fatal gateway error.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes or a fatal gateway error.
    ///
    /// A fatal error on any shard stops every shard and is returned once
    /// they have all finished. `bot.shards` is checked against the resolved
    /// shard total before anything connects.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let (url, shard_total) = self.resolve_gateway().await?;
        validate_shard_plan(&self.config.bot, shard_total)?;
        let connections = self.connections(&url, shard_total)?;
        info!(
            url = %url,
            shard_total,
            shards = connections.len(),
            "Starting gateway connections"
        );

        let handle = self.dispatcher.scheduler().handle();
        let mut tasks = JoinSet::new();
        for mut connection in connections {
            let shard = connection.config().shard_index;
            let span = info_span!("shard", shard, total = shard_total);
            tasks.spawn_on(
                async move { (shard, connection.run().await) }.instrument(span),
                handle,
            );
        }

        let mut failure = None;
        let mut shutdown_seen = false;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown, if !shutdown_seen => {
                    shutdown_seen = true;
                    info!("Shutdown requested, stopping gateway connections");
                    self.stop.stop();
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((shard, Ok(())))) => {
                        debug!(shard, "Gateway connection finished");
                    }
                    Some(Ok((shard, Err(source)))) => {
                        error!(shard, error = %source, fatal = source.is_fatal(), "Gateway connection failed, stopping bot");
                        self.stop.stop();
                        failure.get_or_insert(RuntimeError::Gateway { shard, source });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Gateway task aborted, stopping bot");
                        self.stop.stop();
                    }
                },
            }
        }

        self.shutdown();
        failure.map_or(Ok(()), Err)
    }

    fn shutdown(&self) {
        self.http.close();
        self.dispatcher.scheduler().workers().close();
        info!("Bot stopped");
    }
}

impl std::fmt::Debug for BotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotRuntime")
            .field("app_id", &self.config.bot.app_id)
            .field("http", &self.http)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, only Ctrl+C will stop the bot");
            }
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`BotRuntime`].
pub struct RuntimeBuilder {
    config: Option<QgateConfig>,
    loader: ConfigLoader,
    callbacks: Vec<(EventKind, Callback<Event>)>,
    on_start: Option<Callback<BotIdentity>>,
    treater: Option<Arc<dyn MessageTreater>>,
    stop: Option<StopHandle>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Creates a builder that loads configuration from the default locations.
    pub fn new() -> Self {
        Self {
            config: None,
            loader: ConfigLoader::new(),
            callbacks: Vec::new(),
            on_start: None,
            treater: None,
            stop: None,
            init_logging: true,
        }
    }

    /// Uses an already loaded configuration instead of the loader.
    pub fn config(mut self, config: QgateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads configuration from a specific file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Selects the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Registers the callback for one event category.
    pub fn on(mut self, kind: EventKind, callback: Callback<Event>) -> Self {
        self.callbacks.push((kind, callback));
        self
    }

    /// Registers the startup callback, run once with the bot's identity.
    pub fn on_start(mut self, callback: Callback<BotIdentity>) -> Self {
        self.on_start = Some(callback);
        self
    }

    /// Replaces the message treater.
    pub fn treater(mut self, treater: impl MessageTreater + 'static) -> Self {
        self.treater = Some(Arc::new(treater));
        self
    }

    /// Shares an existing stop handle instead of creating one.
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Whether `build` installs the global subscriber (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Loads and validates configuration, then builds the shared components.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> RuntimeResult<BotRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let handle =
            Handle::try_current().map_err(|e| RuntimeError::NoAsyncRuntime(e.to_string()))?;
        let scheduler = Scheduler::new(handle.clone(), config.bot.max_workers);
        let queue = RequestQueue::new(handle, config.http.max_concurrency);
        let http = HttpClient::new(config.http.to_http_config(&config.bot), queue);

        let mut dispatcher =
            EventDispatcher::builder(scheduler).options(config.bot.dispatch_options());
        for (kind, callback) in self.callbacks {
            dispatcher = dispatcher.on(kind, callback);
        }
        if let Some(callback) = self.on_start {
            dispatcher = dispatcher.on_start(callback);
        }
        if let Some(treater) = self.treater {
            dispatcher = dispatcher.treater(treater);
        }
        let dispatcher = Arc::new(dispatcher.build());

        info!(
            app_id = %config.bot.app_id,
            sandbox = config.bot.sandbox,
            callbacks = dispatcher.registered().count(),
            max_workers = config.bot.max_workers,
            max_concurrency = config.http.max_concurrency,
            "Bot runtime initialized"
        );

        Ok(BotRuntime {
            config,
            http,
            dispatcher,
            stop: self.stop.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> QgateConfig {
        let mut config = QgateConfig::default();
        config.bot.app_id = "1001".into();
        config.bot.token = "secret".into();
        config
    }

    fn runtime(config: QgateConfig) -> BotRuntime {
        BotRuntime::builder()
            .config(config)
            .init_logging(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = config();
        config.bot.token.clear();
        let err = BotRuntime::builder()
            .config(config)
            .init_logging(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::MissingField("bot.token"))));
    }

    #[test]
    fn build_requires_tokio() {
        let err = BotRuntime::builder()
            .config(config())
            .init_logging(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NoAsyncRuntime(_)));
    }

    #[tokio::test]
    async fn configured_gateway_skips_discovery() {
        let mut config = config();
        config.bot.gateway_url = Some("wss://gateway.example/ws".into());
        let runtime = runtime(config);

        let (url, total) = runtime.resolve_gateway().await.unwrap();
        assert_eq!(url, "wss://gateway.example/ws");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn gateway_is_discovered_over_rest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .and(header("authorization", "Bot 1001.secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "wss://gateway.example/ws",
                "shards": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config();
        config.http.base_url = Some(server.uri());
        let runtime = runtime(config);

        let (url, total) = runtime.resolve_gateway().await.unwrap();
        assert_eq!(url, "wss://gateway.example/ws");
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn one_connection_per_planned_shard() {
        let mut config = config();
        config.bot.shards = vec![0, 2];
        let runtime = runtime(config);

        let connections = runtime.connections("ws://127.0.0.1:1", 3).unwrap();
        let shards: Vec<_> = connections
            .iter()
            .map(|c| (c.config().shard_index, c.config().shard_total))
            .collect();
        assert_eq!(shards, vec![(0, 3), (2, 3)]);
        assert!(
            connections
                .iter()
                .all(|c| c.config().token == "Bot 1001.secret")
        );
    }

    #[tokio::test]
    async fn shard_outside_configured_gateway_total_is_rejected() {
        let mut config = config();
        config.bot.gateway_url = Some("ws://127.0.0.1:1".into());
        config.bot.shards = vec![3];
        let runtime = runtime(config);

        let err = runtime.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::Invalid { field: "bot.shards", .. })
        ));
    }

    #[tokio::test]
    async fn shard_outside_discovered_total_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "ws://127.0.0.1:1",
                "shards": 2
            })))
            .mount(&server)
            .await;

        let mut config = config();
        config.http.base_url = Some(server.uri());
        config.bot.shards = vec![1, 2];
        let runtime = runtime(config);

        let err = runtime.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::Invalid { field: "bot.shards", .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_stops_reconnecting_shards() {
        let mut config = config();
        config.bot.gateway_url = Some("ws://127.0.0.1:1".into());
        config.bot.shard_total = Some(2);
        config.gateway.reconnect_delay_ms = 60_000;
        let runtime = runtime(config);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            runtime.run_until(tokio::time::sleep(Duration::from_millis(100))),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
        assert!(runtime.stop_handle().is_stopped());
        assert!(!runtime.http().is_open());
    }
}
