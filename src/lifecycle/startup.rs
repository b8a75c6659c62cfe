//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Create each source's retry store and transmit gateway
//! - Build the Axum app for every listener (path sources grouped by
//!   bind address)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and stops what already started
//! - Every listener is bound before any of them serves
//! - Serve loops and retry sweeps run under the supervisor

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig, SourceKind, TlsConfig};
use crate::http::HttpServer;
use crate::lifecycle::signals::wait_for_signal;
use crate::lifecycle::supervisor::supervise;
use crate::lifecycle::Shutdown;
use crate::net::load_source_tls;
use crate::resilience::RetryDelivery;
use crate::routing::EndpointRegistry;
use crate::source::{
    Callback, CallbackSource, Callbacks, EndpointSource, PathSource, PathsListener, SourceContext,
    SourceError, Transmitter,
};

/// Time granted to background tasks after shutdown is triggered.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to load TLS material for `{name}`: {error}")]
    Tls {
        name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("failed to bind `{name}` on {address}: {error}")]
    Bind {
        name: String,
        address: String,
        #[source]
        error: std::io::Error,
    },
}

/// Assembles a [`Gateway`] from configuration and application code.
pub struct GatewayBuilder {
    config: GatewayConfig,
    callbacks: Callbacks,
    source_callbacks: HashMap<String, Callbacks>,
    endpoints: EndpointRegistry,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            callbacks: Callbacks::new(),
            source_callbacks: HashMap::new(),
            endpoints: EndpointRegistry::new(),
        }
    }

    /// Callback run for messages of every callbacks or paths source.
    pub fn callback<C: Callback>(mut self, name: impl Into<String>, callback: C) -> Self {
        self.callbacks.push(name, callback);
        self
    }

    /// Callback run only for messages of the source named `source`.
    pub fn source_callback<C: Callback>(
        mut self,
        source: impl Into<String>,
        name: impl Into<String>,
        callback: C,
    ) -> Self {
        self.source_callbacks
            .entry(source.into())
            .or_default()
            .push(name, callback);
        self
    }

    /// Endpoint definitions used by endpoints sources.
    pub fn endpoints(mut self, registry: EndpointRegistry) -> Self {
        self.endpoints = registry;
        self
    }

    fn callbacks_for(&self, source: &str) -> Callbacks {
        let mut callbacks = self.callbacks.clone();
        if let Some(own) = self.source_callbacks.get(source) {
            callbacks.extend(own);
        }
        callbacks
    }

    /// Validate, bind every listener and start serving.
    pub async fn start(self) -> Result<Gateway, StartupError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;

        let mut gateway = Gateway {
            shutdown: Shutdown::new(),
            tasks: JoinSet::new(),
            transmitters: HashMap::new(),
            path_sources: HashMap::new(),
            addresses: HashMap::new(),
        };

        match self.assemble(&mut gateway).await {
            Ok(()) => {
                tracing::info!(
                    sources = self.config.sources.len(),
                    listeners = gateway.addresses.len(),
                    "Gateway started"
                );
                Ok(gateway)
            }
            Err(e) => {
                gateway.shutdown().await;
                Err(e)
            }
        }
    }

    async fn assemble(&self, gateway: &mut Gateway) -> Result<(), StartupError> {
        let config = &self.config;
        let outbound = Duration::from_secs(config.timeouts.outbound_secs);
        let mut apps: Vec<App> = Vec::new();
        let mut shared: BTreeMap<String, (PathsListener, Vec<String>)> = BTreeMap::new();

        for source in &config.sources {
            let retry = RetryDelivery::new(source.retry_path(), config.retries.clone(), outbound)
                .map_err(SourceError::from)?;
            let retry = Arc::new(retry);
            gateway.spawn_retry_sweep(&source.name, retry.clone());
            gateway
                .transmitters
                .insert(source.name.clone(), Arc::new(Transmitter::new(source, retry)));

            if !source.enable_processing {
                tracing::info!(source = %source.name, "Processing disabled, source only transmits");
                continue;
            }

            let callbacks = self.callbacks_for(&source.name);
            match source.kind {
                SourceKind::Callbacks => {
                    let context = SourceContext::new(source, config, "callbacks")?;
                    apps.push(App {
                        name: source.name.clone(),
                        sources: vec![source.name.clone()],
                        address: source.bind_address(),
                        tls: source.tls.clone(),
                        router: CallbackSource::new(context, callbacks).into_router(),
                    });
                }
                SourceKind::Endpoints => {
                    let context = SourceContext::new(source, config, "endpoints")?;
                    let router = self.endpoints.build(&config.endpoints).map_err(SourceError::from)?;
                    tracing::info!(source = %source.name, endpoints = router.len(), "Endpoint router built");
                    apps.push(App {
                        name: source.name.clone(),
                        sources: vec![source.name.clone()],
                        address: source.bind_address(),
                        tls: source.tls.clone(),
                        router: EndpointSource::new(context, Arc::new(router)).into_router(),
                    });
                }
                SourceKind::Paths => {
                    let address = source.bind_address();
                    let (listener, names) = shared
                        .entry(address.clone())
                        .or_insert_with(|| (PathsListener::new(address, config), Vec::new()));
                    let path_source = Arc::new(listener.register(source)?);
                    names.push(source.name.clone());

                    if !callbacks.is_empty() {
                        gateway
                            .tasks
                            .spawn(path_source.clone().run(callbacks, gateway.shutdown.subscribe()));
                    }
                    gateway.path_sources.insert(source.name.clone(), path_source);
                }
            }
        }

        for (address, (listener, names)) in shared {
            apps.push(App {
                name: format!("paths@{address}"),
                sources: names,
                address,
                tls: listener.tls().cloned(),
                router: listener.into_router(),
            });
        }

        let mut bound = Vec::with_capacity(apps.len());
        for app in apps {
            let mut server = HttpServer::new(app.name.clone(), app.router);
            if let Some(tls) = &app.tls {
                let tls = load_source_tls(tls).await.map_err(|error| StartupError::Tls {
                    name: app.name.clone(),
                    error,
                })?;
                server = server.with_tls(tls);
            }
            let listener = HttpServer::bind(&app.address)
                .await
                .map_err(|error| StartupError::Bind {
                    name: app.name.clone(),
                    address: app.address.clone(),
                    error,
                })?;
            let local = listener.local_addr().map_err(|error| StartupError::Bind {
                name: app.name.clone(),
                address: app.address.clone(),
                error,
            })?;
            for name in &app.sources {
                gateway.addresses.insert(name.clone(), local);
            }
            bound.push((server, listener, app.address));
        }

        for (server, listener, address) in bound {
            gateway.spawn_server(server, listener, address);
        }
        Ok(())
    }
}

/// One listener to bind: a source's own app or a shared paths app.
struct App {
    name: String,
    sources: Vec<String>,
    address: String,
    tls: Option<TlsConfig>,
    router: Router,
}

/// Running gateway: listeners, retry sweeps and path-source consumers.
#[derive(Debug)]
pub struct Gateway {
    shutdown: Shutdown,
    tasks: JoinSet<()>,
    transmitters: HashMap<String, Arc<Transmitter>>,
    path_sources: HashMap<String, Arc<PathSource>>,
    addresses: HashMap<String, SocketAddr>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Transmit gateway of the source named `source`.
    pub fn transmitter(&self, source: &str) -> Option<Arc<Transmitter>> {
        self.transmitters.get(source).cloned()
    }

    /// Queue consumer of the path source named `source`.
    pub fn path_source(&self, source: &str) -> Option<Arc<PathSource>> {
        self.path_sources.get(source).cloned()
    }

    /// Address the source's listener is bound to.
    pub fn local_addr(&self, source: &str) -> Option<SocketAddr> {
        self.addresses.get(source).copied()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until SIGINT/SIGTERM, then shut down.
    pub async fn wait(self) {
        wait_for_signal().await;
        self.shutdown().await;
    }

    /// Stop accepting, let in-flight work drain and join every task.
    pub async fn shutdown(mut self) {
        tracing::info!("Gateway shutting down");
        self.shutdown.trigger();

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Background task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = self.tasks.len(), "Shutdown grace period elapsed, aborting tasks");
            self.tasks.abort_all();
        }
        tracing::info!("Shutdown complete");
    }

    fn spawn_retry_sweep(&mut self, source: &str, retry: Arc<RetryDelivery>) {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(supervise(
            format!("retry:{source}"),
            self.shutdown.clone(),
            move || {
                let retry = retry.clone();
                let stop = shutdown.subscribe();
                let stopped = shutdown.is_triggered();
                async move {
                    if !stopped {
                        retry.run(stop).await;
                    }
                    Ok::<(), Infallible>(())
                }
            },
        ));
    }

    fn spawn_server(&mut self, server: HttpServer, listener: TcpListener, address: String) {
        let shutdown = self.shutdown.clone();
        let mut prebound = Some(listener);
        self.tasks.spawn(supervise(
            format!("listener:{}", server.name()),
            self.shutdown.clone(),
            move || {
                let server = server.clone();
                let address = address.clone();
                let listener = prebound.take();
                let stop = shutdown.subscribe();
                let stopped = shutdown.is_triggered();
                async move {
                    if stopped {
                        return Ok(());
                    }
                    let listener = match listener {
                        Some(listener) => listener,
                        None => HttpServer::bind(&address).await?,
                    };
                    server.run(listener, stop).await
                }
            },
        ));
    }
}
