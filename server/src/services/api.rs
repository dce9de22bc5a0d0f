use actix_web::{dev::ServerHandle, middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use async_trait::async_trait;
use bootstrap::{Export, ServiceContext, ServiceDescriptor, ServiceError, ServiceHandler};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::accounts::{AccountManager, BcryptHasher};
use crate::config::ApiSettings;
use crate::db::SharedStore;
use crate::handlers;
use crate::middleware::{AuthenticationGateway, RateLimiter};
use crate::session::SessionRegistry;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a started API service accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub local_addr: SocketAddr,
    pub base_url: String,
}

struct Running {
    handle: ServerHandle,
    server: JoinHandle<std::io::Result<()>>,
    background: Vec<JoinHandle<()>>,
    endpoint: ApiEndpoint,
}

/// `api::http`: the account/session HTTP API on top of a store service.
pub struct ApiService {
    name: String,
    settings: ApiSettings,
    accounts: Option<AccountManager>,
    running: Option<Running>,
}

impl ApiService {
    pub fn from_descriptor(descriptor: &ServiceDescriptor) -> Result<Self, ServiceError> {
        let settings: ApiSettings = descriptor.settings()?;
        if !descriptor.depends_on.contains(&settings.store) {
            return Err(ServiceError::Config(format!(
                "service `{}` uses store `{}` but does not list it in depends_on",
                descriptor.name, settings.store
            )));
        }
        if let Some(rate_limit) = &settings.rate_limit {
            rate_limit.validate().map_err(|reason| {
                ServiceError::Config(format!("service `{}`: {}", descriptor.name, reason))
            })?;
        }

        Ok(Self {
            name: descriptor.name.clone(),
            settings,
            accounts: None,
            running: None,
        })
    }

    fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = (self.settings.host.as_str(), self.settings.port);
        TcpListener::bind(addr).with_context(|| {
            format!(
                "cannot bind {}:{}",
                self.settings.host, self.settings.port
            )
        })
    }
}

#[async_trait]
impl ServiceHandler for ApiService {
    async fn initialize(&mut self, ctx: &ServiceContext) -> Result<(), ServiceError> {
        let store: SharedStore = ctx.dependency(&self.settings.store)?;
        let sessions = SessionRegistry::new(self.settings.session_ttl());
        let hasher = Arc::new(BcryptHasher::new(self.settings.bcrypt_cost));

        let accounts =
            AccountManager::new(store, hasher, sessions, self.settings.store_timeout())
                .context("failed to prepare account manager")?;

        match self.settings.session_ttl() {
            Some(ttl) => log::info!("Session expiry set to {:?}", ttl),
            None => log::info!("Sessions do not expire"),
        }

        self.accounts = Some(accounts);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ServiceError> {
        let accounts = self.accounts.clone().ok_or_else(|| {
            ServiceError::Other(anyhow::anyhow!("service `{}` is not initialized", self.name))
        })?;
        let sessions = accounts.sessions().clone();
        let gateway = AuthenticationGateway::new(sessions.clone());
        let limiter = self.settings.rate_limit.as_ref().map(RateLimiter::from_settings);

        let accounts_data = web::Data::new(accounts);
        let sessions_data = web::Data::new(sessions.clone());
        let gateway_data = web::Data::new(gateway);
        let limiter_data = limiter.clone().map(web::Data::new);

        let server = HttpServer::new(move || {
            let app = App::new()
                .app_data(accounts_data.clone())
                .app_data(sessions_data.clone())
                .app_data(gateway_data.clone());
            let app = match &limiter_data {
                Some(limiter) => app.app_data(limiter.clone()),
                None => app,
            };

            app.configure(handlers::configure)
                .wrap(Logger::default())
        })
        .disable_signals();

        let listener = self.bind()?;
        let local_addr = listener.local_addr().context("listener has no address")?;

        let (server, scheme) = match &self.settings.tls {
            Some(tls) => {
                let config = tls.server_config()?;
                let server = server
                    .listen_rustls_0_23(listener, config)
                    .context("failed to attach TLS listener")?;
                (server, "https")
            }
            None => (
                server.listen(listener).context("failed to attach listener")?,
                "http",
            ),
        };
        let server = server.run();
        let handle = server.handle();

        let endpoint = ApiEndpoint {
            local_addr,
            base_url: format!("{}://{}", scheme, local_addr),
        };
        log::info!("Starting HTTP server at {}...", endpoint.base_url);

        let mut background = Vec::new();
        background.push(tokio::spawn(async move {
            let mut interval = time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = sessions.cleanup_expired();
                if removed > 0 {
                    log::info!("Background cleanup: removed {} expired sessions", removed);
                }
            }
        }));

        if let Some(limiter) = limiter {
            background.push(tokio::spawn(async move {
                let mut interval = time::interval(limiter.window());
                loop {
                    interval.tick().await;
                    limiter.cleanup_old_entries();
                    log::debug!("Background cleanup: cleaned rate limiter entries");
                }
            }));
        }

        self.running = Some(Running {
            handle,
            server: tokio::spawn(server),
            background,
            endpoint,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServiceError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        for task in &running.background {
            task.abort();
        }

        log::info!("Stopping HTTP server at {}", running.endpoint.base_url);
        running.handle.stop(true).await;

        match time::timeout(GRACEFUL_STOP_TIMEOUT, running.server).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(anyhow::Error::from(err)
                .context("HTTP server exited with an error")
                .into()),
            Ok(Err(err)) => Err(anyhow::Error::from(err)
                .context("HTTP server task panicked")
                .into()),
            Err(_) => Err(ServiceError::Timeout(GRACEFUL_STOP_TIMEOUT)),
        }
    }

    fn export(&self) -> Option<Export> {
        self.running
            .as_ref()
            .map(|running| Arc::new(running.endpoint.clone()) as Export)
    }
}
