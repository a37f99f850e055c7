//! Host application - boot sequence, message loop and shutdown

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::application::errors::BotError;
use crate::application::messaging::{Dispatch, MessageDispatcher, MessageParser};
use crate::application::services::{PluginControl, Service, ServiceRegistry, ThrottleService};
use crate::domain::entities::Message;
use crate::domain::traits::BotApi;
use crate::infrastructure::adapters::{ConsoleApi, TelegramApi};
use crate::infrastructure::config::Config;
use crate::infrastructure::plugins::HostModuleLoader;
use crate::plugins::builtin::builtin_loader;
use crate::plugins::{
    AppInfo, Outcomes, PluginManager, PluginManagerOptions, PluginResources, PluginUnit,
    StateChange,
};

const INBOX_CAPACITY: usize = 100;

/// Source of inbound messages and the API used to answer them
enum Frontend {
    Telegram(Arc<TelegramApi>),
    Console(Arc<ConsoleApi>),
}

impl Frontend {
    fn api(&self) -> Arc<dyn BotApi> {
        match self {
            Frontend::Telegram(api) => api.clone() as Arc<dyn BotApi>,
            Frontend::Console(api) => api.clone() as Arc<dyn BotApi>,
        }
    }

    fn start(&self, parser: MessageParser, poll_timeout: u64, sender: mpsc::Sender<Message>) {
        match self {
            Frontend::Telegram(api) => {
                info!("[6] Start long polling loop");
                let api = api.clone();
                tokio::spawn(async move { api.poll(parser, poll_timeout, sender).await });
            }
            Frontend::Console(api) => {
                info!("[6] Start reading console input");
                let api = api.clone();
                tokio::spawn(async move { api.read_lines(parser, sender).await });
            }
        }
    }
}

/// A wired-up host: API client, services and plugins
pub struct App {
    config: Config,
    frontend: Frontend,
    services: Arc<ServiceRegistry>,
    plugins: Arc<PluginManager>,
}

impl App {
    /// Boot step 1: build every component and seed the enable queue
    pub fn setup(config: Config) -> Result<Self, BotError> {
        let frontend = match config.token()? {
            Some(token) => Frontend::Telegram(Arc::new(TelegramApi::new(token))),
            None => Frontend::Console(Arc::new(ConsoleApi::new())),
        };

        let app_info = AppInfo {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            ..AppInfo::default()
        };
        let options = PluginManagerOptions {
            base_path: config.plugins.base_path.clone(),
            names: config.discovery().resolve()?,
            overrides: config.plugin_overrides(),
        };

        let services = Arc::new(ServiceRegistry::new());
        let plugins = PluginManager::new(
            options,
            Arc::new(HostModuleLoader::new(builtin_loader())),
            PluginResources::new(frontend.api(), app_info),
        )
        .with_service_factory(services.clone());
        plugins.enable_later(config.plugins.auto_enabled.as_slice());

        Ok(Self {
            config,
            frontend,
            services,
            plugins: Arc::new(plugins),
        })
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Boot step 2: `getMe`, fatal only with a mandatory handshake
    pub async fn handshake(&self) -> Result<(), BotError> {
        if self.config.api.disable {
            return Ok(());
        }

        info!("[2] Contact Telegram API");
        match self.frontend.api().get_me().await {
            Ok(identity) => {
                info!(" > My user ID is #{}", identity.id);
                info!(" > My username is @{}", identity.username);
                info!(" > My display name is {}", identity.name);
                Ok(())
            }
            Err(e) if self.config.api.mandatory_handshake => {
                error!(" > Starting bot failed at the handshake phase: {}", e);
                Err(e)
            }
            Err(e) => {
                error!(" > API handshake failed: {}", e);
                Ok(())
            }
        }
    }

    /// Boot step 3
    pub fn init_services(&self) {
        let mut services: Vec<Arc<dyn Service>> = Vec::new();
        let throttle = &self.config.throttle;
        if throttle.enabled {
            services.push(Arc::new(
                ThrottleService::new(throttle.max_requests, throttle.window_seconds)
                    .with_exempt(self.config.behavior.admins.clone()),
            ));
        }
        services.push(Arc::new(PluginControl::new(
            self.plugins.clone(),
            self.frontend.api(),
            self.config.behavior.admins.clone(),
            self.config.plugins.auto_enabled.clone(),
        )));

        info!("[3] Load services ({})", services.len());
        for service in services {
            let name = service.name().to_string();
            self.services.register(service);
            info!(" > Loaded service {}", name);
        }
    }

    /// Boot step 4: load every registered plugin
    pub async fn load_plugins(&self) -> Outcomes<Arc<PluginUnit>> {
        info!("[4] Load plugins ({})", self.plugins.get_names().len());
        let outcomes = self.plugins.load(None).await;
        log_outcomes("load", &outcomes);
        outcomes
    }

    /// Boot step 5: enable the queued plugins
    pub async fn enable_plugins(&self) -> Outcomes<StateChange> {
        info!("[5] Enable plugins ({})", self.plugins.get_enable_queue_size());
        let outcomes = self.plugins.enable_queued().await;
        log_outcomes("enable", &outcomes);
        outcomes
    }

    /// Disable every enabled plugin; true when all of them disabled cleanly
    pub async fn shutdown(&self) -> bool {
        let enabled = self.plugins.enabled_names();
        let outcomes = self.plugins.disable(Some(enabled.as_slice())).await;
        log_outcomes("disable", &outcomes);
        outcomes.is_clean()
    }

    async fn interrupt(&self) -> i32 {
        let codes = self.config.exit_codes;
        info!("Interrupt received, initiating shutdown (interrupt again to force)");
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Interrupted twice, force shutdown");
                std::process::exit(codes.forced_interrupt);
            }
        });

        if self.shutdown().await {
            info!("Clean shutdown");
            codes.clean_interrupt
        } else {
            error!("One or more plugins did not disable cleanly");
            codes.dirty_interrupt
        }
    }

    /// Boot steps 6 onwards: start the message source and serve until
    /// interrupted. Returns the process exit code.
    pub async fn serve(self) -> i32 {
        let parser = MessageParser::new(self.config.behavior.command_prefix.clone());
        let dispatcher = MessageDispatcher::new(self.services.clone(), self.plugins.clone())
            .with_allow_private(self.config.behavior.allow_private)
            .with_started_at(Utc::now());

        let (sender, mut inbox) = mpsc::channel(INBOX_CAPACITY);
        self.frontend.start(parser, self.config.api.poll_timeout, sender);
        info!("# Initialization complete #");

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => deliver(&dispatcher, &message),
                    None => {
                        error!("Message source stopped, nothing left to do");
                        self.shutdown().await;
                        return self.config.exit_codes.unexpected_exit;
                    }
                },
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("Failed to listen for interrupt: {}", e);
                    }
                    return self.interrupt().await;
                }
            }
        }
    }
}

/// Run the full boot sequence and serve; returns the process exit code
pub async fn run(config: Config) -> i32 {
    let codes = config.exit_codes;
    info!("# Initializing {} #", AppInfo::default().identifier());
    info!("[1] Setup components and hooks");

    let app = match App::setup(config) {
        Ok(app) => app,
        Err(e) => {
            error!(" > Setup failed: {}", e);
            return codes.bot_start_failed;
        }
    };
    if app.handshake().await.is_err() {
        return codes.bot_start_failed;
    }
    app.init_services();
    // Plugin failures are not fatal
    app.load_plugins().await;
    app.enable_plugins().await;

    app.serve().await
}

fn deliver(dispatcher: &MessageDispatcher, message: &Message) {
    match dispatcher.dispatch(message) {
        Ok(Dispatch::Delivered) => {}
        Ok(other) => debug!("Message {} not delivered: {:?}", message.id, other),
        Err(e) => error!("Failed to dispatch message {}: {}", message.id, e),
    }
}

/// ` > Loaded plugin echo` / ` > Failed to load plugin feed: ...`
fn log_outcomes<T>(operation: &str, outcomes: &Outcomes<T>) {
    let done = match operation {
        "load" => "Loaded",
        "enable" => "Enabled",
        "disable" => "Disabled",
        other => other,
    };
    for (name, result) in outcomes.iter() {
        match result {
            Ok(_) => info!(" > {} plugin {}", done, name),
            Err(e) => error!(" > Failed to {} plugin {}: {}", operation, name, e),
        }
    }
}
