use std::sync::Arc;

use gardenlink_api::Channel;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;

use crate::configs::{ClientContext, Settings};
use crate::dispatcher::CommandDispatcher;
use crate::error::{ClientError, Result};
use crate::guard::RouteGuard;
use crate::notify::Notifier;
use crate::services::{AccountService, OutputService, PzemService};
use crate::session::{SessionEvent, SessionStore};
use crate::sync::{Subscription, SyncClient};

pub mod configs;
pub mod dispatcher;
pub mod draft;
pub mod error;
pub mod guard;
pub mod notify;
pub mod reconciler;
pub mod services;
pub mod session;
pub mod stream;
pub mod sync;
pub mod validation;

/// Everything a dashboard screen needs, built once from the settings and
/// sharing one session store and one notification surface.
#[derive(Clone)]
pub struct GardenClient {
    context: Arc<ClientContext>,
    session: SessionStore,
    notifier: Notifier,
    dispatcher: CommandDispatcher,
    sync: SyncClient,
    guard: RouteGuard,
}

impl GardenClient {
    pub fn new(context: ClientContext) -> Self {
        let context = Arc::new(context);
        let session = SessionStore::new();
        let notifier = Notifier::default();
        let dispatcher = CommandDispatcher::new(context.clone(), session.clone(), notifier.clone());
        let sync = SyncClient::new(context.clone(), session.clone());
        let guard = RouteGuard::new(context.guard_matcher.clone());

        Self {
            context,
            session,
            notifier,
            dispatcher,
            sync,
            guard,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(ClientContext::from_settings(settings)?))
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn sync(&self) -> &SyncClient {
        &self.sync
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn account(&self) -> AccountService {
        AccountService::new(self.dispatcher.clone())
    }

    pub fn outputs(&self) -> OutputService {
        OutputService::new(self.dispatcher.clone())
    }

    pub fn pzem(&self) -> PzemService {
        PzemService::new(self.dispatcher.clone())
    }
}

/// Headless monitor: signs in, follows the configured channels and logs every
/// view change until interrupted or the session ends.
pub async fn run(settings: &Arc<Settings>) -> Result<()> {
    let client = GardenClient::from_settings(settings)?;
    let monitor = &settings.monitor;

    match (&monitor.token, &monitor.email, &monitor.password) {
        (Some(token), _, _) => client.session().sign_in(token.clone(), None),
        (None, Some(email), Some(password)) => {
            client.account().login(email, password).await?;
        }
        _ => {
            return Err(ClientError::Config(
                "monitor needs either a token or an email and password".into(),
            ));
        }
    }

    let mut tasks = JoinSet::new();
    for channel in &monitor.channels {
        match channel {
            Channel::Output => {
                let subscription = client.sync().outputs()?;
                tasks.spawn(follow(subscription, |view| {
                    for output in &view.outputs {
                        tracing::info!(id = %output.id, name = %output.name, state = %output.state, mode = %output.mode, "output");
                    }
                }));
            }
            Channel::SessionAccount => {
                let subscription = client.sync().account()?;
                tasks.spawn(follow(subscription, |view| {
                    let now = time::OffsetDateTime::now_utc();
                    for (session, status) in view.statuses(now) {
                        tracing::info!(id = %session.id, device = %session.device, ?status, "session");
                    }
                }));
            }
            Channel::Pzem => {
                let subscription = client.sync().power()?;
                tasks.spawn(follow(subscription, |view| {
                    for (pzem_id, readings) in &view.meters {
                        if let Some(reading) = readings.back() {
                            tracing::info!(%pzem_id, power = reading.power, energy = reading.energy, "power");
                        }
                    }
                }));
            }
            Channel::Logs => {
                let subscription = client.sync().logs()?;
                tasks.spawn(follow(subscription, |view| {
                    if let Some(entry) = view.entries.front() {
                        tracing::info!(id = %entry.id, message = %entry.message, "log");
                    }
                }));
            }
            Channel::SessionId => {
                let subscription = client.sync().session_id()?;
                tasks.spawn(follow(subscription, |view| {
                    tracing::info!(session_id = ?view.session_id, "session id");
                }));
            }
        }
    }

    let mut events = client.session().subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SignedIn) | Err(RecvError::Lagged(_)) => {}
                Ok(event) => {
                    tracing::warn!(?event, "session ended, shutting down");
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    tasks.shutdown().await;
    Ok(())
}

async fn follow<V, F>(subscription: Subscription<V>, mut report: F)
where
    V: Send + Sync + 'static,
    F: FnMut(&V) + Send + 'static,
{
    let channel = subscription.channel();
    let mut view = subscription.view();
    let mut status = subscription.status_changes();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                report(&view.borrow_and_update());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!(%channel, status = ?*status.borrow_and_update(), "connection");
            }
        }
    }

    subscription.close().await;
}
