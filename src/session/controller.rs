use super::config::SessionConfig;
use super::session::{Progress, RecordingSession, SessionEvent};
use super::stats::SessionStats;
use crate::codec::{list_supported_options, CodecOption};
use crate::messages::{InboundMessage, OutboundMessage};
use crate::settings::{Settings, PERSISTED_KEYS};
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Commands understood by the controller task
#[derive(Debug)]
pub enum Command {
    Start,
    Stop,
    QueryRunning(oneshot::Sender<bool>),
    QueryCodecs(oneshot::Sender<Vec<CodecOption>>),
    QueryStats(oneshot::Sender<Option<SessionStats>>),
    UpdateSettings(Map<String, Value>),
}

/// Owns the single session slot.
///
/// Runs as one task: commands and session events are handled one at a
/// time, so chunk writes never overlap and no lock guards the slot.
pub struct SessionController {
    config: SessionConfig,
    settings: Settings,
    session: Option<RecordingSession>,
    fallback_name: String,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<OutboundMessage>,
}

/// Cloneable client of a running [`SessionController`]
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<OutboundMessage>,
}

impl SessionController {
    /// Seed settings from the store and spawn the controller task
    pub async fn spawn(config: SessionConfig) -> Result<ControllerHandle> {
        let settings = Settings::seed_from(config.store.as_ref()).await?;
        Ok(Self::spawn_with_settings(config, settings))
    }

    pub fn spawn_with_settings(config: SessionConfig, settings: Settings) -> ControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(64);

        let controller = Self {
            config,
            settings,
            session: None,
            fallback_name: random_name(),
            commands: command_rx,
            events: event_tx.clone(),
        };
        tokio::spawn(controller.run());

        ControllerHandle {
            commands: command_tx,
            events: event_tx,
        }
    }

    async fn run(mut self) {
        info!("Session controller started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_event(&mut self.session) => self.handle_session_event(event).await,
            }
        }

        if let Some(mut session) = self.session.take() {
            info!("Controller shutting down, stopping active session");
            session.set_force_stop();
            session.stop_and_drain(self.config.drain_timeout).await;
            self.complete(session).await;
        }

        info!("Session controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                if let Some(mut previous) = self.session.take() {
                    info!("Superseding active session");
                    previous.stop_and_drain(self.config.drain_timeout).await;
                    self.complete(previous).await;
                }
                self.begin_session().await;
            }
            Command::Stop => match self.session.as_mut() {
                Some(session) => {
                    info!("Stop requested");
                    session.set_force_stop();
                    session.request_stop().await;
                }
                None => debug!("Stop requested with no active session"),
            },
            Command::QueryRunning(reply) => {
                let _ = reply.send(self.session.is_some());
            }
            Command::QueryCodecs(reply) => {
                let _ = reply.send(list_supported_options(self.config.probe.as_ref()));
            }
            Command::QueryStats(reply) => {
                let _ = reply.send(self.session.as_ref().map(RecordingSession::stats));
            }
            Command::UpdateSettings(partial) => {
                debug!("Updating settings: {:?}", partial.keys().collect::<Vec<_>>());
                let persisted: Map<String, Value> = partial
                    .iter()
                    .filter(|(key, _)| PERSISTED_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                self.settings.merge(partial);

                if !persisted.is_empty() {
                    if let Err(e) = self.config.store.set(persisted).await {
                        warn!("Failed to persist settings: {:#}", e);
                    }
                }
            }
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.handle(event).await == Progress::Running {
            return;
        }

        if let Some(session) = self.session.take() {
            if self.complete(session).await {
                info!("Source still playing, restarting capture");
                self.begin_session().await;
            }
        }
    }

    async fn begin_session(&mut self) {
        match RecordingSession::begin(&self.config, &self.settings, &self.fallback_name).await {
            Ok(Some(session)) => {
                self.session = Some(session);
                self.push(OutboundMessage::Running(true));
            }
            Ok(None) => debug!("Nothing to record"),
            Err(e) => error!("Failed to start recording session: {:#}", e),
        }
    }

    /// Finalize a stopped session and report it. Returns whether capture
    /// should restart.
    async fn complete(&mut self, session: RecordingSession) -> bool {
        let completion = session.finish().await;
        self.fallback_name = random_name();
        self.push(OutboundMessage::Running(false));
        completion.restart
    }

    fn push(&self, message: OutboundMessage) {
        if self.events.send(message).is_err() {
            debug!("No listeners for controller events");
        }
    }
}

async fn next_event(session: &mut Option<RecordingSession>) -> SessionEvent {
    match session {
        Some(session) => session.next_event().await,
        None => std::future::pending().await,
    }
}

fn random_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ControllerHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn is_running(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::QueryRunning(tx)).await?;
        rx.await.map_err(|_| anyhow!("Session controller dropped the query"))
    }

    pub async fn available_codecs(&self) -> Result<Vec<CodecOption>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::QueryCodecs(tx)).await?;
        rx.await.map_err(|_| anyhow!("Session controller dropped the query"))
    }

    pub async fn stats(&self) -> Result<Option<SessionStats>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::QueryStats(tx)).await?;
        rx.await.map_err(|_| anyhow!("Session controller dropped the query"))
    }

    /// Applies to the next session start, not the active one
    pub async fn update_settings(&self, partial: Map<String, Value>) -> Result<()> {
        self.send(Command::UpdateSettings(partial)).await
    }

    /// `running` pushes
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.events.subscribe()
    }

    /// Dispatch a raw channel message; queries yield their response
    pub async fn handle_message(&self, message: InboundMessage) -> Result<Option<OutboundMessage>> {
        match message {
            InboundMessage::Start => self.start().await.map(|_| None),
            InboundMessage::Stop => self.stop().await.map(|_| None),
            InboundMessage::Running => Ok(Some(OutboundMessage::Running(self.is_running().await?))),
            InboundMessage::GetAvailableCodecs => Ok(Some(OutboundMessage::AvailableCodecs(
                self.available_codecs().await?,
            ))),
            InboundMessage::UpdateFields { content } => self.update_settings(content).await.map(|_| None),
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Session controller is not running"))
    }
}
