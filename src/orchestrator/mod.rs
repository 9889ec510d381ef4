//! Orchestrator handle
//!
//! [`OrchestratorBuilder`] wires the collaborators, [`Orchestrator::start`]
//! spawns the single worker task. Everything else on the handle is safe to
//! call from any thread while the loop runs: gate toggles are atomic writes
//! and amulet queries read the latest published snapshot.

pub mod context;
pub mod health;
mod worker;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bot::{AmuletAdvisor, Automation, BotFactory};
use crate::client::{EventCollector, MessageRouter};
use crate::config::{Gate, Gates, Settings};
use crate::error::{Error, Result};
use crate::protocol::{frame_channel, ProtocolParser};
use crate::state::{AmuletAction, AmuletMeta, AmuletState, TileSymbols};
use crate::subsystem::{Frontend, Injector, Interceptor};

pub use context::{LoopContext, LoopStatus, Shared};
pub use health::{ErrorState, FpsCounter};

use worker::Worker;

/// Point-in-time view of the orchestrator for display layers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub lobby_flow: Option<String>,
    pub game_flow: Option<String>,
    pub in_game: bool,
    pub amulet_active: bool,
    pub frames: u64,
    pub fps: f64,
    pub fatal_error: Option<String>,
    pub game_error: Option<String>,
}

pub struct OrchestratorBuilder {
    settings: Settings,
    interceptor: Box<dyn Interceptor>,
    parser: Box<dyn ProtocolParser>,
    injector: Option<Box<dyn Injector>>,
    frontend: Option<Box<dyn Frontend>>,
    automation: Option<Box<dyn Automation>>,
    bot_factory: Option<Box<dyn BotFactory>>,
    advisor: Option<Box<dyn AmuletAdvisor>>,
    symbols: Option<Arc<dyn TileSymbols>>,
}

impl OrchestratorBuilder {
    pub fn new(
        settings: Settings,
        interceptor: impl Interceptor + 'static,
        parser: impl ProtocolParser + 'static,
    ) -> Self {
        Self {
            settings,
            interceptor: Box::new(interceptor),
            parser: Box::new(parser),
            injector: None,
            frontend: None,
            automation: None,
            bot_factory: None,
            advisor: None,
            symbols: None,
        }
    }

    pub fn injector(mut self, injector: impl Injector + 'static) -> Self {
        self.injector = Some(Box::new(injector));
        self
    }

    pub fn frontend(mut self, frontend: impl Frontend + 'static) -> Self {
        self.frontend = Some(Box::new(frontend));
        self
    }

    /// UI automation; defaults to an [`EventCollector`]
    pub fn automation(mut self, automation: impl Automation + 'static) -> Self {
        self.automation = Some(Box::new(automation));
        self
    }

    pub fn bot_factory(mut self, factory: impl BotFactory + 'static) -> Self {
        self.bot_factory = Some(Box::new(factory));
        self
    }

    pub fn advisor(mut self, advisor: impl AmuletAdvisor + 'static) -> Self {
        self.advisor = Some(Box::new(advisor));
        self
    }

    /// Symbol table for the amulet text views; defaults to the settings' style
    pub fn symbols(mut self, symbols: Arc<dyn TileSymbols>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn build(self) -> Orchestrator {
        let shared = Arc::new(Shared::new(Gates::from_settings(&self.settings)));
        let automation = self
            .automation
            .unwrap_or_else(|| Box::new(EventCollector::new()));
        let mut ctx = LoopContext::new(shared.clone(), automation)
            .with_idle_intensity(self.settings.idle_intensity);
        ctx.advisor = self.advisor;

        let (frames_tx, frames_rx) = frame_channel();
        let (amulet_tx, amulet_rx) = watch::channel(Arc::new(AmuletState::new()));
        let symbols = self
            .symbols
            .unwrap_or_else(|| self.settings.tile_style.symbols());

        let worker = Worker {
            ctx,
            router: MessageRouter::new(),
            parser: self.parser,
            frames_tx,
            frames_rx,
            interceptor: self.interceptor,
            injector: self.injector,
            frontend: self.frontend,
            bot_factory: self.bot_factory,
            settings: self.settings,
            amulet_tx,
            fps: FpsCounter::default(),
            frames: 0,
        };

        Orchestrator {
            shared,
            amulet_rx,
            symbols,
            worker: Mutex::new(Some(worker)),
            handle: Mutex::new(None),
        }
    }
}

/// Handle to the orchestration loop
pub struct Orchestrator {
    shared: Arc<Shared>,
    amulet_rx: watch::Receiver<Arc<AmuletState>>,
    symbols: Arc<dyn TileSymbols>,
    worker: Mutex<Option<Worker>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Spawn the worker on the current tokio runtime. Can be called once.
    pub fn start(&self) -> Result<()> {
        let worker = self.worker.lock().take().ok_or(Error::AlreadyStarted)?;
        self.shared.set_running(true);
        *self.handle.lock() = Some(tokio::spawn(worker.run()));
        info!("orchestrator started");
        Ok(())
    }

    /// Ask the loop to stop after its current iteration
    pub fn stop(&self) {
        debug!("orchestrator stop requested");
        self.shared.request_stop();
    }

    /// Wait for the worker to finish. A panic is recorded as the fatal error.
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                self.shared.errors.set_fatal(Error::WorkerPanicked(e.to_string()));
                self.shared.set_running(false);
            }
        }
    }

    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn enable_overlay(&self) {
        self.shared.gates.set(Gate::OVERLAY, true);
    }

    pub fn disable_overlay(&self) {
        self.shared.gates.set(Gate::OVERLAY, false);
    }

    pub fn enable_automation(&self) {
        self.shared.gates.set(Gate::AUTOMATION, true);
    }

    pub fn disable_automation(&self) {
        self.shared.gates.set(Gate::AUTOMATION, false);
    }

    pub fn enable_autojoin(&self) {
        self.shared.gates.set(Gate::AUTO_JOIN, true);
    }

    pub fn disable_autojoin(&self) {
        self.shared.gates.set(Gate::AUTO_JOIN, false);
    }

    /// Rebuild the bot once no game is running
    pub fn request_bot_update(&self) {
        self.shared.gates.set(Gate::BOT_UPDATE, true);
    }

    /// Restart interception and injection once the frontend is closed
    pub fn request_subsystem_restart(&self) {
        self.shared.gates.set(Gate::SUBSYSTEM_RESTART, true);
    }

    pub fn gates(&self) -> Gate {
        self.shared.gates.snapshot()
    }

    pub fn fatal_error(&self) -> Option<Error> {
        self.shared.errors.fatal()
    }

    pub fn game_error(&self) -> Option<Error> {
        self.shared.errors.game()
    }

    pub fn lobby_flow(&self) -> Option<String> {
        self.shared.status.read().lobby_flow.clone()
    }

    pub fn game_flow(&self) -> Option<String> {
        self.shared.status.read().game_flow.clone()
    }

    pub fn is_in_game(&self) -> bool {
        self.shared.status.read().in_game
    }

    /// Latest amulet state published by the loop
    pub fn amulet_snapshot(&self) -> Arc<AmuletState> {
        self.amulet_rx.borrow().clone()
    }

    pub fn is_amulet_active(&self) -> bool {
        self.amulet_snapshot().is_active()
    }

    pub fn amulet_meta(&self) -> Option<AmuletMeta> {
        self.amulet_snapshot().meta()
    }

    pub fn amulet_pending_action(&self) -> Option<AmuletAction> {
        self.amulet_snapshot().pending_action()
    }

    pub fn amulet_drawable_text(&self) -> String {
        self.amulet_snapshot().drawable_text(self.symbols.as_ref())
    }

    pub fn amulet_replace_text(&self) -> String {
        self.amulet_snapshot().replace_text(self.symbols.as_ref())
    }

    pub fn amulet_replace_queue(&self) -> Vec<String> {
        self.amulet_snapshot().replace_queue()
    }

    pub fn amulet_replace_cursor(&self) -> usize {
        self.amulet_snapshot().replace_cursor()
    }

    pub fn status(&self) -> StatusReport {
        let status = self.shared.status.read().clone();
        StatusReport {
            running: self.is_running(),
            lobby_flow: status.lobby_flow,
            game_flow: status.game_flow,
            in_game: status.in_game,
            amulet_active: self.is_amulet_active(),
            frames: status.frames,
            fps: status.fps,
            fatal_error: self.fatal_error().map(|e| e.to_string()),
            game_error: self.game_error().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::{json, Value};

    use crate::bot::{Bot, Reaction};
    use crate::client::AutomationEvent;
    use crate::protocol::{DecodedMessage, FrameSender, JsonParser, WireFrame};
    use crate::state::tiles::tests::sample_pool_values;
    use crate::subsystem::ReplayInterceptor;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    #[derive(Default)]
    struct FakeInterceptor {
        frames: Vec<WireFrame>,
        running: Arc<AtomicBool>,
        starts: Arc<AtomicUsize>,
        max_starts: Option<usize>,
        log: Log,
    }

    impl Interceptor for FakeInterceptor {
        fn start(&mut self, tx: FrameSender) -> Result<()> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.max_starts.is_some_and(|max| n > max) {
                return Err(Error::Io("port in use".into()));
            }
            for frame in &self.frames {
                tx.send(frame.clone()).map_err(|_| Error::ChannelClosed)?;
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().push("interceptor");
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    struct FakeInjector {
        running: bool,
        log: Log,
    }

    impl Injector for FakeInjector {
        fn start(&mut self, _process_name: &str, _port: u16) -> Result<()> {
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().push("injector");
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    struct FakeFrontend {
        overlay: Arc<AtomicBool>,
        log: Log,
    }

    impl Frontend for FakeFrontend {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().push("frontend");
        }

        fn is_running(&self) -> bool {
            false
        }

        fn is_page_normal(&self) -> bool {
            true
        }

        fn is_overlay_working(&self) -> bool {
            self.overlay.load(Ordering::SeqCst)
        }

        fn start_overlay(&mut self) -> Result<()> {
            self.overlay.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop_overlay(&mut self) {
            self.overlay.store(false, Ordering::SeqCst);
        }
    }

    struct QuietBot;

    impl Bot for QuietBot {
        fn name(&self) -> &str {
            "quiet"
        }

        fn react(&self, _msg: &DecodedMessage) -> Result<Option<Reaction>> {
            Ok(None)
        }
    }

    struct PanickingAutomation;

    impl Automation for PanickingAutomation {
        fn on_lobby_login(&mut self, _msg: &DecodedMessage) -> Result<()> {
            panic!("login handler blew up");
        }

        fn on_exit_lobby(&mut self) -> Result<()> {
            Ok(())
        }

        fn on_end_game(&mut self) -> Result<()> {
            Ok(())
        }

        fn automate_retry_pending(&mut self, _game: Option<&crate::bot::GameSession>) -> Result<()> {
            Ok(())
        }

        fn decide_lobby_action(&mut self, _auto_join: bool) -> Result<()> {
            Ok(())
        }

        fn automate_idle(&mut self, _intensity: f64) -> Result<()> {
            Ok(())
        }
    }

    fn msg(flow: &str, ty: &str, method: &str, data: Value) -> WireFrame {
        let body = json!({"id": 1, "type": ty, "method": method, "data": data});
        WireFrame::message(flow, serde_json::to_vec(&body).unwrap())
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_replay_end_to_end() {
        let frames = vec![
            WireFrame::start("lobby"),
            msg("lobby", "RESPONSE", ".lq.Lobby.oauth2Login", json!({})),
            msg("lobby", "RESPONSE", ".lq.Lobby.heartbeat", json!({})),
            msg("lobby", "RESPONSE", ".lq.Lobby.fetchAmuletActivityData",
                json!({"data": {"game": {"stage": 2, "round": {"pool": sample_pool_values(), "used": [1, 2, 3]}}}})),
            msg("lobby", "RESPONSE", ".lq.Lobby.amuletActivityOperate",
                json!({"events": [{"valueChanges": {"round": {"desktopRemain": {"dirty": true, "value": 10}}}}]})),
        ];
        let total = frames.len() as u64;
        let collector = EventCollector::new();
        let orchestrator = OrchestratorBuilder::new(
            Settings::default(),
            ReplayInterceptor::from_frames(frames),
            JsonParser,
        )
        .automation(collector.clone())
        .build();

        orchestrator.start().unwrap();
        assert!(orchestrator.is_running());
        wait_until(|| orchestrator.status().frames >= total).await;

        assert_eq!(orchestrator.lobby_flow().as_deref(), Some("lobby"));
        assert!(orchestrator.is_amulet_active());
        assert_eq!(orchestrator.amulet_meta().unwrap().stage, 2);
        assert_eq!(orchestrator.amulet_replace_cursor(), 3);
        assert_eq!(orchestrator.amulet_replace_queue().len(), 49);

        let drawable = orchestrator.amulet_drawable_text();
        let lines: Vec<&str> = drawable.lines().collect();
        assert_eq!(lines[0], "[Drawable 10/36]");
        assert_eq!(lines[1].split(' ').count(), 1);
        assert_eq!(lines[2].split(' ').count(), 9);
        assert!(orchestrator.amulet_replace_text().starts_with("[Replace 3/49]"));

        assert!(matches!(
            collector.events().first(),
            Some(AutomationEvent::LobbyLogin { .. })
        ));

        orchestrator.shutdown().await;
        assert!(!orchestrator.is_running());
        assert!(orchestrator.fatal_error().is_none());
        assert!(matches!(orchestrator.start(), Err(Error::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_teardown_order() {
        let log: Log = Arc::default();
        let settings = Settings { enable_injector: true, ..Settings::default() };
        let orchestrator = OrchestratorBuilder::new(
            settings,
            FakeInterceptor { log: log.clone(), ..Default::default() },
            JsonParser,
        )
        .injector(FakeInjector { running: false, log: log.clone() })
        .frontend(FakeFrontend { overlay: Arc::default(), log: log.clone() })
        .build();

        orchestrator.start().unwrap();
        wait_until(|| orchestrator.status().frames == 0 && orchestrator.shared.status.read().iterations > 0).await;
        orchestrator.shutdown().await;

        assert_eq!(*log.lock(), vec!["frontend", "interceptor", "injector"]);
    }

    #[tokio::test]
    async fn test_overlay_follows_gate() {
        let overlay = Arc::new(AtomicBool::new(false));
        let orchestrator = OrchestratorBuilder::new(Settings::default(), FakeInterceptor::default(), JsonParser)
            .frontend(FakeFrontend { overlay: overlay.clone(), log: Arc::default() })
            .build();

        orchestrator.start().unwrap();
        wait_until(|| overlay.load(Ordering::SeqCst)).await;

        orchestrator.disable_overlay();
        wait_until(|| !overlay.load(Ordering::SeqCst)).await;
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_interception_down_is_game_error() {
        let running = Arc::new(AtomicBool::new(false));
        let collector = EventCollector::new();
        let settings = Settings { enable_automation: true, ..Settings::default() };
        let orchestrator = OrchestratorBuilder::new(
            settings,
            FakeInterceptor { running: running.clone(), ..Default::default() },
            JsonParser,
        )
        .automation(collector.clone())
        .build();

        orchestrator.start().unwrap();
        wait_until(|| collector.lobby_decisions() > 0).await;

        running.store(false, Ordering::SeqCst);
        wait_until(|| matches!(orchestrator.game_error(), Some(Error::InterceptionStopped))).await;
        assert!(orchestrator.is_running());

        let decisions = collector.lobby_decisions();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(collector.lobby_decisions(), decisions);
        assert!(collector.retry_sweeps() > 0);

        running.store(true, Ordering::SeqCst);
        wait_until(|| orchestrator.game_error().is_none()).await;
        orchestrator.shutdown().await;
        assert!(orchestrator.fatal_error().is_none());
    }

    #[tokio::test]
    async fn test_bot_creation_failure_is_game_error() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let factory = move || -> Result<Arc<dyn Bot>> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::collaborator("model", "weights missing"))
            } else {
                Ok(Arc::new(QuietBot))
            }
        };
        let orchestrator = OrchestratorBuilder::new(Settings::default(), FakeInterceptor::default(), JsonParser)
            .bot_factory(factory)
            .build();

        orchestrator.start().unwrap();
        wait_until(|| matches!(orchestrator.game_error(), Some(Error::BotCreation(_)))).await;
        assert!(orchestrator.is_running());
        assert!(!orchestrator.gates().contains(Gate::BOT_UPDATE));

        orchestrator.request_bot_update();
        wait_until(|| orchestrator.game_error().is_none()).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_failure_is_fatal() {
        let log: Log = Arc::default();
        let starts = Arc::new(AtomicUsize::new(0));
        let orchestrator = OrchestratorBuilder::new(
            Settings::default(),
            FakeInterceptor {
                starts: starts.clone(),
                max_starts: Some(1),
                log: log.clone(),
                ..Default::default()
            },
            JsonParser,
        )
        .build();

        orchestrator.start().unwrap();
        wait_until(|| starts.load(Ordering::SeqCst) == 1).await;

        orchestrator.request_subsystem_restart();
        orchestrator.join().await;

        assert!(!orchestrator.is_running());
        assert!(matches!(orchestrator.fatal_error(), Some(Error::SubsystemStart { .. })));
        // stopped once for the restart, once during teardown
        assert_eq!(*log.lock(), vec!["interceptor", "interceptor"]);
    }

    #[tokio::test]
    async fn test_worker_panic_still_tears_down() {
        let log: Log = Arc::default();
        let frames = vec![
            WireFrame::start("lobby"),
            msg("lobby", "RESPONSE", ".lq.Lobby.oauth2Login", json!({})),
        ];
        let orchestrator = OrchestratorBuilder::new(
            Settings::default(),
            FakeInterceptor { frames, log: log.clone(), ..Default::default() },
            JsonParser,
        )
        .automation(PanickingAutomation)
        .build();

        orchestrator.start().unwrap();
        wait_until(|| !orchestrator.is_running()).await;

        match orchestrator.fatal_error() {
            Some(Error::WorkerPanicked(reason)) => assert!(reason.contains("login handler blew up")),
            other => panic!("expected a worker panic, got {:?}", other),
        }
        assert_eq!(*log.lock(), vec!["interceptor"]);
        orchestrator.join().await;
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_frame_error_does_not_stop_loop() {
        let frames = vec![
            WireFrame::start("g1"),
            msg("g1", "REQUEST", ".lq.FastTest.authGame", json!({})),
            // no bot loaded, so the game message fails
            msg("g1", "NOTIFY", ".lq.ActionPrototype", json!({"name": "ActionDiscardTile"})),
            msg("lobby", "RESPONSE", ".lq.Lobby.fetchAmuletActivityData",
                json!({"data": {"game": {"stage": 1, "round": {"pool": sample_pool_values()}}}})),
        ];
        let total = frames.len() as u64;
        let orchestrator = OrchestratorBuilder::new(
            Settings::default(),
            FakeInterceptor { frames, ..Default::default() },
            JsonParser,
        )
        .build();

        orchestrator.start().unwrap();
        wait_until(|| orchestrator.status().frames >= total).await;
        wait_until(|| orchestrator.is_amulet_active()).await;

        assert!(matches!(orchestrator.game_error(), Some(Error::Collaborator { collaborator: "bot", .. })));
        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.status().game_flow.as_deref(), Some("g1"));
        assert_eq!(orchestrator.amulet_replace_queue().len(), 49);

        orchestrator.shutdown().await;
        assert!(orchestrator.fatal_error().is_none());
    }
}
