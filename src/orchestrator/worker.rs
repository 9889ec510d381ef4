//! The orchestration loop
//!
//! One task owns all mutable state. Each iteration: count, pre-maintenance,
//! poll one frame without blocking, post-maintenance, publish status. The
//! stop flag is checked once per iteration.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bot::BotFactory;
use crate::client::MessageRouter;
use crate::config::{Gate, Settings};
use crate::error::{Error, Result};
use crate::orchestrator::context::{LoopContext, LoopStatus};
use crate::orchestrator::health::FpsCounter;
use crate::protocol::{FrameReceiver, FrameSender, ProtocolParser};
use crate::state::AmuletState;
use crate::subsystem::{Frontend, Injector, Interceptor};

pub(crate) struct Worker {
    pub ctx: LoopContext,
    pub router: MessageRouter,
    pub parser: Box<dyn ProtocolParser>,
    pub frames_tx: FrameSender,
    pub frames_rx: FrameReceiver,
    pub interceptor: Box<dyn Interceptor>,
    pub injector: Option<Box<dyn Injector>>,
    pub frontend: Option<Box<dyn Frontend>>,
    pub bot_factory: Option<Box<dyn BotFactory>>,
    pub settings: Settings,
    pub amulet_tx: watch::Sender<Arc<AmuletState>>,
    pub fps: FpsCounter,
    pub frames: u64,
}

impl Worker {
    /// Run until stopped, a fatal error or a panic in the loop body, then
    /// tear down subsystems
    pub async fn run(mut self) {
        let shared = self.ctx.shared.clone();
        info!("orchestrator loop starting");
        match AssertUnwindSafe(self.run_inner()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => shared.errors.set_fatal(e),
            Err(panic) => shared.errors.set_fatal(Error::WorkerPanicked(panic_message(&panic))),
        }
        self.teardown();
        self.publish_status();
        shared.set_running(false);
        info!(
            frames = self.frames,
            methods = self.router.classifier().cached(),
            "orchestrator loop ended"
        );
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.start_subsystems()?;
        let backoff = Duration::from_millis(self.settings.idle_backoff_ms);

        while !self.ctx.shared.stop_requested() {
            self.fps.frame();
            self.pre_maintenance()?;

            match self.frames_rx.try_recv() {
                Ok(frame) => {
                    self.frames += 1;
                    let routed = self
                        .router
                        .route_frame(&frame, self.parser.as_mut(), &mut self.ctx);
                    match routed {
                        Ok(outcome) if outcome.touches_amulet() => self.publish_amulet(),
                        Ok(_) => {}
                        Err(e) => {
                            error!(flow_id = %frame.flow_id, kind = %frame.kind, "error handling frame: {}", e);
                            self.ctx.shared.errors.set_game(e);
                            self.publish_amulet();
                        }
                    }
                }
                Err(TryRecvError::Empty) => tokio::time::sleep(backoff).await,
                Err(TryRecvError::Disconnected) => return Err(Error::ChannelClosed),
            }

            self.post_maintenance();
            self.publish_status();
        }
        debug!("stop requested");
        Ok(())
    }

    fn pre_maintenance(&mut self) -> Result<()> {
        let shared = self.ctx.shared.clone();

        if shared.gates.is_set(Gate::BOT_UPDATE) && !self.ctx.is_in_game() {
            self.create_bot();
            shared.gates.set(Gate::BOT_UPDATE, false);
        }

        if shared.gates.is_set(Gate::SUBSYSTEM_RESTART) && !self.frontend_running() {
            info!("restarting interception and injection");
            if let Some(injector) = self.injector.as_mut() {
                injector.stop();
            }
            self.interceptor.stop();
            self.start_interception()?;
            shared.gates.set(Gate::SUBSYSTEM_RESTART, false);
        }
        Ok(())
    }

    fn create_bot(&mut self) {
        let Some(factory) = self.bot_factory.as_ref() else {
            debug!("no bot factory configured");
            return;
        };
        match factory.create() {
            Ok(bot) => {
                info!(bot = %bot.name(), "bot created");
                self.ctx.bot = Some(bot);
                self.ctx
                    .shared
                    .errors
                    .clear_game_if(|e| matches!(e, Error::BotCreation(_)));
            }
            Err(e) => {
                self.ctx.shared.errors.set_game(Error::BotCreation(e.to_string()));
            }
        }
    }

    fn post_maintenance(&mut self) {
        let shared = self.ctx.shared.clone();

        if self.interceptor.is_running() {
            shared
                .errors
                .clear_game_if(|e| matches!(e, Error::InterceptionStopped));
        } else {
            shared.errors.set_game(Error::InterceptionStopped);
        }

        self.reconcile_overlay(shared.gates.is_set(Gate::OVERLAY));

        if let Err(e) = self.ctx.automation.automate_retry_pending(self.ctx.game.as_ref()) {
            shared.errors.set_game(e);
        }

        if !shared.errors.has_game_error() && shared.gates.is_set(Gate::AUTOMATION) {
            let auto_join = shared.gates.is_set(Gate::AUTO_JOIN);
            if let Err(e) = self.ctx.automation.decide_lobby_action(auto_join) {
                shared.errors.set_game(e);
            }
        }
    }

    fn reconcile_overlay(&mut self, enabled: bool) {
        let Some(frontend) = self.frontend.as_mut() else {
            return;
        };
        if enabled {
            if frontend.is_page_normal() && !frontend.is_overlay_working() {
                debug!("starting overlay");
                if let Err(e) = frontend.start_overlay() {
                    warn!("overlay failed to start: {}", e);
                }
            }
        } else if frontend.is_overlay_working() {
            debug!("stopping overlay");
            frontend.stop_overlay();
        }
    }

    fn frontend_running(&self) -> bool {
        self.frontend.as_ref().is_some_and(|f| f.is_running())
    }

    fn start_subsystems(&mut self) -> Result<()> {
        self.start_interception()?;
        if self.settings.auto_launch_frontend {
            if let Some(frontend) = self.frontend.as_mut() {
                frontend
                    .start()
                    .map_err(|e| Error::subsystem_start("frontend", e.to_string()))?;
                info!("frontend started");
            }
        }
        Ok(())
    }

    fn start_interception(&mut self) -> Result<()> {
        self.interceptor
            .start(self.frames_tx.clone())
            .map_err(|e| Error::subsystem_start("interceptor", e.to_string()))?;
        info!(port = self.settings.intercept_port, "interception started");

        if self.settings.enable_injector {
            if let Some(injector) = self.injector.as_mut() {
                let process = &self.settings.inject_process_name;
                injector
                    .start(process, self.settings.intercept_port)
                    .map_err(|e| Error::subsystem_start("injector", e.to_string()))?;
                info!(process = %process, "injector started");
            }
        }
        Ok(())
    }

    /// Stop frontend, interceptor, injector in that order. Never fails.
    fn teardown(&mut self) {
        if let Some(frontend) = self.frontend.as_mut() {
            info!("shutting down frontend");
            frontend.stop();
        }
        info!("shutting down interceptor");
        self.interceptor.stop();
        if let Some(injector) = self.injector.as_mut().filter(|i| i.is_running()) {
            info!("shutting down injector");
            injector.stop();
        }
    }

    fn publish_amulet(&self) {
        self.amulet_tx.send_replace(Arc::new(self.ctx.amulet.clone()));
    }

    fn publish_status(&self) {
        let status = LoopStatus {
            lobby_flow: self.ctx.flows.lobby_flow().map(str::to_string),
            game_flow: self.ctx.flows.game_flow().map(str::to_string),
            in_game: self.ctx.is_in_game(),
            frames: self.frames,
            iterations: self.fps.total(),
            fps: self.fps.fps(),
        };
        *self.ctx.shared.status.write() = status;
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
