//! Frame routing: flow lifecycle plus per-message dispatch
//!
//! MESSAGE frames are matched in priority order, first match wins:
//! ignore list, lobby login response, game auth request, amulet family,
//! game flow, lobby flow, everything else.

use tracing::{debug, info, warn};

use crate::bot::GameSession;
use crate::client::session::{FlowEnd, GameStart, LoginOutcome};
use crate::config::Gate;
use crate::error::Result;
use crate::orchestrator::LoopContext;
use crate::protocol::{
    AmuletMethod, DecodedMessage, FrameKind, MethodCategory, MethodClassifier, MsgType,
    ProtocolParser, WireFrame,
};

/// What routing did with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Payload missing or not decodable; dropped
    Undecodable,
    FlowStarted,
    FlowEnded(FlowEnd),
    Ignored,
    LobbyLogin(LoginOutcome),
    GameStart(GameStart),
    /// Amulet response reconciled
    Amulet(AmuletMethod),
    /// Amulet-family message that is not a response
    AmuletDropped,
    GameMessage { reacted: bool },
    Passthrough,
}

impl RouteOutcome {
    /// True when amulet state may have changed
    pub fn touches_amulet(&self) -> bool {
        matches!(self, Self::Amulet(_))
    }
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    classifier: MethodClassifier,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classifier(&self) -> &MethodClassifier {
        &self.classifier
    }

    /// Route one frame. Decode failures are logged and dropped; errors from
    /// handlers and collaborators are returned for the caller to record.
    pub fn route_frame(
        &mut self,
        frame: &WireFrame,
        parser: &mut dyn ProtocolParser,
        ctx: &mut LoopContext,
    ) -> Result<RouteOutcome> {
        match frame.kind {
            FrameKind::Start => {
                debug!(flow_id = %frame.flow_id, "flow started");
                Ok(RouteOutcome::FlowStarted)
            }
            FrameKind::End => self.end_flow(&frame.flow_id, ctx),
            FrameKind::Message => {
                let Some(payload) = frame.payload.as_deref() else {
                    warn!(flow_id = %frame.flow_id, "message frame without payload");
                    return Ok(RouteOutcome::Undecodable);
                };
                let msg = match parser.decode(payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(flow_id = %frame.flow_id, len = payload.len(), "failed to decode frame: {}", e);
                        return Ok(RouteOutcome::Undecodable);
                    }
                };
                self.route_message(&frame.flow_id, &msg, ctx)
            }
        }
    }

    fn end_flow(&mut self, flow_id: &str, ctx: &mut LoopContext) -> Result<RouteOutcome> {
        let ended = ctx.flows.ended_by(flow_id);
        if ended.is_noop() {
            debug!(flow_id = %flow_id, "untracked flow ended");
            return Ok(RouteOutcome::FlowEnded(ended));
        }

        let mut result = Ok(());
        if ended.game {
            info!(flow_id = %flow_id, "game flow ended");
            result = ctx.finalize_game();
            ctx.flows.clear_game();
        }
        if ended.lobby {
            info!(flow_id = %flow_id, "lobby flow ended");
            let exit = ctx.automation.on_exit_lobby();
            ctx.flows.clear_lobby();
            result = result.and(exit);
        }
        result.map(|_| RouteOutcome::FlowEnded(ended))
    }

    /// Dispatch one decoded message received on `flow_id`
    pub fn route_message(
        &mut self,
        flow_id: &str,
        msg: &DecodedMessage,
        ctx: &mut LoopContext,
    ) -> Result<RouteOutcome> {
        match (self.classifier.category(&msg.method), msg.msg_type) {
            (MethodCategory::Ignored, _) => Ok(RouteOutcome::Ignored),
            (MethodCategory::LobbyLogin, MsgType::Response) => {
                let outcome = ctx.flows.lobby_login(flow_id);
                if outcome == LoginOutcome::Accepted {
                    ctx.automation.on_lobby_login(msg)?;
                }
                Ok(RouteOutcome::LobbyLogin(outcome))
            }
            (MethodCategory::GameAuth, MsgType::Request) => self.start_game(flow_id, ctx),
            (MethodCategory::Amulet(method), MsgType::Response) => {
                debug!("amulet: {}", msg.compact_json());
                ctx.amulet.apply(method, &msg.data);
                if method != AmuletMethod::Giveup && method != AmuletMethod::Unknown {
                    advise(ctx)?;
                }
                Ok(RouteOutcome::Amulet(method))
            }
            (MethodCategory::Amulet(_), msg_type) => {
                debug!(method = %msg.method, %msg_type, "dropping non-response amulet message");
                Ok(RouteOutcome::AmuletDropped)
            }
            _ if ctx.flows.is_game_flow(flow_id) => game_input(msg, ctx),
            _ if ctx.flows.is_lobby_flow(flow_id) => {
                debug!(method = %msg.method, "lobby message");
                Ok(RouteOutcome::Passthrough)
            }
            _ => {
                debug!(flow_id = %flow_id, method = %msg.method, "unrouted message");
                Ok(RouteOutcome::Passthrough)
            }
        }
    }

    fn start_game(&mut self, flow_id: &str, ctx: &mut LoopContext) -> Result<RouteOutcome> {
        let start = ctx.flows.game_start(flow_id);
        let mut result = Ok(());
        match &start {
            GameStart::Duplicate => {
                debug!(flow_id = %flow_id, "game auth repeated on current game flow");
                return Ok(RouteOutcome::GameStart(GameStart::Duplicate));
            }
            GameStart::Replacing { previous } => {
                warn!(previous = %previous, new = %flow_id, "game flow replaced before it ended");
                result = ctx.finalize_game();
            }
            GameStart::Started => {}
        }
        ctx.flows.set_game_flow(flow_id);
        ctx.game = Some(GameSession::new(flow_id, ctx.bot.clone()));
        result.map(|_| RouteOutcome::GameStart(start))
    }
}

fn advise(ctx: &mut LoopContext) -> Result<()> {
    let (Some(advisor), Some(meta)) = (ctx.advisor.as_mut(), ctx.amulet.meta()) else {
        return Ok(());
    };
    let action = advisor.decide(&meta)?;
    if let Some(ref action) = action {
        debug!(kind = %action.kind, "amulet pending action");
    }
    ctx.amulet.set_pending_action(action);
    Ok(())
}

fn game_input(msg: &DecodedMessage, ctx: &mut LoopContext) -> Result<RouteOutcome> {
    let Some(game) = ctx.game.as_mut() else {
        debug!(method = %msg.method, "game flow message without game session");
        return Ok(RouteOutcome::Passthrough);
    };
    let reacted = game.input(msg)?.is_some();
    if !reacted
        && msg.msg_type == MsgType::Notify
        && ctx.shared.gates.is_set(Gate::AUTOMATION)
    {
        ctx.automation.automate_idle(ctx.idle_intensity)?;
    }
    Ok(RouteOutcome::GameMessage { reacted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::bot::{AmuletAdvisor, Bot, Reaction};
    use crate::client::{AutomationEvent, EventCollector};
    use crate::config::Gates;
    use crate::error::Error;
    use crate::orchestrator::Shared;
    use crate::protocol::JsonParser;
    use crate::state::tiles::tests::sample_pool_values;
    use crate::state::{AmuletAction, AmuletMeta};

    struct QuietBot;

    impl Bot for QuietBot {
        fn name(&self) -> &str {
            "quiet"
        }

        fn react(&self, _msg: &DecodedMessage) -> Result<Option<Reaction>> {
            Ok(None)
        }
    }

    struct StageAdvisor;

    impl AmuletAdvisor for StageAdvisor {
        fn decide(&mut self, meta: &AmuletMeta) -> Result<Option<AmuletAction>> {
            Ok(Some(AmuletAction::new(format!("stage{}", meta.stage))))
        }
    }

    fn context(gates: Gates) -> (LoopContext, EventCollector) {
        let collector = EventCollector::new();
        let shared = Arc::new(Shared::new(gates));
        (LoopContext::new(shared, Box::new(collector.clone())), collector)
    }

    fn msg_frame(flow: &str, ty: &str, method: &str, data: Value) -> WireFrame {
        let body = json!({"id": 1, "type": ty, "method": method, "data": data});
        WireFrame::message(flow, serde_json::to_vec(&body).unwrap())
    }

    fn route(router: &mut MessageRouter, ctx: &mut LoopContext, frame: WireFrame) -> RouteOutcome {
        router.route_frame(&frame, &mut JsonParser, ctx).unwrap()
    }

    fn fetch_data() -> Value {
        json!({"data": {"game": {"stage": 1, "round": {"pool": sample_pool_values()}}}})
    }

    #[test]
    fn test_lobby_login_once() {
        let (mut ctx, collector) = context(Gates::default());
        let mut router = MessageRouter::new();

        let outcome = route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.oauth2Login", json!({})));
        assert_eq!(outcome, RouteOutcome::LobbyLogin(LoginOutcome::Accepted));

        let outcome = route(&mut router, &mut ctx, msg_frame("b", "RESPONSE", ".lq.Lobby.oauth2Login", json!({})));
        assert!(matches!(outcome, RouteOutcome::LobbyLogin(LoginOutcome::Rejected { .. })));
        assert_eq!(ctx.flows.lobby_flow(), Some("a"));
        assert_eq!(collector.drain().len(), 1);

        // a login request is not a login
        let outcome = route(&mut router, &mut ctx, msg_frame("c", "REQUEST", ".lq.Lobby.oauth2Login", json!({})));
        assert_eq!(outcome, RouteOutcome::Passthrough);
    }

    #[test]
    fn test_ignored_methods_change_nothing() {
        let (mut ctx, collector) = context(Gates::default());
        let mut router = MessageRouter::new();

        for method in crate::protocol::method::IGNORED_METHODS {
            let outcome = route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", method, fetch_data()));
            assert_eq!(outcome, RouteOutcome::Ignored);
        }
        assert!(ctx.flows.lobby_flow().is_none());
        assert!(!ctx.amulet.is_active());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_amulet_responses_only() {
        let (mut ctx, _) = context(Gates::default());
        let mut router = MessageRouter::new();

        let outcome = route(&mut router, &mut ctx, msg_frame("a", "REQUEST", ".lq.Lobby.fetchAmuletActivityData", fetch_data()));
        assert_eq!(outcome, RouteOutcome::AmuletDropped);
        assert!(!ctx.amulet.is_active());

        let outcome = route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.fetchAmuletActivityData", fetch_data()));
        assert!(outcome.touches_amulet());
        assert!(ctx.amulet.is_active());
        assert_eq!(ctx.amulet.draw_ids().len(), 36);

        route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.amuletActivityGiveup", json!({})));
        assert!(!ctx.amulet.is_active());
    }

    #[test]
    fn test_advisor_sets_pending_action() {
        let (ctx, _) = context(Gates::default());
        let mut ctx = ctx.with_advisor(Box::new(StageAdvisor));
        let mut router = MessageRouter::new();

        route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.fetchAmuletActivityData", fetch_data()));
        assert_eq!(ctx.amulet.pending_action().unwrap().kind, "stage1");

        route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.amuletActivityGiveup", json!({})));
        assert!(ctx.amulet.pending_action().is_none());
    }

    #[test]
    fn test_game_lifecycle() {
        let (mut ctx, collector) = context(Gates::new(Gate::AUTOMATION));
        ctx.bot = Some(Arc::new(QuietBot));
        let mut router = MessageRouter::new();

        let outcome = route(&mut router, &mut ctx, msg_frame("g1", "REQUEST", ".lq.FastTest.authGame", json!({})));
        assert_eq!(outcome, RouteOutcome::GameStart(GameStart::Started));
        assert_eq!(ctx.game.as_ref().unwrap().bot_name(), Some("quiet"));

        let outcome = route(&mut router, &mut ctx, msg_frame("g1", "REQUEST", ".lq.FastTest.authGame", json!({})));
        assert_eq!(outcome, RouteOutcome::GameStart(GameStart::Duplicate));

        let outcome = route(&mut router, &mut ctx, msg_frame("g1", "NOTIFY", ".lq.ActionPrototype", json!({})));
        assert_eq!(outcome, RouteOutcome::GameMessage { reacted: false });
        assert_eq!(collector.drain(), vec![AutomationEvent::Idle { intensity: 0.05 }]);

        let outcome = route(&mut router, &mut ctx, WireFrame::end("g1"));
        assert_eq!(outcome, RouteOutcome::FlowEnded(FlowEnd { game: true, lobby: false }));
        assert!(ctx.flows.game_flow().is_none());
        assert!(ctx.game.is_none());
        assert_eq!(collector.drain(), vec![AutomationEvent::EndGame]);
    }

    #[test]
    fn test_game_replaced_by_new_flow() {
        let (mut ctx, collector) = context(Gates::default());
        let mut router = MessageRouter::new();

        route(&mut router, &mut ctx, msg_frame("g1", "REQUEST", ".lq.FastTest.authGame", json!({})));
        let outcome = route(&mut router, &mut ctx, msg_frame("g2", "REQUEST", ".lq.FastTest.authGame", json!({})));
        assert_eq!(outcome, RouteOutcome::GameStart(GameStart::Replacing { previous: "g1".into() }));
        assert_eq!(ctx.flows.game_flow(), Some("g2"));
        assert_eq!(ctx.game.as_ref().unwrap().flow_id(), "g2");
        assert_eq!(collector.drain(), vec![AutomationEvent::EndGame]);
    }

    #[test]
    fn test_game_message_without_bot_is_error() {
        let (mut ctx, _) = context(Gates::default());
        let mut router = MessageRouter::new();

        route(&mut router, &mut ctx, msg_frame("g1", "REQUEST", ".lq.FastTest.authGame", json!({})));
        let frame = msg_frame("g1", "NOTIFY", ".lq.ActionPrototype", json!({}));
        let result = router.route_frame(&frame, &mut JsonParser, &mut ctx);
        assert!(matches!(result, Err(Error::Collaborator { .. })));
    }

    #[test]
    fn test_lobby_end_and_untracked_end() {
        let (mut ctx, collector) = context(Gates::default());
        let mut router = MessageRouter::new();

        route(&mut router, &mut ctx, msg_frame("a", "RESPONSE", ".lq.Lobby.oauth2Login", json!({})));
        collector.drain();

        let outcome = route(&mut router, &mut ctx, WireFrame::end("zzz"));
        assert_eq!(outcome, RouteOutcome::FlowEnded(FlowEnd::default()));
        assert!(collector.is_empty());

        route(&mut router, &mut ctx, WireFrame::end("a"));
        assert!(ctx.flows.lobby_flow().is_none());
        assert_eq!(collector.drain(), vec![AutomationEvent::ExitLobby]);
    }

    #[test]
    fn test_undecodable_frames_are_dropped() {
        let (mut ctx, _) = context(Gates::default());
        let mut router = MessageRouter::new();

        let garbage = WireFrame::message("a", b"\x00\x01not json".to_vec());
        assert_eq!(route(&mut router, &mut ctx, garbage), RouteOutcome::Undecodable);

        let empty = WireFrame { flow_id: "a".into(), kind: FrameKind::Message, payload: None };
        assert_eq!(route(&mut router, &mut ctx, empty), RouteOutcome::Undecodable);

        assert_eq!(route(&mut router, &mut ctx, WireFrame::start("a")), RouteOutcome::FlowStarted);
    }
}
