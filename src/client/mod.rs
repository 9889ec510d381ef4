pub mod events;
pub mod router;
pub mod session;

pub use events::{AutomationEvent, EventCollector};
pub use router::{MessageRouter, RouteOutcome};
pub use session::{FlowEnd, GameStart, LoginOutcome, SessionFlows, SessionTracker};
