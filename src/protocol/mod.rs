pub mod frame;
pub mod message;
pub mod method;

pub use frame::{frame_channel, FrameKind, FrameReceiver, FrameSender, WireFrame};
pub use message::{DecodedMessage, JsonParser, MsgType, ProtocolParser};
pub use method::{classify, AmuletMethod, MethodCategory, MethodClassifier};
