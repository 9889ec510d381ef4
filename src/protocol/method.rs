//! Method names and the category classifier used by the router

use ahash::AHashMap;

pub const CHECK_NETWORK_DELAY: &str = ".lq.FastTest.checkNetworkDelay";
pub const HEARTBEAT: &str = ".lq.Lobby.heartbeat";
pub const ROUTE_HEARTBEAT: &str = ".lq.Route.heartbeat";
pub const LOGIN_BEAT: &str = ".lq.Lobby.loginBeat";
pub const FETCH_ACCOUNT_ACTIVITY_DATA: &str = ".lq.Lobby.fetchAccountActivityData";
pub const FETCH_SERVER_TIME: &str = ".lq.Lobby.fetchServerTime";

pub const OAUTH2_LOGIN: &str = ".lq.Lobby.oauth2Login";
pub const AUTH_GAME: &str = ".lq.FastTest.authGame";

pub const FETCH_AMULET_ACTIVITY_DATA: &str = ".lq.Lobby.fetchAmuletActivityData";
pub const AMULET_ACTIVITY_UPGRADE: &str = ".lq.Lobby.amuletActivityUpgrade";
pub const AMULET_ACTIVITY_OPERATE: &str = ".lq.Lobby.amuletActivityOperate";
pub const AMULET_ACTIVITY_GIVEUP: &str = ".lq.Lobby.amuletActivityGiveup";

/// Keepalive / time-sync methods that are dropped right after decoding
pub const IGNORED_METHODS: &[&str] = &[
    CHECK_NETWORK_DELAY,
    HEARTBEAT,
    ROUTE_HEARTBEAT,
    LOGIN_BEAT,
    FETCH_ACCOUNT_ACTIVITY_DATA,
    FETCH_SERVER_TIME,
];

const AMULET_FAMILY: &str = "amulet";

// Upper bound on distinct method names remembered by the classifier.
const MAX_CACHED_METHODS: usize = 1024;

/// Event kinds of the amulet mini-game family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmuletMethod {
    Fetch,
    Upgrade,
    Operate,
    Giveup,
    /// In the family but not one we reconcile
    Unknown,
}

impl AmuletMethod {
    fn from_method(method: &str) -> Self {
        match method {
            FETCH_AMULET_ACTIVITY_DATA => Self::Fetch,
            AMULET_ACTIVITY_UPGRADE => Self::Upgrade,
            AMULET_ACTIVITY_OPERATE => Self::Operate,
            AMULET_ACTIVITY_GIVEUP => Self::Giveup,
            _ => Self::Unknown,
        }
    }
}

/// Routing category of a method name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodCategory {
    Ignored,
    LobbyLogin,
    GameAuth,
    Amulet(AmuletMethod),
    Other,
}

/// Classify a method name without caching
pub fn classify(method: &str) -> MethodCategory {
    if IGNORED_METHODS.contains(&method) {
        return MethodCategory::Ignored;
    }
    match method {
        OAUTH2_LOGIN => MethodCategory::LobbyLogin,
        AUTH_GAME => MethodCategory::GameAuth,
        _ if is_amulet_family(method) => MethodCategory::Amulet(AmuletMethod::from_method(method)),
        _ => MethodCategory::Other,
    }
}

fn is_amulet_family(method: &str) -> bool {
    method.to_ascii_lowercase().contains(AMULET_FAMILY)
}

/// Caches the category of every method name seen so far
#[derive(Debug, Default)]
pub struct MethodClassifier {
    cache: AHashMap<String, MethodCategory>,
}

impl MethodClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(&mut self, method: &str) -> MethodCategory {
        if let Some(category) = self.cache.get(method) {
            return *category;
        }
        let category = classify(method);
        if self.cache.len() < MAX_CACHED_METHODS {
            self.cache.insert(method.to_string(), category);
        }
        category
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
