use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROXY_NAME: &str = "Relay";
pub const SUPPORTED_VERSION_STRING: &str = "1.8-1.20.1";
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Numeric protocol revision negotiated in the handshake.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(pub i32);

impl ProtocolVersion {
    pub const MINIMUM: ProtocolVersion = ProtocolVersion(47);
    pub const MAXIMUM: ProtocolVersion = ProtocolVersion(763);
    pub const UNKNOWN: ProtocolVersion = ProtocolVersion(-1);

    pub fn is_supported(self) -> bool {
        self >= Self::MINIMUM && self <= Self::MAXIMUM
    }

    /// The version advertised back to a pinging client: its own if we speak it,
    /// otherwise the newest one we do.
    pub fn shown(self) -> ProtocolVersion {
        if self.is_supported() {
            self
        } else {
            Self::MAXIMUM
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub id: Uuid,
    pub name: String,
    pub properties: Vec<Property>,
}

impl GameProfile {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            properties: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PlayerListAction {
    AddPlayer,
    UpdateGameMode,
    UpdateLatency,
    UpdateDisplayName,
    RemovePlayer,
}

/// One row of a player list packet. Which fields are meaningful depends on
/// the packet's action; `name` and `properties` are only carried by adds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerListItem {
    pub uuid: Uuid,
    pub name: Option<String>,
    pub properties: Option<Vec<Property>>,
    pub game_mode: GameMode,
    pub latency: i32,
    pub display_name: Option<String>,
}

impl PlayerListItem {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: None,
            properties: None,
            game_mode: GameMode::default(),
            latency: 0,
            display_name: None,
        }
    }

    pub fn from_profile(profile: &GameProfile) -> Self {
        Self {
            name: Some(profile.name.clone()),
            properties: Some(profile.properties.clone()),
            ..Self::new(profile.id)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Version {
    pub protocol: i32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SamplePlayer {
    pub name: String,
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Players {
    pub online: i32,
    pub max: i32,
    pub sample: Vec<SamplePlayer>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Mod {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub mod_type: String,
    pub mods: Vec<Mod>,
}

impl ModInfo {
    /// Descriptor announced for an unmodded Forge-compatible proxy.
    pub fn forge_default() -> Self {
        Self {
            mod_type: "FML".to_string(),
            mods: Vec::new(),
        }
    }
}

/// Structured reply to a status query.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerPing {
    pub version: Version,
    pub players: Option<Players>,
    pub description: String,
    pub favicon: Option<String>,
    pub mod_info: Option<ModInfo>,
}

impl ServerPing {
    /// True when any mod descriptor is present, even one listing no mods.
    pub fn has_mods(&self) -> bool {
        self.mod_info.is_some()
    }

    pub fn has_description(&self) -> bool {
        !self.description.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    // Inbound, status phase
    Handshake {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
    },
    LegacyPing {
        protocol_version: i32,
    },
    StatusRequest,
    StatusPing {
        payload: i64,
    },

    // Outbound, status phase
    StatusResponse {
        ping: ServerPing,
    },
    LegacyDisconnect {
        ping: ServerPing,
    },

    // Play phase
    PlayerListItem {
        action: PlayerListAction,
        items: Vec<PlayerListItem>,
    },
    HeaderAndFooter {
        header: String,
        footer: String,
    },
}

impl Packet {
    pub fn header_and_footer_reset() -> Self {
        Packet::HeaderAndFooter {
            header: String::new(),
            footer: String::new(),
        }
    }
}
