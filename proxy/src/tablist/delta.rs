use shared::{GameMode, PlayerListAction, PlayerListItem, Property};
use uuid::Uuid;

/// One change to a tab list reported by a backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDelta {
    Add {
        id: Uuid,
        name: Option<String>,
        properties: Option<Vec<Property>>,
        display_name: Option<String>,
        latency: i32,
        game_mode: GameMode,
    },
    Remove {
        id: Uuid,
    },
    UpdateDisplayName {
        id: Uuid,
        display_name: Option<String>,
    },
    UpdateLatency {
        id: Uuid,
        latency: i32,
    },
    UpdateGameMode {
        id: Uuid,
        game_mode: GameMode,
    },
}

impl RemoteDelta {
    pub fn from_item(action: PlayerListAction, item: PlayerListItem) -> Self {
        let id = item.uuid;
        match action {
            PlayerListAction::AddPlayer => RemoteDelta::Add {
                id,
                name: item.name,
                properties: item.properties,
                display_name: item.display_name,
                latency: item.latency,
                game_mode: item.game_mode,
            },
            PlayerListAction::RemovePlayer => RemoteDelta::Remove { id },
            PlayerListAction::UpdateDisplayName => RemoteDelta::UpdateDisplayName {
                id,
                display_name: item.display_name,
            },
            PlayerListAction::UpdateLatency => RemoteDelta::UpdateLatency {
                id,
                latency: item.latency,
            },
            PlayerListAction::UpdateGameMode => RemoteDelta::UpdateGameMode {
                id,
                game_mode: item.game_mode,
            },
        }
    }
}
