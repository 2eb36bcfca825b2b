use super::TabListInner;
use shared::{GameMode, GameProfile, PlayerListAction, PlayerListItem};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryState {
    display_name: Option<String>,
    latency: i32,
    game_mode: GameMode,
}

struct EntryShared {
    owner: Weak<TabListInner>,
    profile: GameProfile,
    state: Mutex<EntryState>,
}

/// Handle to one player shown in a tab list.
///
/// Clones share state. Setters update the value and then ask the owning
/// list to forward the change; once the entry is no longer stored in that
/// list, changes stay local.
#[derive(Clone)]
pub struct TabListEntry {
    shared: Arc<EntryShared>,
}

impl TabListEntry {
    pub(super) fn new(
        owner: Weak<TabListInner>,
        profile: GameProfile,
        display_name: Option<String>,
        latency: i32,
        game_mode: GameMode,
    ) -> Self {
        Self {
            shared: Arc::new(EntryShared {
                owner,
                profile,
                state: Mutex::new(EntryState {
                    display_name,
                    latency,
                    game_mode,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.profile.id
    }

    pub fn profile(&self) -> &GameProfile {
        &self.shared.profile
    }

    pub fn display_name(&self) -> Option<String> {
        self.with_state(|state| state.display_name.clone())
    }

    pub fn latency(&self) -> i32 {
        self.with_state(|state| state.latency)
    }

    pub fn game_mode(&self) -> GameMode {
        self.with_state(|state| state.game_mode)
    }

    pub fn set_display_name(&self, display_name: Option<String>) {
        self.with_state(|state| state.display_name = display_name);
        self.push(PlayerListAction::UpdateDisplayName);
    }

    pub fn set_latency(&self, latency: i32) {
        self.with_state(|state| state.latency = latency);
        self.push(PlayerListAction::UpdateLatency);
    }

    pub fn set_game_mode(&self, game_mode: GameMode) {
        self.with_state(|state| state.game_mode = game_mode);
        self.push(PlayerListAction::UpdateGameMode);
    }

    /// Wire snapshot of the entry as it is right now.
    pub fn to_item(&self) -> PlayerListItem {
        let state = self.with_state(|state| state.clone());
        PlayerListItem {
            display_name: state.display_name,
            latency: state.latency,
            game_mode: state.game_mode,
            ..PlayerListItem::from_profile(&self.shared.profile)
        }
    }

    pub(super) fn is_owned_by(&self, list: &Arc<TabListInner>) -> bool {
        std::ptr::eq(self.shared.owner.as_ptr(), Arc::as_ptr(list))
    }

    pub(super) fn same_as(&self, other: &TabListEntry) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn push(&self, action: PlayerListAction) {
        if let Some(owner) = self.shared.owner.upgrade() {
            owner.push_if_present(action, self);
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut EntryState) -> T) -> T {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl std::fmt::Debug for TabListEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabListEntry")
            .field("id", &self.id())
            .field("name", &self.shared.profile.name)
            .field("state", &self.with_state(|state| state.clone()))
            .finish()
    }
}
