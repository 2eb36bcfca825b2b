//! Per-connection tab list replication
//!
//! A [`TabList`] mirrors the player list a client should see. It is fed from
//! two directions at once:
//! - local API calls (`add_entry`, `remove_entry`, `clear_all`, entry setters)
//! - backend player list packets, turned into [`RemoteDelta`]s
//!
//! Every change to the map is forwarded to the client through the
//! connection's [`ConnectionSink`] before the call returns. The one exception
//! is [`TabList::clear_all`], which uses a deferred write; see its docs.
//!
//! Entries live in a sharded concurrent map. Single-entry operations write
//! their packet while holding the shard lock for that identity, so the order
//! of packets on the wire matches the order of changes to the map.

mod delta;
mod entry;

pub use delta::RemoteDelta;
pub use entry::TabListEntry;

use crate::connection::ConnectionSink;
use crate::error::{ProxyError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use shared::{GameMode, GameProfile, Packet, PlayerListAction, PlayerListItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use uuid::Uuid;

pub(crate) struct TabListInner {
    connection: Arc<dyn ConnectionSink>,
    entries: DashMap<Uuid, TabListEntry>,
    /// Shared by single-entry operations, exclusive for `clear_all`.
    gate: RwLock<()>,
    closed: AtomicBool,
}

impl TabListInner {
    fn shared_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forwards a change to `entry` if that exact entry is still listed.
    pub(crate) fn push_if_present(&self, action: PlayerListAction, entry: &TabListEntry) {
        let _gate = self.shared_gate();
        if let Some(stored) = self.entries.get(&entry.id()) {
            if stored.same_as(entry) {
                self.connection.write(Packet::PlayerListItem {
                    action,
                    items: vec![entry.to_item()],
                });
            }
        }
    }
}

/// Cloneable handle to one connection's tab list.
#[derive(Clone)]
pub struct TabList {
    inner: Arc<TabListInner>,
}

impl TabList {
    pub fn new(connection: Arc<dyn ConnectionSink>) -> Self {
        Self {
            inner: Arc::new(TabListInner {
                connection,
                entries: DashMap::new(),
                gate: RwLock::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates an entry owned by this list. It is not listed until added.
    pub fn build_entry(
        &self,
        profile: GameProfile,
        display_name: Option<String>,
        latency: i32,
        game_mode: GameMode,
    ) -> TabListEntry {
        TabListEntry::new(
            Arc::downgrade(&self.inner),
            profile,
            display_name,
            latency,
            game_mode,
        )
    }

    pub fn add_entry(&self, entry: TabListEntry) -> Result<()> {
        self.ensure_open()?;
        let id = entry.id();
        if !entry.is_owned_by(&self.inner) {
            return Err(ProxyError::ForeignEntry(id));
        }

        let _gate = self.open_gate()?;
        match self.inner.entries.entry(id) {
            Entry::Occupied(_) => Err(ProxyError::DuplicateEntry(id)),
            Entry::Vacant(vacant) => {
                self.inner.connection.write(Packet::PlayerListItem {
                    action: PlayerListAction::AddPlayer,
                    items: vec![entry.to_item()],
                });
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Removes and returns the entry for `id`. Absent identities are a no-op.
    pub fn remove_entry(&self, id: Uuid) -> Result<Option<TabListEntry>> {
        let _gate = self.open_gate()?;
        match self.inner.entries.entry(id) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(occupied) => {
                self.inner.connection.write(Packet::PlayerListItem {
                    action: PlayerListAction::RemovePlayer,
                    items: vec![PlayerListItem::new(id)],
                });
                Ok(Some(occupied.remove()))
            }
        }
    }

    pub fn contains_entry(&self, id: Uuid) -> bool {
        self.inner.entries.contains_key(&id)
    }

    pub fn get_entry(&self, id: Uuid) -> Option<TabListEntry> {
        self.inner.entries.get(&id).map(|entry| entry.clone())
    }

    /// Snapshot of the listed entries. Changes made after the call may or
    /// may not be reflected in it.
    pub fn entries(&self) -> Vec<TabListEntry> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Removes every entry and queues one removal packet covering all of
    /// them. The packet goes out with `delayed_write`: the caller must flush
    /// the connection (see [`crate::connection::FlushGuard`]) or the client
    /// keeps showing the old entries. Returns how many entries were removed.
    pub fn clear_all(&self) -> Result<usize> {
        let _gate = self.inner.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let items: Vec<PlayerListItem> = self
            .inner
            .entries
            .iter()
            .map(|entry| PlayerListItem::new(*entry.key()))
            .collect();
        if items.is_empty() {
            return Ok(0);
        }

        self.inner.entries.clear();
        let removed = items.len();
        self.inner.connection.delayed_write(Packet::PlayerListItem {
            action: PlayerListAction::RemovePlayer,
            items,
        });
        debug!("Cleared {} tab list entries", removed);
        Ok(removed)
    }

    pub fn set_header_and_footer(&self, header: impl Into<String>, footer: impl Into<String>) {
        self.inner.connection.write(Packet::HeaderAndFooter {
            header: header.into(),
            footer: footer.into(),
        });
    }

    pub fn clear_header_and_footer(&self) {
        self.inner
            .connection
            .write(Packet::header_and_footer_reset());
    }

    /// Applies a change reported by a backend.
    ///
    /// Updates for identities that are not listed are dropped: backends do
    /// not guarantee an add reaches us before the updates that follow it.
    /// An add missing the profile name or properties means the backend feed
    /// is broken and is returned as an error.
    pub fn apply_remote_delta(&self, delta: RemoteDelta) -> Result<()> {
        self.ensure_open()?;
        match delta {
            RemoteDelta::Add {
                id,
                name,
                properties,
                display_name,
                latency,
                game_mode,
            } => {
                let (name, properties) = match (name, properties) {
                    (Some(name), Some(properties)) => (name, properties),
                    _ => return Err(ProxyError::CorruptRemoteUpsert(id)),
                };
                let profile = GameProfile {
                    id,
                    name,
                    properties,
                };
                let entry = self.build_entry(profile, display_name, latency, game_mode);
                self.upsert(entry)?;
            }
            RemoteDelta::Remove { id } => {
                self.remove_entry(id)?;
            }
            RemoteDelta::UpdateDisplayName { id, display_name } => {
                if let Some(entry) = self.listed_for_update(id) {
                    entry.set_display_name(display_name);
                }
            }
            RemoteDelta::UpdateLatency { id, latency } => {
                if let Some(entry) = self.listed_for_update(id) {
                    entry.set_latency(latency);
                }
            }
            RemoteDelta::UpdateGameMode { id, game_mode } => {
                if let Some(entry) = self.listed_for_update(id) {
                    entry.set_game_mode(game_mode);
                }
            }
        }
        Ok(())
    }

    /// Applies every item of a backend player list packet in order. Other
    /// packets are ignored.
    pub fn process_backend_packet(&self, packet: &Packet) -> Result<()> {
        if let Packet::PlayerListItem { action, items } = packet {
            for item in items {
                self.apply_remote_delta(RemoteDelta::from_item(*action, item.clone()))?;
            }
        }
        Ok(())
    }

    /// Empties the list without telling the client. Called when the
    /// connection goes away; every later mutation fails with `StoreClosed`.
    pub fn teardown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _gate = self.inner.gate.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = self.inner.entries.len();
        self.inner.entries.clear();
        info!("Tab list torn down with {} entries", dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ProxyError::StoreClosed)
        } else {
            Ok(())
        }
    }

    /// Takes the shared gate and fails if the list was torn down. Teardown
    /// marks the list closed before taking the gate exclusively, so a
    /// mutation holding this guard either completes before the teardown
    /// clears the map or observes the closed flag.
    fn open_gate(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let gate = self.inner.shared_gate();
        self.ensure_open()?;
        Ok(gate)
    }

    fn upsert(&self, entry: TabListEntry) -> Result<()> {
        let _gate = self.open_gate()?;
        let packet = Packet::PlayerListItem {
            action: PlayerListAction::AddPlayer,
            items: vec![entry.to_item()],
        };
        match self.inner.entries.entry(entry.id()) {
            Entry::Occupied(mut occupied) => {
                self.inner.connection.write(packet);
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                self.inner.connection.write(packet);
                vacant.insert(entry);
            }
        }
        Ok(())
    }

    fn listed_for_update(&self, id: Uuid) -> Option<TabListEntry> {
        let entry = self.get_entry(id);
        if entry.is_none() {
            debug!("Ignoring update for unlisted entry {}", id);
        }
        entry
    }
}

impl std::fmt::Debug for TabList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabList")
            .field("entries", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, SinkCommand};
    use shared::Property;
    use tokio::sync::mpsc;

    fn setup() -> (TabList, mpsc::UnboundedReceiver<SinkCommand>) {
        let (connection, rx) = Connection::channel();
        (TabList::new(connection), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SinkCommand>) -> Vec<SinkCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn entry_for(list: &TabList, name: &str) -> TabListEntry {
        list.build_entry(
            GameProfile::new(Uuid::new_v4(), name),
            None,
            0,
            GameMode::Survival,
        )
    }

    fn remote_add(id: Uuid, name: &str) -> RemoteDelta {
        RemoteDelta::Add {
            id,
            name: Some(name.to_string()),
            properties: Some(vec![Property {
                name: "textures".to_string(),
                value: "e30=".to_string(),
                signature: None,
            }]),
            display_name: None,
            latency: 20,
            game_mode: GameMode::Survival,
        }
    }

    fn single_action(command: &SinkCommand) -> (PlayerListAction, Vec<PlayerListItem>) {
        match command {
            SinkCommand::Write(Packet::PlayerListItem { action, items }) => {
                (*action, items.clone())
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_add_entry_writes_add() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");
        let id = entry.id();

        list.add_entry(entry).unwrap();

        assert!(list.contains_entry(id));
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        let (action, items) = single_action(&commands[0]);
        assert_eq!(action, PlayerListAction::AddPlayer);
        assert_eq!(items[0].uuid, id);
        assert_eq!(items[0].name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_duplicate_add_fails_without_mutation() {
        let (list, mut rx) = setup();
        let first = entry_for(&list, "alice");
        let id = first.id();
        list.add_entry(first.clone()).unwrap();
        drain(&mut rx);

        let second = list.build_entry(
            GameProfile::new(id, "impostor"),
            Some("Impostor".to_string()),
            5,
            GameMode::Creative,
        );
        let result = list.add_entry(second);

        assert!(matches!(result, Err(ProxyError::DuplicateEntry(dup)) if dup == id));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get_entry(id).unwrap().profile().name, "alice");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_foreign_entry_rejected() {
        let (list, mut rx) = setup();
        let (other, _other_rx) = setup();
        let entry = entry_for(&other, "mallory");
        let id = entry.id();

        let result = list.add_entry(entry);

        assert!(matches!(result, Err(ProxyError::ForeignEntry(foreign)) if foreign == id));
        assert!(list.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_remove_absent_is_silent() {
        let (list, mut rx) = setup();

        let removed = list.remove_entry(Uuid::new_v4()).unwrap();

        assert!(removed.is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_remove_present_writes_once() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");
        let id = entry.id();
        list.add_entry(entry).unwrap();
        drain(&mut rx);

        let removed = list.remove_entry(id).unwrap();
        let removed_again = list.remove_entry(id).unwrap();

        assert_eq!(removed.map(|entry| entry.id()), Some(id));
        assert!(removed_again.is_none());
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        let (action, items) = single_action(&commands[0]);
        assert_eq!(action, PlayerListAction::RemovePlayer);
        assert_eq!(items, vec![PlayerListItem::new(id)]);
    }

    #[test]
    fn test_setter_pushes_narrow_update() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");
        list.add_entry(entry.clone()).unwrap();
        drain(&mut rx);

        entry.set_latency(150);
        entry.set_game_mode(GameMode::Spectator);
        entry.set_display_name(Some("Alice".to_string()));

        let actions: Vec<PlayerListAction> =
            drain(&mut rx).iter().map(|c| single_action(c).0).collect();
        assert_eq!(
            actions,
            vec![
                PlayerListAction::UpdateLatency,
                PlayerListAction::UpdateGameMode,
                PlayerListAction::UpdateDisplayName,
            ]
        );
        assert_eq!(entry.latency(), 150);
    }

    #[test]
    fn test_removed_entry_is_silent() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");
        list.add_entry(entry.clone()).unwrap();
        list.remove_entry(entry.id()).unwrap();
        drain(&mut rx);

        entry.set_latency(99);
        entry.set_display_name(Some("ghost".to_string()));

        assert_eq!(entry.latency(), 99);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_unadded_entry_is_silent() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");

        entry.set_latency(10);

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_replaced_entry_handle_is_silent() {
        let (list, mut rx) = setup();
        let id = Uuid::new_v4();
        list.apply_remote_delta(remote_add(id, "alice")).unwrap();
        let stale = list.get_entry(id).unwrap();
        list.apply_remote_delta(remote_add(id, "alice")).unwrap();
        drain(&mut rx);

        stale.set_latency(500);

        assert!(drain(&mut rx).is_empty());
        assert_eq!(list.get_entry(id).unwrap().latency(), 20);
    }

    #[test]
    fn test_clear_all_defers_one_bulk_removal() {
        let (list, mut rx) = setup();
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let entry = entry_for(&list, name);
            ids.push(entry.id());
            list.add_entry(entry).unwrap();
        }
        drain(&mut rx);

        let removed = list.clear_all().unwrap();

        assert_eq!(removed, 3);
        assert!(list.is_empty());
        let commands = drain(&mut rx);
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            SinkCommand::DelayedWrite(Packet::PlayerListItem { action, items }) => {
                assert_eq!(*action, PlayerListAction::RemovePlayer);
                let mut removed_ids: Vec<Uuid> = items.iter().map(|item| item.uuid).collect();
                removed_ids.sort();
                ids.sort();
                assert_eq!(removed_ids, ids);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_clear_all_on_empty_list_writes_nothing() {
        let (list, mut rx) = setup();

        assert_eq!(list.clear_all().unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_update_before_add_is_ignored_then_applied() {
        let (list, mut rx) = setup();
        let id = Uuid::new_v4();
        let rename = RemoteDelta::UpdateDisplayName {
            id,
            display_name: Some("Renamed".to_string()),
        };

        list.apply_remote_delta(rename.clone()).unwrap();
        assert!(!list.contains_entry(id));
        assert!(drain(&mut rx).is_empty());

        list.apply_remote_delta(remote_add(id, "alice")).unwrap();
        list.apply_remote_delta(rename).unwrap();

        assert_eq!(
            list.get_entry(id).unwrap().display_name().as_deref(),
            Some("Renamed")
        );
        let actions: Vec<PlayerListAction> =
            drain(&mut rx).iter().map(|c| single_action(c).0).collect();
        assert_eq!(
            actions,
            vec![
                PlayerListAction::AddPlayer,
                PlayerListAction::UpdateDisplayName
            ]
        );
    }

    // Assumes backends always send the full profile with an add; an add
    // without it is treated as a broken feed rather than skipped.
    #[test]
    fn test_remote_add_without_profile_is_fatal() {
        let (list, mut rx) = setup();
        let id = Uuid::new_v4();

        let result = list.apply_remote_delta(RemoteDelta::Add {
            id,
            name: Some("alice".to_string()),
            properties: None,
            display_name: None,
            latency: 0,
            game_mode: GameMode::Survival,
        });

        assert!(matches!(result, Err(ProxyError::CorruptRemoteUpsert(bad)) if bad == id));
        assert!(list.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_remote_remove_of_unknown_is_ignored() {
        let (list, mut rx) = setup();

        list.apply_remote_delta(RemoteDelta::Remove { id: Uuid::new_v4() })
            .unwrap();

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_process_backend_packet_applies_items_in_order() {
        let (list, mut rx) = setup();
        let id = Uuid::new_v4();
        let mut add = PlayerListItem::from_profile(&GameProfile::new(id, "alice"));
        add.latency = 30;

        list.process_backend_packet(&Packet::PlayerListItem {
            action: PlayerListAction::AddPlayer,
            items: vec![add],
        })
        .unwrap();
        list.process_backend_packet(&Packet::PlayerListItem {
            action: PlayerListAction::UpdateGameMode,
            items: vec![PlayerListItem {
                game_mode: GameMode::Adventure,
                ..PlayerListItem::new(id)
            }],
        })
        .unwrap();
        list.process_backend_packet(&Packet::StatusRequest).unwrap();

        let entry = list.get_entry(id).unwrap();
        assert_eq!(entry.latency(), 30);
        assert_eq!(entry.game_mode(), GameMode::Adventure);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn test_header_and_footer_written_immediately() {
        let (list, mut rx) = setup();

        list.set_header_and_footer("top", "bottom");
        list.clear_header_and_footer();

        assert_eq!(
            drain(&mut rx),
            vec![
                SinkCommand::Write(Packet::HeaderAndFooter {
                    header: "top".to_string(),
                    footer: "bottom".to_string(),
                }),
                SinkCommand::Write(Packet::header_and_footer_reset()),
            ]
        );
    }

    #[test]
    fn test_teardown_rejects_further_mutation() {
        let (list, mut rx) = setup();
        let entry = entry_for(&list, "alice");
        list.add_entry(entry.clone()).unwrap();
        drain(&mut rx);

        list.teardown();

        assert!(list.is_empty());
        assert!(matches!(
            list.add_entry(entry_for(&list, "bob")),
            Err(ProxyError::StoreClosed)
        ));
        assert!(matches!(list.clear_all(), Err(ProxyError::StoreClosed)));
        entry.set_latency(1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_teardown_racing_adders_leaves_list_empty() {
        let (list, mut rx) = setup();
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(5));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let list = list.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    let mut added = 0usize;
                    loop {
                        let result = if i % 2 == 0 {
                            list.add_entry(entry_for(&list, "racer"))
                        } else {
                            list.apply_remote_delta(remote_add(Uuid::new_v4(), "remote"))
                        };
                        match result {
                            Ok(()) => added += 1,
                            Err(ProxyError::StoreClosed) => return added,
                            Err(e) => panic!("Unexpected error: {}", e),
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        std::thread::sleep(std::time::Duration::from_millis(5));
        list.teardown();

        let added: usize = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .sum();

        assert!(list.is_closed());
        assert!(list.is_empty());
        assert_eq!(drain(&mut rx).len(), added);
        assert!(matches!(
            list.remove_entry(Uuid::new_v4()),
            Err(ProxyError::StoreClosed)
        ));
    }

    #[test]
    fn test_concurrent_adds_of_same_identity() {
        let (list, mut rx) = setup();
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let list = list.clone();
                std::thread::spawn(move || {
                    let entry = list.build_entry(
                        GameProfile::new(id, format!("racer{}", i)),
                        None,
                        0,
                        GameMode::Survival,
                    );
                    list.add_entry(entry).is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(list.len(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
