//! Batch coalescing.
//!
//! Queued broadcasts are grouped by `(kind, target)`. Groups are emitted in
//! order of first appearance. Within a group:
//!
//! - map deltas for the same map merge: `changes` field by field, tokens by
//!   id and revealed areas by area id, the later value winning;
//! - encounter deltas for the same encounter merge the same way, with
//!   participants keyed by character id and effects by effect id;
//! - runtime flag changes merge field by field;
//! - full snapshots collapse to the latest one;
//! - inventory changes and action results are never merged.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tabletop_session::domain::deltas::{AreaReveal, EncounterUpdate, MapUpdate};

use crate::message::{BroadcastKind, BroadcastTarget, OutboundMessage, QueuedBroadcast};

/// Merges `next` into `into`, later values winning. `null` values are kept
/// so that they still clear the field on the receiving side.
pub fn merge_changes(into: &mut Map<String, Value>, next: Map<String, Value>) {
    for (key, value) in next {
        into.insert(key, value);
    }
}

fn upsert_by<T, K: PartialEq>(into: &mut Vec<T>, next: Vec<T>, key: impl Fn(&T) -> K) {
    for item in next {
        match into.iter().position(|existing| key(existing) == key(&item)) {
            Some(index) => into[index] = item,
            None => into.push(item),
        }
    }
}

fn merge_reveals(into: &mut Vec<AreaReveal>, next: Vec<AreaReveal>) {
    for reveal in next {
        match into.iter_mut().find(|existing| existing.id == reveal.id) {
            // An empty player list reveals to everyone and absorbs any other.
            Some(existing) if existing.player_ids.is_empty() => {}
            Some(existing) if reveal.player_ids.is_empty() => existing.player_ids.clear(),
            Some(existing) => {
                for player_id in reveal.player_ids {
                    if !existing.player_ids.contains(&player_id) {
                        existing.player_ids.push(player_id);
                    }
                }
            }
            None => into.push(reveal),
        }
    }
}

/// Merges a later map delta into an earlier one for the same map.
pub fn merge_map_updates(into: &mut MapUpdate, next: MapUpdate) {
    debug_assert_eq!(into.map_id, next.map_id);
    merge_changes(&mut into.changes, next.changes);
    merge_reveals(&mut into.revealed_areas, next.revealed_areas);
    upsert_by(&mut into.tokens, next.tokens, |token| token.id);
}

/// Merges a later encounter delta into an earlier one for the same
/// encounter.
pub fn merge_encounter_updates(into: &mut EncounterUpdate, next: EncounterUpdate) {
    debug_assert_eq!(into.encounter_id, next.encounter_id);
    merge_changes(&mut into.changes, next.changes);
    upsert_by(&mut into.participants, next.participants, |p| p.character_id);
    upsert_by(&mut into.active_effects, next.active_effects, |e| e.id);
}

/// Folds `next` into the group's entries, or appends it when it cannot be
/// merged with any of them.
fn absorb(group: &mut Vec<QueuedBroadcast>, next: QueuedBroadcast) {
    if !next.message.kind().is_mergeable() {
        group.push(next);
        return;
    }
    let QueuedBroadcast {
        message,
        target,
        timestamp,
    } = next;
    let merged = match message {
        OutboundMessage::MapUpdate(update) => {
            let existing = group.iter_mut().find_map(|entry| match &mut entry.message {
                OutboundMessage::MapUpdate(u) if u.map_id == update.map_id => {
                    Some((u, &mut entry.timestamp))
                }
                _ => None,
            });
            match existing {
                Some((into, at)) => {
                    merge_map_updates(into, update);
                    *at = (*at).max(timestamp);
                    None
                }
                None => Some(OutboundMessage::MapUpdate(update)),
            }
        }
        OutboundMessage::EncounterUpdate(update) => {
            let existing = group.iter_mut().find_map(|entry| match &mut entry.message {
                OutboundMessage::EncounterUpdate(u) if u.encounter_id == update.encounter_id => {
                    Some((u, &mut entry.timestamp))
                }
                _ => None,
            });
            match existing {
                Some((into, at)) => {
                    merge_encounter_updates(into, update);
                    *at = (*at).max(timestamp);
                    None
                }
                None => Some(OutboundMessage::EncounterUpdate(update)),
            }
        }
        OutboundMessage::RuntimeState(changes) => match group.first_mut() {
            Some(QueuedBroadcast {
                message: OutboundMessage::RuntimeState(into),
                timestamp: at,
                ..
            }) => {
                merge_changes(into, changes);
                *at = (*at).max(timestamp);
                None
            }
            _ => Some(OutboundMessage::RuntimeState(changes)),
        },
        OutboundMessage::FullState(state) => {
            if let Some(entry) = group.first_mut() {
                entry.message = OutboundMessage::FullState(state);
                entry.timestamp = entry.timestamp.max(timestamp);
                None
            } else {
                Some(OutboundMessage::FullState(state))
            }
        }
        message => Some(message),
    };
    if let Some(message) = merged {
        group.push(QueuedBroadcast {
            message,
            target,
            timestamp,
        });
    }
}

/// Groups and merges a batch. The result holds one entry per merged
/// message, in send order.
#[must_use]
pub fn coalesce(entries: Vec<QueuedBroadcast>) -> Vec<QueuedBroadcast> {
    let mut groups: Vec<Vec<QueuedBroadcast>> = Vec::new();
    let mut index: HashMap<(BroadcastKind, BroadcastTarget), usize> = HashMap::new();
    for entry in entries {
        let key = (entry.message.kind(), entry.target.clone());
        match index.get(&key) {
            Some(&position) => absorb(&mut groups[position], entry),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![entry]);
            }
        }
    }
    groups.into_iter().flatten().collect()
}
