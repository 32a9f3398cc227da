//! Desync detection and repair across lockstep peers.
//!
//! The transport is out of scope; this module defines the protocol state
//! machine on top of an already-reliable channel. The authoritative peer
//! periodically samples a compact [`SyncLog`], broadcasts its digest, and
//! diffs acknowledgements. Persistent divergence is repaired by a full
//! snapshot resync. Desync is reported, never fatal.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::item::{Body, ItemId, PlayerId};
use crate::simulation::Simulation;

/// Identifies one connected peer on the session's channel.
pub type PeerId = u32;

/// Sync intervals an acknowledgement is awaited before the peer is
/// written off as unrecoverable.
pub const ACK_TIMEOUT_CHECKS: u32 = 10;

/// How many item samples a short check carries at most.
const MAX_ITEM_SAMPLES: usize = 10;

/// Compact, deterministic sample of simulation state.
///
/// Item samples are chosen by a fixed stride over the sorted ID list so
/// every peer samples the same items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncLog {
    tick: u64,
    items: Vec<ItemSample>,
    players: Vec<PlayerSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct ItemSample {
    id: ItemId,
    pos_bits: (i64, i64, i64),
    rotation_bits: i64,
    health: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct PlayerSample {
    id: PlayerId,
    ammunition: u32,
    mobiles: u32,
    facilities: u32,
    explored: u32,
}

impl SyncLog {
    /// Sample `sim` deterministically.
    #[must_use]
    pub fn sample(sim: &Simulation) -> Self {
        let ids = sim.items.sorted_ids();
        let stride = (ids.len() / MAX_ITEM_SAMPLES).max(1);
        let items = ids
            .iter()
            .step_by(stride)
            .take(MAX_ITEM_SAMPLES)
            .filter_map(|&id| {
                let item = sim.items.get(id)?;
                let health = match &item.body {
                    Body::Unit(unit) => unit.health,
                    Body::Shot(_) => 0,
                };
                Some(ItemSample {
                    id,
                    pos_bits: (
                        item.pos.x.to_bits(),
                        item.pos.y.to_bits(),
                        item.pos.z.to_bits(),
                    ),
                    rotation_bits: item.rotation.to_bits(),
                    health,
                })
            })
            .collect();
        let players = sim
            .players
            .iter()
            .map(|p| PlayerSample {
                id: p.id,
                ammunition: p.ammunition(crate::player::GENERIC_AMMO),
                mobiles: p.mobiles,
                facilities: p.facilities,
                explored: p.visibility.explored_count(),
            })
            .collect();
        Self {
            tick: sim.tick,
            items,
            players,
        }
    }

    /// Digest of the sample.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Name the first divergent field between two logs, for the desync
    /// report. `None` means the logs agree.
    #[must_use]
    pub fn first_divergence(&self, remote: &Self) -> Option<String> {
        if self.tick != remote.tick {
            return Some(format!(
                "tick: local {} remote {}",
                self.tick, remote.tick
            ));
        }
        if self.items.len() != remote.items.len() {
            return Some(format!(
                "item sample count: local {} remote {}",
                self.items.len(),
                remote.items.len()
            ));
        }
        for (local, remote) in self.items.iter().zip(&remote.items) {
            if local.id != remote.id {
                return Some(format!(
                    "item id: local {} remote {}",
                    local.id, remote.id
                ));
            }
            if local.pos_bits != remote.pos_bits {
                return Some(format!("item {} position", local.id));
            }
            if local.rotation_bits != remote.rotation_bits {
                return Some(format!("item {} rotation", local.id));
            }
            if local.health != remote.health {
                return Some(format!(
                    "item {} health: local {} remote {}",
                    local.id, local.health, remote.health
                ));
            }
        }
        if self.players.len() != remote.players.len() {
            return Some(format!(
                "player count: local {} remote {}",
                self.players.len(),
                remote.players.len()
            ));
        }
        for (local, remote) in self.players.iter().zip(&remote.players) {
            if local.ammunition != remote.ammunition {
                return Some(format!("player {} ammunition", local.id));
            }
            if local.mobiles != remote.mobiles {
                return Some(format!("player {} mobile count", local.id));
            }
            if local.facilities != remote.facilities {
                return Some(format!("player {} facility count", local.id));
            }
            if local.explored != remote.explored {
                return Some(format!("player {} explored cells", local.id));
            }
        }
        None
    }
}

/// Wire messages of the sync protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Authority broadcast: verify your state against this digest.
    Check { sync_id: u32, digest: u64 },
    /// Peer reply. The full log rides along only on mismatch.
    Ack {
        sync_id: u32,
        digest: u64,
        log: Option<SyncLog>,
    },
    /// Authority broadcast: discard state, load this snapshot.
    Resync { snapshot: Vec<u8> },
    /// Peer confirms the snapshot is loaded.
    ResyncAck,
    /// Authority resumes normal game-message flow.
    Unlock,
}

/// Result of recording one acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The peer's digest matched.
    InSync,
    /// The peer diverged; the report names the first divergent field.
    Diverged { peer: PeerId, report: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingCheck {
    log: SyncLog,
    digest: u64,
    awaiting: BTreeSet<PeerId>,
    age: u32,
}

/// Authority-side protocol state.
///
/// Peers use the free functions [`answer_check`] and [`apply_resync`];
/// all bookkeeping lives on the authoritative side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncChecker {
    peers: BTreeSet<PeerId>,
    next_sync_id: u32,
    pending: BTreeMap<u32, PendingCheck>,
    unrecoverable: BTreeSet<PeerId>,
    /// Peers still owing a resync ack while game messages are locked.
    locked_awaiting: Option<BTreeSet<PeerId>>,
}

impl SyncChecker {
    /// A checker for the given peer set.
    #[must_use]
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            peers: peers.into_iter().collect(),
            next_sync_id: 1,
            pending: BTreeMap::new(),
            unrecoverable: BTreeSet::new(),
            locked_awaiting: None,
        }
    }

    /// Peers written off after missing acknowledgements.
    #[must_use]
    pub fn unrecoverable_peers(&self) -> &BTreeSet<PeerId> {
        &self.unrecoverable
    }

    /// Whether game-message delivery is locked for a resync.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_awaiting.is_some()
    }

    /// Sample the simulation and open a new check. Returns the broadcast.
    pub fn begin_check(&mut self, sim: &Simulation) -> SyncMessage {
        let log = SyncLog::sample(sim);
        let digest = log.digest();
        let sync_id = self.next_sync_id;
        self.next_sync_id += 1;
        let awaiting: BTreeSet<PeerId> = self
            .peers
            .difference(&self.unrecoverable)
            .copied()
            .collect();
        self.pending.insert(
            sync_id,
            PendingCheck {
                log,
                digest,
                awaiting,
                age: 0,
            },
        );
        tracing::debug!(sync_id, digest, "Sync check opened");
        SyncMessage::Check { sync_id, digest }
    }

    /// Record a peer's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownSyncId`] for acks against a check that
    /// was never opened or already expired.
    pub fn record_ack(
        &mut self,
        peer: PeerId,
        sync_id: u32,
        digest: u64,
        log: Option<SyncLog>,
    ) -> Result<AckOutcome> {
        let check = self
            .pending
            .get_mut(&sync_id)
            .ok_or(GameError::UnknownSyncId(sync_id))?;
        check.awaiting.remove(&peer);

        if digest == check.digest {
            if check.awaiting.is_empty() {
                self.pending.remove(&sync_id);
            }
            return Ok(AckOutcome::InSync);
        }

        let report = log
            .as_ref()
            .and_then(|remote| check.log.first_divergence(remote))
            .unwrap_or_else(|| "digest mismatch, no log attached".to_string());
        tracing::warn!(peer, sync_id, %report, "Peer diverged");
        Ok(AckOutcome::Diverged { peer, report })
    }

    /// Age all open checks by one sync interval.
    ///
    /// Checks older than [`ACK_TIMEOUT_CHECKS`] expire; peers still owing
    /// an ack on an expired check are returned and flagged unrecoverable.
    pub fn advance_interval(&mut self) -> Vec<PeerId> {
        let mut newly_lost = Vec::new();
        let mut expired = Vec::new();
        for (&sync_id, check) in &mut self.pending {
            check.age += 1;
            if check.age >= ACK_TIMEOUT_CHECKS {
                expired.push(sync_id);
            }
        }
        for sync_id in expired {
            if let Some(check) = self.pending.remove(&sync_id) {
                for peer in check.awaiting {
                    if self.unrecoverable.insert(peer) {
                        tracing::warn!(peer, sync_id, "Peer missed ack window");
                        newly_lost.push(peer);
                    }
                }
            }
        }
        newly_lost
    }

    /// Open a full resync: lock game messages and snapshot the simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized.
    pub fn begin_resync(&mut self, sim: &Simulation) -> Result<SyncMessage> {
        let snapshot = sim.serialize()?;
        let awaiting: BTreeSet<PeerId> = self
            .peers
            .difference(&self.unrecoverable)
            .copied()
            .collect();
        tracing::info!(
            peers = awaiting.len(),
            bytes = snapshot.len(),
            "Full resync started"
        );
        self.locked_awaiting = Some(awaiting);
        self.pending.clear();
        Ok(SyncMessage::Resync { snapshot })
    }

    /// Record a resync acknowledgement. Returns `Some(Unlock)` once every
    /// reachable peer has confirmed.
    pub fn record_resync_ack(&mut self, peer: PeerId) -> Option<SyncMessage> {
        let awaiting = self.locked_awaiting.as_mut()?;
        awaiting.remove(&peer);
        if awaiting.is_empty() {
            self.locked_awaiting = None;
            tracing::info!("Full resync complete, game messages unlocked");
            Some(SyncMessage::Unlock)
        } else {
            None
        }
    }
}

/// Peer-side reply to a [`SyncMessage::Check`]. The full log is attached
/// only when the local digest disagrees.
#[must_use]
pub fn answer_check(sim: &Simulation, sync_id: u32, authority_digest: u64) -> SyncMessage {
    let log = SyncLog::sample(sim);
    let digest = log.digest();
    let log = if digest == authority_digest {
        None
    } else {
        tracing::warn!(
            sync_id,
            local = digest,
            remote = authority_digest,
            "Local state diverged from authority"
        );
        Some(log)
    };
    SyncMessage::Ack {
        sync_id,
        digest,
        log,
    }
}

/// Peer-side verification of a check, for embedding layers that want an
/// error value to surface.
///
/// # Errors
///
/// Returns [`GameError::DesyncDetected`] when the local digest disagrees
/// with the authority's.
pub fn verify_check(sim: &Simulation, authority_digest: u64) -> Result<()> {
    let local = SyncLog::sample(sim).digest();
    if local == authority_digest {
        Ok(())
    } else {
        Err(GameError::DesyncDetected {
            tick: sim.get_tick(),
            local_hash: local,
            remote_hash: authority_digest,
        })
    }
}

/// Peer-side handling of a [`SyncMessage::Resync`]: discard local state
/// and load the authority's snapshot.
///
/// # Errors
///
/// Returns an error if the snapshot fails to deserialize.
pub fn apply_resync(snapshot: &[u8]) -> Result<Simulation> {
    Simulation::deserialize(snapshot)
}
