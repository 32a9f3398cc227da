//! The tick driver: one deterministic simulation step at a time.
//!
//! # Determinism
//!
//! All operations here are fully deterministic:
//! - No floating-point math (fixed-point via [`Fixed`])
//! - No system randomness
//! - Consistent iteration order (sorted item IDs, ordered category lists)
//! - Same inputs always produce same outputs
//!
//! The per-tick step order is load-bearing: peers agree on state only
//! because every mutation happens at the same point of the same tick on
//! every machine.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ballistics::{FlightOutcome, ShotKind};
use crate::config::{RuleSet, UnitTypeId};
use crate::error::{GameError, Result};
use crate::events::{Event, EventListener, EventQueue};
use crate::item::{
    AdvancePhase, Body, Item, ItemId, PlayerId, Unit, Work, WorkClass, INVALID_ITEM,
    NEUTRAL_PLAYER,
};
use crate::map::GameMap;
use crate::math::{Fixed, Vec2Fixed, Vec3Fixed};
use crate::pathfinding::Pathfinder;
use crate::player::Player;
use crate::registry::ItemRegistry;
use crate::scheduler::Scheduler;
use crate::visibility::SightManager;

/// Maintenance intervals a wreck survives before final removal.
pub const REMOVE_WRECKAGES_TIME: u32 = 10;

/// The closed event vocabulary, declared at session start.
pub const EVENT_NAMES: &[&str] = &[
    "Advance",
    "AllFacilitiesDestroyed",
    "AllMobileUnitsDestroyed",
    "AllUnitsDestroyed",
    "CustomEvent",
    "CustomStringEvent",
    "GainedMinimap",
    "GameOver",
    "LostMinimap",
    "PlayerLost",
    "PlayerWon",
    "UnitWithTypeDestroyed",
    "UnitWithTypeProduced",
];

/// Summary of one advance call, for the embedding layer.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// The tick that was just executed.
    pub tick: u64,
    /// Units destroyed during this tick.
    pub destroyed: Vec<ItemId>,
    /// Item slots reclaimed at the tick boundary.
    pub reclaimed: usize,
}

/// The core game simulation for one session.
///
/// Owns all mutable game state. Constructed at session start, torn down at
/// session end; every component receives it explicitly instead of reaching
/// for a process-wide singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub(crate) tick: u64,
    pub(crate) phase: AdvancePhase,
    pub(crate) map: GameMap,
    pub(crate) rules: RuleSet,
    pub(crate) players: Vec<Player>,
    pub(crate) items: ItemRegistry,
    pub(crate) scheduler: Scheduler,
    pub(crate) sight: SightManager,
    pub(crate) events: EventQueue,
    pub(crate) pathfinder: Pathfinder,
    pub(crate) destroyed_this_tick: Vec<ItemId>,
}

impl Simulation {
    /// Create a simulation for `map` under `rules`.
    ///
    /// The neutral player (owner of wreckage effects) always exists.
    #[must_use]
    pub fn new(map: GameMap, rules: RuleSet) -> Self {
        let mut events = EventQueue::new();
        for name in EVENT_NAMES {
            events.declare(name);
        }
        let scheduler = Scheduler::new(rules.scheduler.clone());
        let neutral = Player::new(NEUTRAL_PLAYER, false, map.width(), map.height());
        Self {
            tick: 0,
            phase: AdvancePhase::A,
            map,
            rules,
            players: vec![neutral],
            items: ItemRegistry::new(),
            scheduler,
            sight: SightManager::new(),
            events,
            pathfinder: Pathfinder::new(),
            destroyed_this_tick: Vec::new(),
        }
    }

    /// Current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// The terrain grid.
    #[must_use]
    pub fn map(&self) -> &GameMap {
        &self.map
    }

    /// The item registry.
    #[must_use]
    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    /// Radar/jammer signal state.
    #[must_use]
    pub fn sight(&self) -> &SightManager {
        &self.sight
    }

    /// The event queue.
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Add an active player; returns its stable ID.
    pub fn add_player(&mut self) -> PlayerId {
        let id = self.players.len() as PlayerId;
        self.players
            .push(Player::new(id, true, self.map.width(), self.map.height()));
        id
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Mutable player lookup.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Look up an item.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Whether `player` currently has minimap capability: a constructed,
    /// powered, minimap-capable unit on the field.
    #[must_use]
    pub fn player_has_minimap(&self, player: PlayerId) -> bool {
        let powered = self
            .player(player)
            .is_some_and(|p| p.power_charge > Fixed::ZERO);
        if !powered {
            return false;
        }
        self.items.sorted_ids().into_iter().any(|id| {
            if self.items.is_destroyed(id) {
                return false;
            }
            self.items.get(id).is_some_and(|item| {
                item.owner == player
                    && item
                        .as_unit()
                        .is_some_and(|u| u.supports_minimap && u.is_constructed())
            })
        })
    }

    /// Create a unit of `type_id` for `owner` at `pos`.
    ///
    /// # Errors
    ///
    /// Rejects unknown types, unknown owners and off-map positions.
    pub fn create_unit(
        &mut self,
        owner: PlayerId,
        type_id: UnitTypeId,
        pos: Vec2Fixed,
    ) -> Result<ItemId> {
        let unit_type = self
            .rules
            .unit_type(type_id)
            .ok_or(GameError::UnknownUnitType(type_id.0))?;
        if !self.map.on_map(pos) {
            return Err(GameError::InvalidPosition {
                x: pos.x.to_num::<i64>(),
                y: pos.y.to_num::<i64>(),
            });
        }
        if self.player(owner).is_none() {
            return Err(GameError::PlayerNotFound(owner));
        }

        let unit = Unit::from_type(unit_type);
        let is_facility = unit.is_facility;
        let sight_range = unit.sight_range;
        let has_radar = unit.radar.is_some();
        let has_jammer = unit.jammer.is_some();
        let z = self.map.height_at_point(pos);
        let item = Item {
            id: INVALID_ITEM,
            owner,
            pos: Vec3Fixed::new(pos.x, pos.y, z),
            velocity: Vec3Fixed::ZERO,
            rotation: Fixed::ZERO,
            body: Body::Unit(unit),
        };
        let class = item.work_class(self.phase);
        let (cx, cy) = item.cell();
        let id = self.items.insert(item);

        self.map.occupy(id, cx, cy);
        self.scheduler.add(id, class);
        if let Some(player) = self.player_mut(owner) {
            if is_facility {
                player.facilities += 1;
            } else {
                player.mobiles += 1;
            }
            player.visibility.apply_sight(cx, cy, sight_range);
        }
        if let Some(item) = self.items.get_mut(id) {
            if let Some(unit) = item.as_unit_mut() {
                unit.sight_applied = true;
            }
        }
        if has_radar {
            self.sight.add_radar(owner, id);
        }
        if has_jammer {
            self.sight.add_jammer(owner, id);
        }
        // New emitters and new targets both change the signal picture right
        // away; the periodic bulk pass remains authoritative.
        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        for pid in player_ids {
            if pid != owner {
                self.sight.recompute_unit(&self.items, id, pid);
            }
        }
        Ok(id)
    }

    /// Remove an item from every index and stage its slot for reclamation
    /// at the next tick boundary.
    pub fn remove_item(&mut self, id: ItemId) {
        let Some(item) = self.items.get(id) else {
            tracing::error!(id, "remove_item on a vanished item");
            return;
        };
        let owner = item.owner;
        let (cx, cy) = item.cell();
        let was_destroyed = self.items.is_destroyed(id);
        let unit_info = item
            .as_unit()
            .map(|u| (u.sight_applied, u.pending_sight_update, u.sight_range, u.is_facility));

        if let Some((sight_applied, pending, sight_range, is_facility)) = unit_info {
            if sight_applied {
                let (sx, sy) = pending.unwrap_or((cx, cy));
                if let Some(player) = self.player_mut(owner) {
                    player.visibility.remove_sight(sx, sy, sight_range);
                }
            }
            // Wrecks already left the per-player counts at destruction.
            if !was_destroyed {
                if let Some(player) = self.player_mut(owner) {
                    if is_facility {
                        player.facilities = player.facilities.saturating_sub(1);
                    } else {
                        player.mobiles = player.mobiles.saturating_sub(1);
                    }
                }
            }
        }

        self.map.vacate(id, cx, cy);
        self.scheduler.remove_from_all(id);
        self.sight.forget_unit(owner, id);
        self.items.remove(id);
    }

    /// Advance the simulation by one tick.
    ///
    /// # Step Order
    ///
    /// 1. Per-player power charge factors
    /// 2. Weapon reload pass (every 5th tick), then the work-class
    ///    scheduler with its sync and migration flush
    /// 3. Pathfinder housekeeping
    /// 4. Notify live units of units destroyed this tick
    /// 5. Per-player power discharge recompute
    /// 6. Every 20th tick (`tick % 20 == 7`): pending sight updates
    /// 7. Every 40th tick (`tick % 40 == 18`): radar/jammer bulk
    ///    recompute; other ticks apply incremental deltas for units that
    ///    changed cells
    /// 8. Generic ammunition regeneration
    /// 9. Every 39th tick: wreckage timers and the inactive-shot sweep
    /// 10. Minimap capability diff events
    ///
    /// Steps 6, 7 and 9 are phase-offset against each other so their
    /// O(items) scans land on different ticks.
    pub fn advance(&mut self) -> TickSummary {
        let tick = self.tick;
        let phase = self.phase;
        self.destroyed_this_tick.clear();

        let minimap_before = self.record_minimap_capability();

        // 1. Power charge factors for this tick.
        self.update_power_charges();

        // 2. Reload, scheduler pass, sync commit, migration flush.
        if tick % 5 == 0 {
            self.reload_weapons(5);
        }
        self.run_scheduler(tick, phase);
        self.sync_work_slots(phase);
        {
            let Self {
                ref mut scheduler,
                ref items,
                ..
            } = *self;
            scheduler.flush_changes(|id| items.get(id).map(|item| item.work_class(phase)));
        }

        // 3. Pathfinder housekeeping.
        self.pathfinder.advance();

        // 4. Reactive behaviors see a consistent same-tick view of deaths.
        self.notify_destroyed(phase);

        // 5. Post-tick power recompute; next tick's factor reflects this
        // tick's losses.
        self.update_power_charges();

        // 6. Sight deltas for units that moved.
        if tick % 20 == 7 {
            self.flush_sight_updates();
        }

        // 7. Authoritative radar/jammer recompute; incremental deltas
        // for flagged movers on every other tick.
        if tick % 40 == 18 {
            self.update_radars();
        } else {
            self.flush_radar_updates();
        }

        // 8. Ammunition regeneration.
        for player in &mut self.players {
            if player.is_active {
                player.regenerate_ammunition();
            }
        }

        // 9. Wreckage timers and the shot sweep. Phase-offset past tick
        // zero so the first interval is a full one.
        if tick > 0 && tick % 39 == 0 {
            self.sweep_wreckage_and_shots();
        }

        // 10. Minimap capability diff.
        self.emit_minimap_events(&minimap_before);

        self.tick += 1;
        self.phase = phase.other();
        let reclaimed = self.items.flush_removals();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        TickSummary {
            tick,
            destroyed: self.destroyed_this_tick.clone(),
            reclaimed,
        }
    }

    /// One delivery pass over the event queue. Invoked by the embedding
    /// layer once per tick; deliberately not part of [`advance`](Self::advance).
    pub fn deliver_events(&mut self, listeners: &mut [&mut dyn EventListener]) {
        self.events.deliver_pending(listeners);
    }

    fn record_minimap_capability(&mut self) -> Vec<(PlayerId, bool)> {
        let current: Vec<(PlayerId, bool)> = self
            .players
            .iter()
            .map(|p| (p.id, self.player_has_minimap(p.id)))
            .collect();
        for (id, has) in &current {
            if let Some(player) = self.player_mut(*id) {
                player.had_minimap = *has;
            }
        }
        current
    }

    fn update_power_charges(&mut self) {
        let mut totals: BTreeMap<PlayerId, (u32, u32)> = BTreeMap::new();
        for id in self.items.sorted_ids() {
            if self.items.is_destroyed(id) {
                continue;
            }
            let Some(item) = self.items.get(id) else { continue };
            let Some(unit) = item.as_unit() else { continue };
            if !unit.is_constructed() {
                continue;
            }
            let entry = totals.entry(item.owner).or_insert((0, 0));
            entry.0 += unit.power_generated;
            entry.1 += unit.power_consumed;
        }
        for player in &mut self.players {
            let (generated, consumed) = totals.get(&player.id).copied().unwrap_or((0, 0));
            player.update_power_charge(generated, consumed);
        }
    }

    fn reload_weapons(&mut self, elapsed: u32) {
        for id in self.items.sorted_ids() {
            if let Some(item) = self.items.get_mut(id) {
                if let Some(unit) = item.as_unit_mut() {
                    unit.reload = unit.reload.saturating_sub(elapsed);
                }
            }
        }
    }

    /// Run every scheduled category's advance list for this tick.
    fn run_scheduler(&mut self, tick: u64, phase: AdvancePhase) {
        for class in self.scheduler.classes() {
            if !self.scheduler.runs_on(class, tick) {
                continue;
            }
            for id in self.scheduler.members(class) {
                // Items deleted by a side effect of an earlier item simply
                // no-op here.
                if !self.items.contains(id) {
                    continue;
                }
                match class {
                    WorkClass::Default => self.advance_shot(id),
                    WorkClass::Unit(_) => self.advance_unit(id, phase),
                }
                self.apply_velocity(id);
            }
        }
    }

    /// The sync step: every live unit commits which behavior slot the next
    /// tick executes.
    fn sync_work_slots(&mut self, phase: AdvancePhase) {
        for id in self.items.sorted_ids() {
            if let Some(item) = self.items.get_mut(id) {
                if let Some(unit) = item.as_unit_mut() {
                    unit.work.commit(phase);
                }
            }
        }
    }

    fn advance_shot(&mut self, id: ItemId) {
        let outcome;
        let mut detonation = None;
        {
            let Some(item) = self.items.get_mut(id) else { return };
            let pos = item.pos;
            let owner = item.owner;
            let Some(shot) = item.as_shot_mut() else { return };
            outcome = shot.advance_flight(pos);
            if let FlightOutcome::Detonate(at) = outcome {
                shot.active = false;
                detonation = Some((at, shot.damage, shot.damage_range, shot.full_damage_range, owner));
            }
        }

        match outcome {
            FlightOutcome::InFlight(new_pos) => self.move_item_to(id, new_pos),
            FlightOutcome::Detonate(_) => {
                if let Some((at, damage, range, full, owner)) = detonation {
                    self.move_item_to(id, at);
                    self.explosion(at, damage, range, full, owner);
                }
            }
            FlightOutcome::Idle => self.check_mine_trigger(id),
        }
    }

    /// A mine detonates when a hostile unit walks into its cell.
    fn check_mine_trigger(&mut self, id: ItemId) {
        let trigger;
        {
            let Some(item) = self.items.get(id) else { return };
            let Some(shot) = item.as_shot() else { return };
            if shot.kind != ShotKind::Mine || !shot.active {
                return;
            }
            let owner = item.owner;
            let (cx, cy) = item.cell();
            let occupants = self
                .map
                .cell(cx, cy)
                .map(|cell| cell.occupancy.clone())
                .unwrap_or_default();
            trigger = occupants.into_iter().any(|other| {
                other != id
                    && !self.items.is_destroyed(other)
                    && self.items.get(other).is_some_and(|o| {
                        o.owner != owner && o.owner != NEUTRAL_PLAYER && o.as_unit().is_some()
                    })
            });
        }
        if !trigger {
            return;
        }

        let Some(item) = self.items.get_mut(id) else { return };
        let pos = item.pos;
        let owner = item.owner;
        let Some(shot) = item.as_shot_mut() else { return };
        shot.active = false;
        let (damage, range, full) = (shot.damage, shot.damage_range, shot.full_damage_range);
        self.explosion(pos, damage, range, full, owner);
    }

    fn advance_unit(&mut self, id: ItemId, phase: AdvancePhase) {
        let work = match self.items.get(id).and_then(Item::as_unit) {
            Some(unit) => unit.work.active(phase),
            None => return,
        };
        match work {
            Work::None | Work::Destroyed => {}
            Work::Idle => self.advance_idle(id, phase),
            Work::Move => self.advance_move(id, phase),
            Work::Attack => self.advance_attack(id, phase),
            Work::Follow => self.advance_follow(id, phase),
            Work::Constructed => self.advance_construction(id, phase),
            Work::Turn => self.advance_turn(id, phase),
            Work::Plugin => self.schedule_work(id, phase, Work::Idle),
        }
    }

    /// Idle units with a weapon scan for the nearest visible enemy.
    fn advance_idle(&mut self, id: ItemId, phase: AdvancePhase) {
        let (pos, owner, sight_range, armed) = {
            let Some(item) = self.items.get(id) else { return };
            let Some(unit) = item.as_unit() else { return };
            (
                item.pos,
                item.owner,
                unit.sight_range,
                unit.weapon.is_some() && unit.is_constructed(),
            )
        };
        if !armed {
            return;
        }

        let range_sq = Fixed::from_num(sight_range) * Fixed::from_num(sight_range);
        let mut best: Option<(Fixed, ItemId)> = None;
        for other in self.items.sorted_ids() {
            if other == id || self.items.is_destroyed(other) {
                continue;
            }
            let Some(candidate) = self.items.get(other) else { continue };
            if candidate.owner == owner || candidate.owner == NEUTRAL_PLAYER {
                continue;
            }
            if candidate.as_unit().is_none() {
                continue;
            }
            let dist_sq = candidate.pos.distance_squared(pos);
            if dist_sq > range_sq {
                continue;
            }
            if best.map_or(true, |(b, _)| dist_sq < b) {
                best = Some((dist_sq, other));
            }
        }

        if let Some((_, target)) = best {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.target = Some(target);
            }
            self.schedule_work(id, phase, Work::Attack);
        }
    }

    fn advance_move(&mut self, id: ItemId, phase: AdvancePhase) {
        let (pos, speed, is_flying, destination) = {
            let Some(item) = self.items.get(id) else { return };
            let Some(unit) = item.as_unit() else { return };
            (item.pos, unit.speed, unit.is_flying, unit.move_destination)
        };
        let Some(dest) = destination else {
            self.stop_moving(id, phase);
            return;
        };

        let step = self
            .pathfinder
            .next_step(&self.map, pos.xy(), dest.xy(), speed, is_flying);
        match step {
            Some(step) => {
                if let Some(item) = self.items.get_mut(id) {
                    item.velocity = Vec3Fixed::new(step.x, step.y, Fixed::ZERO);
                }
            }
            None => self.stop_moving(id, phase),
        }
    }

    fn stop_moving(&mut self, id: ItemId, phase: AdvancePhase) {
        if let Some(item) = self.items.get_mut(id) {
            item.velocity = Vec3Fixed::ZERO;
            if let Some(unit) = item.as_unit_mut() {
                unit.move_destination = None;
            }
        }
        self.schedule_work(id, phase, Work::Idle);
    }

    fn advance_attack(&mut self, id: ItemId, phase: AdvancePhase) {
        let (pos, owner, target, weapon, reload) = {
            let Some(item) = self.items.get(id) else { return };
            let Some(unit) = item.as_unit() else { return };
            (item.pos, item.owner, unit.target, unit.weapon.clone(), unit.reload)
        };
        let Some(weapon) = weapon else {
            self.schedule_work(id, phase, Work::Idle);
            return;
        };
        let target_pos = target.and_then(|t| {
            if self.items.is_destroyed(t) {
                None
            } else {
                self.items.get(t).filter(|i| i.as_unit().is_some()).map(|i| i.pos)
            }
        });
        let Some(target_pos) = target_pos else {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.target = None;
            }
            self.schedule_work(id, phase, Work::Idle);
            return;
        };

        let dist_sq = pos.distance_squared(target_pos);
        if dist_sq > weapon.range * weapon.range {
            // Close the distance; stay in the attack category.
            let (speed, is_flying) = {
                let unit = self.items.get(id).and_then(Item::as_unit);
                match unit {
                    Some(u) => (u.speed, u.is_flying),
                    None => return,
                }
            };
            let step = self
                .pathfinder
                .next_step(&self.map, pos.xy(), target_pos.xy(), speed, is_flying);
            if let Some(item) = self.items.get_mut(id) {
                item.velocity = match step {
                    Some(s) => Vec3Fixed::new(s.x, s.y, Fixed::ZERO),
                    None => Vec3Fixed::ZERO,
                };
            }
            return;
        }

        if let Some(item) = self.items.get_mut(id) {
            item.velocity = Vec3Fixed::ZERO;
        }
        if reload > 0 {
            return;
        }

        // One round per shot, drawn from the owner's pool.
        let rounds = self
            .player_mut(owner)
            .map_or(0, |p| p.take_ammunition(&weapon.ammunition, 1));
        if rounds == 0 {
            return;
        }

        let instant = match weapon.shot_kind {
            crate::config::WeaponShotKind::Bullet => true,
            crate::config::WeaponShotKind::Rocket => {
                if weapon.speed <= Fixed::ZERO {
                    tracing::warn!(
                        weapon = %weapon.name,
                        "rocket weapon has zero flight speed; resolving as instant shot"
                    );
                    true
                } else {
                    false
                }
            }
            crate::config::WeaponShotKind::Mine => false,
        };
        if instant {
            // Instant shots resolve in the tick they are fired.
            self.explosion(
                target_pos,
                weapon.damage,
                weapon.damage_range,
                weapon.full_damage_range,
                owner,
            );
        } else {
            let shot = crate::ballistics::Shot::fired(&weapon, pos, target_pos);
            self.spawn_shot(owner, pos, shot);
        }
        if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
            unit.reload = weapon.reload_ticks;
        }
    }

    /// Followers trail their leader at a respectful distance.
    fn advance_follow(&mut self, id: ItemId, phase: AdvancePhase) {
        let (pos, target, speed, is_flying) = {
            let Some(item) = self.items.get(id) else { return };
            let Some(unit) = item.as_unit() else { return };
            (item.pos, unit.target, unit.speed, unit.is_flying)
        };
        let leader_pos = target.and_then(|t| {
            if self.items.is_destroyed(t) {
                None
            } else {
                self.items.get(t).map(|i| i.pos)
            }
        });
        let Some(leader_pos) = leader_pos else {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.target = None;
            }
            self.schedule_work(id, phase, Work::Idle);
            return;
        };

        let keep_distance = Fixed::from_num(2);
        let velocity = if pos.distance_squared(leader_pos) <= keep_distance * keep_distance {
            Vec3Fixed::ZERO
        } else {
            match self
                .pathfinder
                .next_step(&self.map, pos.xy(), leader_pos.xy(), speed, is_flying)
            {
                Some(step) => Vec3Fixed::new(step.x, step.y, Fixed::ZERO),
                None => Vec3Fixed::ZERO,
            }
        };
        if let Some(item) = self.items.get_mut(id) {
            item.velocity = velocity;
        }
    }

    fn advance_construction(&mut self, id: ItemId, phase: AdvancePhase) {
        let finished = {
            let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) else {
                return;
            };
            unit.construction_progress += 1;
            unit.is_constructed()
        };
        if finished {
            self.schedule_work(id, phase, Work::Idle);
        }
    }

    /// Turning snaps through 45 degree steps toward the destination and
    /// hands over to the move behavior once aligned.
    fn advance_turn(&mut self, id: ItemId, phase: AdvancePhase) {
        let (pos, rotation, destination) = {
            let Some(item) = self.items.get(id) else { return };
            let Some(unit) = item.as_unit() else { return };
            (item.pos, item.rotation, unit.move_destination)
        };
        let Some(dest) = destination else {
            self.schedule_work(id, phase, Work::Idle);
            return;
        };

        let desired = octant_angle(dest.x - pos.x, dest.y - pos.y);
        if rotation == desired {
            self.schedule_work(id, phase, Work::Move);
            return;
        }
        let step = Fixed::from_num(45);
        let new_rotation = if (desired - rotation).abs() <= step {
            desired
        } else if desired > rotation {
            rotation + step
        } else {
            rotation - step
        };
        if let Some(item) = self.items.get_mut(id) {
            item.rotation = new_rotation;
        }
    }

    /// Schedule a work change on the item's inactive slot and buffer the
    /// category migration for the end-of-tick flush.
    pub(crate) fn schedule_work(&mut self, id: ItemId, phase: AdvancePhase, work: Work) {
        if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
            unit.work.schedule(phase, work);
        }
        self.scheduler.request_change(id);
    }

    /// Order a unit to move; it turns toward the destination first.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ItemNotFound`] for stale IDs.
    pub fn order_move(&mut self, id: ItemId, dest: Vec2Fixed) -> Result<()> {
        let phase = self.phase;
        let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) else {
            return Err(GameError::ItemNotFound(id));
        };
        unit.move_destination = Some(Vec3Fixed::from_xy(dest));
        unit.work.schedule(phase, Work::Turn);
        self.scheduler.request_change(id);
        Ok(())
    }

    /// Order a unit to attack a target.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ItemNotFound`] for stale IDs.
    pub fn order_attack(&mut self, id: ItemId, target: ItemId) -> Result<()> {
        let phase = self.phase;
        let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) else {
            return Err(GameError::ItemNotFound(id));
        };
        unit.target = Some(target);
        unit.work.schedule(phase, Work::Attack);
        self.scheduler.request_change(id);
        Ok(())
    }

    /// Order a unit to follow another, trailing it at a short distance.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ItemNotFound`] for stale IDs.
    pub fn order_follow(&mut self, id: ItemId, target: ItemId) -> Result<()> {
        let phase = self.phase;
        let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) else {
            return Err(GameError::ItemNotFound(id));
        };
        unit.target = Some(target);
        unit.work.schedule(phase, Work::Follow);
        self.scheduler.request_change(id);
        Ok(())
    }

    /// Apply a non-zero velocity after an item's behavior ran.
    fn apply_velocity(&mut self, id: ItemId) {
        let Some(item) = self.items.get(id) else { return };
        if item.velocity == Vec3Fixed::ZERO {
            return;
        }
        let new_pos = item.pos + item.velocity;
        self.move_item_to(id, new_pos);
    }

    /// Move an item, maintaining cell occupancy and scheduling the sight
    /// and radar updates a cell change requires.
    ///
    /// Ground units ride the terrain: their altitude is refreshed from
    /// the height lattice at the new position. Flyers and shots keep the
    /// z their behavior computed.
    pub(crate) fn move_item_to(&mut self, id: ItemId, new_pos: Vec3Fixed) {
        let max_x = Fixed::from_num(self.map.width()) - Fixed::DELTA;
        let max_y = Fixed::from_num(self.map.height()) - Fixed::DELTA;
        let clamped_x = new_pos.x.clamp(Fixed::ZERO, max_x);
        let clamped_y = new_pos.y.clamp(Fixed::ZERO, max_y);
        let ground = self
            .map
            .height_at_point(Vec2Fixed::new(clamped_x, clamped_y));
        let (old_cell, new_cell, is_unit);
        {
            let Some(item) = self.items.get_mut(id) else { return };
            old_cell = item.cell();
            let rides_terrain = item.as_unit().is_some_and(|u| !u.is_flying);
            item.pos = Vec3Fixed::new(
                clamped_x,
                clamped_y,
                if rides_terrain { ground } else { new_pos.z },
            );
            new_cell = item.cell();
            is_unit = item.as_unit().is_some();
            if old_cell != new_cell {
                if let Some(unit) = item.as_unit_mut() {
                    // Keep the pre-move origin if an update is already
                    // pending; removal must not double-count.
                    if unit.pending_sight_update.is_none() {
                        unit.pending_sight_update = Some(old_cell);
                    }
                    unit.pending_radar_update = true;
                }
            }
        }
        if old_cell != new_cell {
            self.map.vacate(id, old_cell.0, old_cell.1);
            self.map.occupy(id, new_cell.0, new_cell.1);
            let _ = is_unit;
        }
    }

    /// Clear targets that died this tick so reactive behaviors never chase
    /// a wreck across a tick boundary.
    fn notify_destroyed(&mut self, phase: AdvancePhase) {
        if self.destroyed_this_tick.is_empty() {
            return;
        }
        let dead: BTreeSet<ItemId> = self.destroyed_this_tick.iter().copied().collect();
        let mut orphaned = Vec::new();
        for id in self.items.sorted_ids() {
            if self.items.is_destroyed(id) {
                continue;
            }
            let Some(unit) = self.items.get(id).and_then(Item::as_unit) else {
                continue;
            };
            if unit.target.is_some_and(|t| dead.contains(&t)) {
                orphaned.push(id);
            }
        }
        for id in orphaned {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.target = None;
            }
            self.schedule_work(id, phase, Work::Idle);
        }
    }

    /// Step 6: apply buffered sight deltas for every unit that changed
    /// cells since the last pass.
    fn flush_sight_updates(&mut self) {
        let mut updates = Vec::new();
        for id in self.items.sorted_ids() {
            let Some(item) = self.items.get(id) else { continue };
            let Some(unit) = item.as_unit() else { continue };
            if let Some((ox, oy)) = unit.pending_sight_update {
                let (cx, cy) = item.cell();
                updates.push((id, item.owner, ox, oy, cx, cy, unit.sight_range, unit.sight_applied));
            }
        }
        for (id, owner, ox, oy, cx, cy, range, applied) in updates {
            if applied {
                if let Some(player) = self.player_mut(owner) {
                    player.visibility.update_sight(ox, oy, cx, cy, range);
                }
            }
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.pending_sight_update = None;
            }
        }
    }

    /// Step 7: the authoritative radar/jammer recompute.
    fn update_radars(&mut self) {
        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        self.sight.update_all(&self.items, &player_ids);
        for id in self.items.sorted_ids() {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.pending_radar_update = false;
            }
        }
    }

    /// Step 7 (between bulk passes): recompute signals for units that
    /// changed cells since the last pass.
    ///
    /// The flag on the unit dedups repeat moves within an interval. A
    /// flagged radar or jammer carrier dirties everything inside its
    /// emitter range as well, since its move shifts their signals too.
    fn flush_radar_updates(&mut self) {
        let flagged: Vec<ItemId> = self
            .items
            .sorted_ids()
            .into_iter()
            .filter(|&id| {
                self.items
                    .get(id)
                    .and_then(Item::as_unit)
                    .is_some_and(|u| u.pending_radar_update)
            })
            .collect();
        if flagged.is_empty() {
            return;
        }

        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        let mut dirty: BTreeSet<ItemId> = BTreeSet::new();
        for &id in &flagged {
            dirty.insert(id);
            let Some(item) = self.items.get(id) else { continue };
            let Some(unit) = item.as_unit() else { continue };
            let emitter_range = match (&unit.radar, &unit.jammer) {
                (Some(r), Some(j)) => Some(r.range.max(j.range)),
                (Some(r), None) => Some(r.range),
                (None, Some(j)) => Some(j.range),
                (None, None) => None,
            };
            if let Some(range) = emitter_range {
                dirty.extend(self.map.units_in_circle(item.pos.xy(), range));
            }
        }

        for id in dirty {
            let Some(item) = self.items.get(id) else { continue };
            if item.as_unit().is_none() || self.items.is_destroyed(id) {
                continue;
            }
            let owner = item.owner;
            for &player in &player_ids {
                if player != owner {
                    self.sight.recompute_unit(&self.items, id, player);
                }
            }
        }

        for &id in &flagged {
            if let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) {
                unit.pending_radar_update = false;
            }
        }
    }

    /// Step 9: age wrecks, purge expired ones, sweep spent shots.
    fn sweep_wreckage_and_shots(&mut self) {
        for id in self.items.destroyed_ids() {
            let expired = {
                let Some(unit) = self.items.get_mut(id).and_then(Item::as_unit_mut) else {
                    continue;
                };
                unit.deletion_timer += 1;
                unit.deletion_timer >= REMOVE_WRECKAGES_TIME
            };
            if expired {
                self.remove_item(id);
            }
        }

        let spent: Vec<ItemId> = self
            .items
            .sorted_ids()
            .into_iter()
            .filter(|&id| {
                self.items
                    .get(id)
                    .and_then(Item::as_shot)
                    .is_some_and(|shot| !shot.active)
            })
            .collect();
        for id in spent {
            self.remove_item(id);
        }
    }

    /// Step 10: diff each player's minimap capability against the start of
    /// the tick.
    fn emit_minimap_events(&mut self, before: &[(PlayerId, bool)]) {
        for &(player, had) in before {
            if player == NEUTRAL_PLAYER {
                continue;
            }
            let has = self.player_has_minimap(player);
            if has && !had {
                let _ = self
                    .events
                    .enqueue(Event::new("GainedMinimap").with_player(player));
            } else if !has && had {
                let _ = self
                    .events
                    .enqueue(Event::new("LostMinimap").with_player(player));
            }
        }
    }

    /// Hash of the simulation state for desync detection.
    ///
    /// Two simulations with identical state produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        (self.phase == AdvancePhase::A).hash(&mut hasher);

        let ids = self.items.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            let Some(item) = self.items.get(id) else { continue };
            id.hash(&mut hasher);
            item.pos.x.to_bits().hash(&mut hasher);
            item.pos.y.to_bits().hash(&mut hasher);
            item.pos.z.to_bits().hash(&mut hasher);
            item.velocity.x.to_bits().hash(&mut hasher);
            item.velocity.y.to_bits().hash(&mut hasher);
            item.rotation.to_bits().hash(&mut hasher);
            match &item.body {
                Body::Unit(unit) => {
                    unit.health.hash(&mut hasher);
                    unit.shields.hash(&mut hasher);
                    unit.reload.hash(&mut hasher);
                    unit.work.current(self.phase).hash(&mut hasher);
                    unit.construction_progress.hash(&mut hasher);
                    unit.deletion_timer.hash(&mut hasher);
                }
                Body::Shot(shot) => {
                    shot.active.hash(&mut hasher);
                    shot.damage.hash(&mut hasher);
                }
            }
        }

        for player in &self.players {
            player.id.hash(&mut hasher);
            player.mobiles.hash(&mut hasher);
            player.facilities.hash(&mut hasher);
            player
                .ammunition(crate::player::GENERIC_AMMO)
                .hash(&mut hasher);
            player.power_charge.to_bits().hash(&mut hasher);
            player.visibility.explored_count().hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the full simulation state for snapshots and resync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Restore a simulation from serialized state.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

/// Coarse angle (degrees, multiples of 45) toward a delta vector.
fn octant_angle(dx: Fixed, dy: Fixed) -> Fixed {
    let east = dx > Fixed::ZERO;
    let west = dx < Fixed::ZERO;
    let south = dy > Fixed::ZERO;
    let north = dy < Fixed::ZERO;
    let degrees = match (east, west, south, north) {
        (true, _, false, false) => 0,
        (true, _, true, _) => 45,
        (false, false, true, _) => 90,
        (_, true, true, _) => 135,
        (_, true, false, false) => 180,
        (_, true, _, true) => 225,
        (false, false, _, true) => 270,
        (true, _, _, true) => 315,
        _ => 0,
    };
    Fixed::from_num(degrees)
}
