//! Protocol engine.
//!
//! A node owns all mutable knowledge about other peers and keeps it sorted
//! into three classes:
//!
//! - *direct* neighbors lie inside the local entity's AOI and are what the
//!   application ultimately cares about;
//! - *binding* neighbors are the nearest known peer in each of the four
//!   quadrants around the local entity, forming the structural backbone that
//!   keeps the overlay connected no matter how small the AOI is;
//! - *temporary* neighbors hold the local entity as one of *their* binding
//!   neighbors and therefore must keep receiving updates, even when they
//!   are otherwise out of range.
//!
//! A receive loop and a periodic maintenance timer both mutate this state;
//! each takes one exclusive lock for the whole handler or the whole cycle,
//! so neither ever observes a half-rebuilt neighbor table.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::I64Vec2;

use crate::config::NodeConfig;
use crate::entity::{Entity, RemoteEntity};
use crate::error::Error;
use crate::identifier::Identifier;
use crate::position::{Position, QUADRANTS};
use crate::protocol::Packet;
use crate::transport::Endpoint;

/// A participant in the overlay network.
///
/// Created with the local entity, a node enters the network through
/// [`Node::join`], either via a peer that already participates or, with
/// `None`, as the first node of a new network. The hosting application
/// moves the local entity between maintenance cycles and polls
/// [`Node::entities_in_aoi`] for everything currently in range.
pub struct Node {
    config: NodeConfig,
    shared: Arc<Shared>,
    endpoint: Option<Arc<Endpoint>>,
    running: Arc<AtomicBool>,
    receive_loop: Option<JoinHandle<()>>,
    update_loop: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<State>,
    joined: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Node {
    pub fn new(entity: Entity, config: NodeConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(State::new(entity)),
                joined: Condvar::new(),
            }),
            endpoint: None,
            running: Arc::new(AtomicBool::new(true)),
            receive_loop: None,
            update_loop: None,
        }
    }

    /// Binds the local endpoint and enters the network.
    ///
    /// With a bootstrap peer, the join request is routed geographically to
    /// the node nearest the local entity's position and this call blocks
    /// until that node's acknowledgement arrives. There is no retry and no
    /// timeout: an unreachable bootstrap peer blocks the caller
    /// indefinitely. With `None` a new network is created and the call
    /// returns immediately.
    ///
    /// Binding port 0 selects an ephemeral port; the local entity's
    /// identifier is updated to the actually bound address.
    pub fn join(&mut self, bootstrap: Option<Identifier>) -> Result<(), Error> {
        if self.endpoint.is_some() {
            return Err(Error::AlreadyJoined);
        }

        let local = self.shared.lock().local.identifier;
        let endpoint = Arc::new(Endpoint::bind(local).map_err(Error::Bind)?);
        self.shared.lock().local.identifier = endpoint.local_identifier();

        let receive = {
            let endpoint = Arc::clone(&endpoint);
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&self.running);
            thread::spawn(move || receive_loop(&endpoint, &shared, &running))
        };
        self.receive_loop = Some(receive);

        if let Some(bootstrap) = bootstrap {
            let request = {
                let state = self.shared.lock();
                Packet::Join {
                    subject: state.local.identifier,
                    position: state.local.position.current(),
                    aoi_radius: state.local.aoi_radius,
                }
            };
            log::info!(
                "{}: joining network via {}",
                endpoint.local_identifier(),
                bootstrap
            );
            endpoint.send(&request, bootstrap);

            let mut state = self.shared.lock();
            while !state.connected {
                state = self
                    .shared
                    .joined
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            log::info!("{}: join acknowledged", endpoint.local_identifier());
        } else {
            log::info!("{}: created new network", endpoint.local_identifier());
            self.shared.lock().connected = true;
        }

        let update = {
            let endpoint = Arc::clone(&endpoint);
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&self.running);
            let config = self.config.clone();
            thread::spawn(move || update_loop(&endpoint, &shared, &running, &config))
        };
        self.update_loop = Some(update);

        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Point-in-time copy of every entity currently inside the local AOI.
    pub fn entities_in_aoi(&self) -> Vec<Entity> {
        let state = self.shared.lock();
        state
            .direct
            .iter()
            .filter_map(|id| state.neighbors.get(id))
            .map(|neighbor| neighbor.entity)
            .collect()
    }

    /// The local entity as the engine currently sees it.
    pub fn local_entity(&self) -> Entity {
        self.shared.lock().local
    }

    pub fn identifier(&self) -> Identifier {
        self.shared.lock().local.identifier
    }

    /// Moves the local entity. The new coordinates go out with the next
    /// maintenance cycle.
    pub fn move_to(&self, x: i64, y: i64) {
        self.shared.lock().local.position.advance(I64Vec2::new(x, y));
    }

    pub fn set_aoi_radius(&self, aoi_radius: i64) {
        self.shared.lock().local.aoi_radius = aoi_radius;
    }

    /// Stops the receive loop and the maintenance timer.
    ///
    /// The protocol has no leave signaling; peers age this node out via
    /// their timeout sweep.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.receive_loop.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.update_loop.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(endpoint: &Endpoint, shared: &Shared, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        let (packet, origin) = match endpoint.recv() {
            Ok(Some(received)) => received,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("{}: receive failed: {}", endpoint.local_identifier(), e);
                continue;
            }
        };

        log::trace!(
            "{}: received {:?} from {}",
            endpoint.local_identifier(),
            packet,
            origin
        );

        let outgoing = {
            let mut state = shared.lock();
            let outgoing = state.handle_packet(packet, origin, Instant::now());
            if matches!(packet, Packet::JoinAck) {
                shared.joined.notify_all();
            }
            outgoing
        };

        for (to, packet) in outgoing {
            endpoint.send(&packet, to);
        }
    }
}

fn update_loop(endpoint: &Endpoint, shared: &Shared, running: &AtomicBool, config: &NodeConfig) {
    while running.load(Ordering::SeqCst) {
        let outgoing = {
            let mut state = shared.lock();
            let outgoing = state.position_update();
            state.sweep_timeouts(Instant::now(), config.timeout);
            outgoing
        };

        for (to, packet) in outgoing {
            endpoint.send(&packet, to);
        }

        thread::sleep(config.update_interval);
    }
}

/// All mutable neighbor state, guarded by one mutex.
struct State {
    local: Entity,
    neighbors: HashMap<Identifier, RemoteEntity>,
    direct: HashSet<Identifier>,
    binding: [Option<Identifier>; QUADRANTS],
    temporary: HashSet<Identifier>,
    connected: bool,
}

impl State {
    fn new(local: Entity) -> Self {
        Self {
            local,
            neighbors: HashMap::new(),
            direct: HashSet::new(),
            binding: [None; QUADRANTS],
            temporary: HashSet::new(),
            connected: false,
        }
    }

    /// One maintenance cycle: recompute the three neighbor classes, collect
    /// the periodic fan-out, and drop every table entry that landed in none
    /// of them.
    fn position_update(&mut self) -> Vec<(Identifier, Packet)> {
        self.classify_direct();
        self.classify_binding();
        self.classify_temporary();

        let move_packet = Packet::Move {
            position: self.local.position.current(),
            aoi_radius: self.local.aoi_radius,
        };
        let binding_request = Packet::MoveBindingRequest {
            position: self.local.position.current(),
            aoi_radius: self.local.aoi_radius,
        };

        // introductions of every structural neighbor, relayed to each
        // binding and temporary neighbor except the subject itself
        let mut introductions: Vec<(Identifier, Packet)> = Vec::new();
        for id in self.binding.iter().flatten() {
            introductions.push((*id, neighbor_packet(&self.neighbors[id])));
        }
        for id in &self.temporary {
            introductions.push((*id, neighbor_packet(&self.neighbors[id])));
        }

        let mut outgoing = Vec::new();

        for id in &self.direct {
            if !self.is_binding(*id) && !self.temporary.contains(id) {
                outgoing.push((*id, move_packet));
            }
        }

        for recipient in self.binding.iter().flatten() {
            outgoing.push((*recipient, binding_request));
            for (subject, packet) in &introductions {
                if subject != recipient {
                    outgoing.push((*recipient, *packet));
                }
            }
        }

        for recipient in &self.temporary {
            outgoing.push((*recipient, move_packet));
            for (subject, packet) in &introductions {
                if subject != recipient {
                    outgoing.push((*recipient, *packet));
                }
            }
        }

        self.rebuild_table();
        outgoing
    }

    fn classify_direct(&mut self) {
        self.direct.clear();
        for (id, neighbor) in &self.neighbors {
            if self.local.position.distance_to(&neighbor.entity.position) <= self.local.aoi_radius
            {
                self.direct.insert(*id);
            }
        }
    }

    fn classify_binding(&mut self) {
        self.binding = [None; QUADRANTS];
        for (id, neighbor) in &self.neighbors {
            let quadrant = self.local.position.quadrant_of(&neighbor.entity.position);
            let distance = self.local.position.distance_to(&neighbor.entity.position);

            let closer = match self.binding[quadrant] {
                None => true,
                Some(current) => {
                    distance < self.local.position.distance_to(&self.neighbors[&current].entity.position)
                }
            };
            if closer {
                self.binding[quadrant] = Some(*id);
            }
        }
    }

    fn classify_temporary(&mut self) {
        self.temporary.clear();
        for (id, neighbor) in &self.neighbors {
            if neighbor.requested_updates && !self.binding.contains(&Some(*id)) {
                self.temporary.insert(*id);
            }
        }
    }

    fn is_binding(&self, id: Identifier) -> bool {
        self.binding.contains(&Some(id))
    }

    fn binding_quadrant(&self, id: Identifier) -> Option<usize> {
        self.binding.iter().position(|slot| *slot == Some(id))
    }

    /// The neighbor table is exactly the union of the three classes; every
    /// entry that was not reclassified this cycle is dropped.
    fn rebuild_table(&mut self) {
        let direct = &self.direct;
        let temporary = &self.temporary;
        let binding = &self.binding;
        self.neighbors.retain(|id, _| {
            direct.contains(id) || temporary.contains(id) || binding.contains(&Some(*id))
        });
    }

    /// Drops every neighbor that has been silent for longer than `timeout`,
    /// vacating its binding slot if it held one.
    fn sweep_timeouts(&mut self, now: Instant, timeout: Duration) {
        let expired: Vec<Identifier> = self
            .neighbors
            .iter()
            .filter(|(_, neighbor)| now.duration_since(neighbor.last_contact) > timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(quadrant) = self.binding_quadrant(id) {
                self.binding[quadrant] = None;
            }
            self.direct.remove(&id);
            self.temporary.remove(&id);
            self.neighbors.remove(&id);
            log::debug!("{}: neighbor {} timed out", self.local.identifier, id);
        }
    }

    fn handle_packet(
        &mut self,
        packet: Packet,
        origin: Identifier,
        now: Instant,
    ) -> Vec<(Identifier, Packet)> {
        match packet {
            Packet::Move {
                position,
                aoi_radius,
            } => self.handle_move(origin, position, aoi_radius, false, now),
            Packet::MoveBindingRequest {
                position,
                aoi_radius,
            } => self.handle_move(origin, position, aoi_radius, true, now),
            Packet::Neighbor {
                subject,
                position,
                aoi_radius,
            } => self.handle_neighbor(origin, subject, position, aoi_radius, now),
            Packet::Join {
                subject,
                position,
                aoi_radius,
            } => self.handle_join(subject, position, aoi_radius),
            Packet::JoinAck => {
                self.connected = true;
                Vec::new()
            }
            // departure is detected via timeout only
            Packet::Leave | Packet::Invalid => Vec::new(),
        }
    }

    fn handle_move(
        &mut self,
        origin: Identifier,
        position: I64Vec2,
        aoi_radius: i64,
        binding_request: bool,
        now: Instant,
    ) -> Vec<(Identifier, Packet)> {
        let local = self.local.identifier;
        let neighbor = self.neighbors.entry(origin).or_insert_with(|| {
            log::debug!("{}: discovered neighbor {}", local, origin);
            RemoteEntity::new(origin, now)
        });
        neighbor.entity.position.advance(position);
        neighbor.entity.aoi_radius = aoi_radius;
        neighbor.last_contact = now;
        neighbor.requested_updates = binding_request;

        if self.direct.contains(&origin) {
            self.crossing_notifications(origin)
        } else {
            Vec::new()
        }
    }

    /// Tells `origin` about every direct neighbor that its latest move just
    /// brought inside its AOI, ahead of the next periodic cycle.
    fn crossing_notifications(&self, origin: Identifier) -> Vec<(Identifier, Packet)> {
        let Some(mover) = self.neighbors.get(&origin) else {
            return Vec::new();
        };

        let mut outgoing = Vec::new();
        for id in &self.direct {
            if *id == origin {
                continue;
            }
            let Some(neighbor) = self.neighbors.get(id) else {
                continue;
            };
            let distance = mover.entity.position.distance_to(&neighbor.entity.position);
            let previous = mover
                .entity
                .position
                .previous_distance_to(&neighbor.entity.position);
            if distance <= mover.entity.aoi_radius && previous > mover.entity.aoi_radius {
                outgoing.push((origin, neighbor_packet(neighbor)));
            }
        }
        outgoing
    }

    fn handle_neighbor(
        &mut self,
        origin: Identifier,
        subject: Identifier,
        position: I64Vec2,
        aoi_radius: i64,
        now: Instant,
    ) -> Vec<(Identifier, Packet)> {
        if let Some(relay) = self.neighbors.get_mut(&origin) {
            relay.last_contact = now;
        }

        // first introduction wins; once the subject is known, its own MOVE
        // packets are the authoritative source
        let local = self.local.identifier;
        self.neighbors.entry(subject).or_insert_with(|| {
            log::debug!("{}: introduced to {} by {}", local, subject, origin);
            let mut neighbor = RemoteEntity::new(subject, now);
            neighbor.entity.position.advance(position);
            neighbor.entity.aoi_radius = aoi_radius;
            neighbor
        });

        Vec::new()
    }

    /// Greedy geographic routing: forward the request toward whichever
    /// known neighbor is closest to the joiner's claimed position, or land
    /// it here when no neighbor is strictly closer.
    fn handle_join(
        &mut self,
        subject: Identifier,
        position: I64Vec2,
        aoi_radius: i64,
    ) -> Vec<(Identifier, Packet)> {
        let target = Position::new(position.x, position.y);

        let nearest = self
            .neighbors
            .values()
            .map(|neighbor| {
                (
                    neighbor.entity.identifier,
                    neighbor.entity.position.distance_to(&target),
                )
            })
            .min_by_key(|(_, distance)| *distance);

        if let Some((id, distance)) = nearest {
            if distance < self.local.position.distance_to(&target) {
                return vec![(
                    id,
                    Packet::Join {
                        subject,
                        position,
                        aoi_radius,
                    },
                )];
            }
        }

        // landing point: acknowledge, introduce ourselves, and bootstrap
        // the joiner's view of the topology
        let mut outgoing = vec![
            (subject, Packet::JoinAck),
            (
                subject,
                Packet::Move {
                    position: self.local.position.current(),
                    aoi_radius: self.local.aoi_radius,
                },
            ),
        ];
        for neighbor in self.neighbors.values() {
            outgoing.push((subject, neighbor_packet(neighbor)));
        }
        outgoing
    }
}

fn neighbor_packet(neighbor: &RemoteEntity) -> Packet {
    Packet::Neighbor {
        subject: neighbor.entity.identifier,
        position: neighbor.entity.position.current(),
        aoi_radius: neighbor.entity.aoi_radius,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn identifier(port: u16) -> Identifier {
        Identifier::new(Ipv4Addr::LOCALHOST, port)
    }

    fn state(x: i64, y: i64, aoi_radius: i64) -> State {
        State::new(Entity::new(identifier(9000), Position::new(x, y), aoi_radius))
    }

    fn insert(
        state: &mut State,
        port: u16,
        x: i64,
        y: i64,
        aoi_radius: i64,
        requested_updates: bool,
        now: Instant,
    ) -> Identifier {
        let id = identifier(port);
        let mut neighbor = RemoteEntity::new(id, now);
        neighbor.entity.position.advance(I64Vec2::new(x, y));
        neighbor.entity.aoi_radius = aoi_radius;
        neighbor.requested_updates = requested_updates;
        state.neighbors.insert(id, neighbor);
        id
    }

    fn packets_for(outgoing: &[(Identifier, Packet)], recipient: Identifier) -> Vec<Packet> {
        outgoing
            .iter()
            .filter(|(to, _)| *to == recipient)
            .map(|(_, packet)| *packet)
            .collect()
    }

    #[test]
    fn table_is_union_of_classes_after_cycle() {
        let now = Instant::now();
        let mut state = state(0, 0, 5);

        let near = insert(&mut state, 1, 3, 0, 50, false, now);
        let backbone = insert(&mut state, 2, 100, 100, 50, false, now);
        let dependent = insert(&mut state, 3, 50, -50, 50, true, now);
        // same quadrant as `dependent` but farther out, with no reverse
        // relationship: must be dropped
        let stale = insert(&mut state, 4, 60, -60, 50, false, now);

        state.position_update();

        assert_eq!(state.direct, HashSet::from([near]));
        assert!(state.is_binding(near));
        assert!(state.is_binding(backbone));
        assert!(!state.is_binding(dependent));
        assert_eq!(state.temporary, HashSet::from([dependent]));

        let mut expected: HashSet<Identifier> = state.direct.iter().copied().collect();
        expected.extend(state.binding.iter().flatten().copied());
        expected.extend(state.temporary.iter().copied());
        let table: HashSet<Identifier> = state.neighbors.keys().copied().collect();
        assert_eq!(table, expected);
        assert!(!state.neighbors.contains_key(&stale));
    }

    #[test]
    fn binding_slots_hold_the_nearest_neighbor_per_quadrant() {
        let now = Instant::now();
        let mut state = state(0, 0, 10);

        insert(&mut state, 1, 9, 9, 50, false, now);
        let nearest = insert(&mut state, 2, 5, 5, 50, false, now);
        insert(&mut state, 3, 3, 7, 50, false, now);
        let lone = insert(&mut state, 4, -4, 2, 50, false, now);

        state.classify_binding();

        assert_eq!(state.binding[3], Some(nearest));
        assert_eq!(state.binding[2], Some(lone));
        assert_eq!(state.binding[0], None);
        assert_eq!(state.binding[1], None);
    }

    #[test]
    fn boundary_neighbors_group_with_the_lower_quadrant() {
        let now = Instant::now();
        let mut state = state(10, 10, 100);

        let on_axis = insert(&mut state, 1, 10, 40, 50, false, now);
        state.classify_binding();

        // equal x counts as "not greater"
        assert_eq!(state.binding[2], Some(on_axis));
    }

    #[test]
    fn fan_out_audiences() {
        let now = Instant::now();
        let mut state = state(0, 0, 100);

        let plain = insert(&mut state, 1, -5, 3, 50, false, now);
        let binding_low = insert(&mut state, 2, -3, 2, 50, false, now);
        let binding_high = insert(&mut state, 3, 10, 10, 50, false, now);
        let dependent = insert(&mut state, 4, 20, 20, 50, true, now);

        let outgoing = state.position_update();

        let move_packet = Packet::Move {
            position: I64Vec2::new(0, 0),
            aoi_radius: 100,
        };
        let binding_request = Packet::MoveBindingRequest {
            position: I64Vec2::new(0, 0),
            aoi_radius: 100,
        };
        let introduce = |id: Identifier| {
            let neighbor = &state.neighbors[&id];
            Packet::Neighbor {
                subject: id,
                position: neighbor.entity.position.current(),
                aoi_radius: neighbor.entity.aoi_radius,
            }
        };

        // a plain direct neighbor only needs the position update
        assert_eq!(packets_for(&outgoing, plain), vec![move_packet]);

        // binding neighbors get the update request plus every other
        // structural neighbor's introduction
        let to_low = packets_for(&outgoing, binding_low);
        assert_eq!(to_low.len(), 3);
        assert_eq!(to_low[0], binding_request);
        assert!(to_low.contains(&introduce(binding_high)));
        assert!(to_low.contains(&introduce(dependent)));

        let to_high = packets_for(&outgoing, binding_high);
        assert_eq!(to_high.len(), 3);
        assert_eq!(to_high[0], binding_request);
        assert!(to_high.contains(&introduce(binding_low)));
        assert!(to_high.contains(&introduce(dependent)));

        // temporary neighbors get a plain update plus the introductions
        let to_dependent = packets_for(&outgoing, dependent);
        assert_eq!(to_dependent.len(), 3);
        assert_eq!(to_dependent[0], move_packet);
        assert!(to_dependent.contains(&introduce(binding_low)));
        assert!(to_dependent.contains(&introduce(binding_high)));
    }

    #[test]
    fn sweep_drops_silent_neighbors_everywhere() {
        let start = Instant::now();
        let mut state = state(0, 0, 50);

        let silent = insert(&mut state, 1, 10, 0, 50, false, start);
        let alive = insert(&mut state, 2, -10, 0, 50, false, start + Duration::from_secs(10));

        state.classify_direct();
        state.classify_binding();
        assert!(state.is_binding(silent));

        state.sweep_timeouts(start + Duration::from_secs(11), Duration::from_secs(10));

        assert!(!state.neighbors.contains_key(&silent));
        assert!(!state.direct.contains(&silent));
        assert_eq!(state.binding_quadrant(silent), None);
        assert!(state.neighbors.contains_key(&alive));
        assert!(state.direct.contains(&alive));
    }

    #[test]
    fn move_handler_creates_and_updates_entries() {
        let now = Instant::now();
        let mut state = state(0, 0, 50);
        let origin = identifier(1);

        state.handle_packet(
            Packet::MoveBindingRequest {
                position: I64Vec2::new(30, 0),
                aoi_radius: 40,
            },
            origin,
            now,
        );

        let neighbor = &state.neighbors[&origin];
        assert_eq!(neighbor.entity.position.current(), I64Vec2::new(30, 0));
        assert_eq!(neighbor.entity.aoi_radius, 40);
        assert!(neighbor.requested_updates);

        // a plain MOVE withdraws the update request
        state.handle_packet(
            Packet::Move {
                position: I64Vec2::new(35, 0),
                aoi_radius: 40,
            },
            origin,
            now,
        );

        let neighbor = &state.neighbors[&origin];
        assert_eq!(neighbor.entity.position.current(), I64Vec2::new(35, 0));
        assert_eq!(neighbor.entity.position.previous(), I64Vec2::new(30, 0));
        assert!(!neighbor.requested_updates);
    }

    #[test]
    fn move_handler_emits_crossing_notifications() {
        let now = Instant::now();
        let mut state = state(0, 0, 100);

        let resident = insert(&mut state, 1, 10, 0, 30, false, now);
        let mover = insert(&mut state, 2, 60, 0, 30, false, now);
        state.position_update();
        assert!(state.direct.contains(&mover));

        // the move brings `resident` from outside to inside the mover's AOI
        let outgoing = state.handle_packet(
            Packet::Move {
                position: I64Vec2::new(30, 0),
                aoi_radius: 30,
            },
            mover,
            now,
        );

        assert_eq!(
            outgoing,
            vec![(
                mover,
                Packet::Neighbor {
                    subject: resident,
                    position: I64Vec2::new(10, 0),
                    aoi_radius: 30,
                }
            )]
        );

        // already inside: no further notification
        let outgoing = state.handle_packet(
            Packet::Move {
                position: I64Vec2::new(25, 0),
                aoi_radius: 30,
            },
            mover,
            now,
        );
        assert!(outgoing.is_empty());
    }

    #[test]
    fn neighbor_handler_keeps_first_introduction_and_refreshes_relay() {
        let start = Instant::now();
        let later = start + Duration::from_secs(1);
        let mut state = state(0, 0, 50);

        let relay = insert(&mut state, 1, 5, 5, 50, false, start);
        let subject = identifier(2);

        state.handle_packet(
            Packet::Neighbor {
                subject,
                position: I64Vec2::new(40, 40),
                aoi_radius: 60,
            },
            relay,
            later,
        );

        assert_eq!(state.neighbors[&relay].last_contact, later);
        let introduced = &state.neighbors[&subject];
        assert_eq!(introduced.entity.position.current(), I64Vec2::new(40, 40));
        assert_eq!(introduced.entity.aoi_radius, 60);
        assert!(!introduced.requested_updates);

        // an already-known subject is left untouched
        state.handle_packet(
            Packet::Neighbor {
                subject,
                position: I64Vec2::new(99, 99),
                aoi_radius: 1,
            },
            relay,
            later,
        );
        assert_eq!(
            state.neighbors[&subject].entity.position.current(),
            I64Vec2::new(40, 40)
        );
    }

    #[test]
    fn join_forwards_to_the_nearest_neighbor() {
        let now = Instant::now();
        let mut state = state(0, 0, 50);

        insert(&mut state, 1, 400, 0, 50, false, now);
        let nearest = insert(&mut state, 2, 1000, 0, 50, false, now);
        let joiner = identifier(3);

        let outgoing = state.handle_packet(
            Packet::Join {
                subject: joiner,
                position: I64Vec2::new(990, 0),
                aoi_radius: 50,
            },
            joiner,
            now,
        );

        // forwarded unmodified to the geographically closest known node
        assert_eq!(
            outgoing,
            vec![(
                nearest,
                Packet::Join {
                    subject: joiner,
                    position: I64Vec2::new(990, 0),
                    aoi_radius: 50,
                }
            )]
        );
    }

    #[test]
    fn join_lands_here_when_no_neighbor_is_closer() {
        let now = Instant::now();
        let mut state = state(0, 0, 50);

        let neighbor = insert(&mut state, 1, 100, 0, 50, false, now);
        let joiner = identifier(2);

        let outgoing = state.handle_packet(
            Packet::Join {
                subject: joiner,
                position: I64Vec2::new(10, 0),
                aoi_radius: 50,
            },
            joiner,
            now,
        );

        assert_eq!(outgoing[0], (joiner, Packet::JoinAck));
        assert_eq!(
            outgoing[1],
            (
                joiner,
                Packet::Move {
                    position: I64Vec2::new(0, 0),
                    aoi_radius: 50,
                }
            )
        );
        assert_eq!(
            outgoing[2],
            (
                joiner,
                Packet::Neighbor {
                    subject: neighbor,
                    position: I64Vec2::new(100, 0),
                    aoi_radius: 50,
                }
            )
        );
        assert_eq!(outgoing.len(), 3);

        // the joiner announces itself through its own fan-out, not here
        assert!(!state.neighbors.contains_key(&joiner));
    }

    #[test]
    fn join_ack_releases_the_gate_idempotently() {
        let now = Instant::now();
        let mut state = state(0, 0, 50);
        assert!(!state.connected);

        assert!(state.handle_packet(Packet::JoinAck, identifier(1), now).is_empty());
        assert!(state.connected);
        assert!(state.handle_packet(Packet::JoinAck, identifier(1), now).is_empty());
        assert!(state.connected);
    }

    #[test]
    fn leave_and_invalid_are_ignored() {
        let now = Instant::now();
        let mut state = state(0, 0, 50);

        assert!(state.handle_packet(Packet::Leave, identifier(1), now).is_empty());
        assert!(state.handle_packet(Packet::Invalid, identifier(1), now).is_empty());
        assert!(state.neighbors.is_empty());
    }
}
