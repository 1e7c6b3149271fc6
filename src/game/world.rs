//! World module
//!
//! Owns every player, the region index and the plugin manager, and drives
//! the game tick. Each tick runs strictly in this order:
//! - due tasks, then the actions plugins requested
//! - pre-update: walking and map region changes
//! - update: one player update message per active player
//! - flush: queued frames handed to each player's transport queue
//! - post-update: per-tick state cleared, departed players freed

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{GameError, NetworkError, Result, RustscapeError};
use crate::game::entity::EntityState;
use crate::game::event::{EventPublisher, WorldEvent};
use crate::game::player::{Player, PlayerDetails, PlayerList, PlayerRights, MAX_PLAYER_INDEX};
use crate::game::plugin::{PluginAction, PluginManager};
use crate::game::position::Position;
use crate::game::region::RegionManager;
use crate::game::sync::PlayerUpdater;
use crate::game::task::{Task, TaskHandle, TaskScheduler};
use crate::net::pool::BufferPool;
use crate::net::transport::Outbound;
use crate::protocol::inbound::{InboundAction, MessageRepository};
use crate::protocol::packets::{build_map_region, IncomingGamePacket};

/// Standard game tick rate in milliseconds
pub const TICK_RATE_MS: u64 = 600;

/// Maximum players per world
pub const MAX_PLAYERS: usize = MAX_PLAYER_INDEX as usize - 1;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// World ID (1-255)
    pub world_id: u8,
    /// World name
    pub name: String,
    /// Tick rate in milliseconds
    pub tick_rate_ms: u64,
    /// Maximum players allowed
    pub max_players: usize,
    /// Frames each player's transport queue holds
    pub outbound_queue_capacity: usize,
    /// Idle update buffers kept for reuse
    pub buffer_pool_size: usize,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            world_id: 1,
            name: "Rustscape".to_string(),
            tick_rate_ms: TICK_RATE_MS,
            max_players: MAX_PLAYERS,
            outbound_queue_capacity: 128,
            buffer_pool_size: 64,
        }
    }
}

impl WorldSettings {
    /// Create new world settings with a specific ID
    pub fn new(world_id: u8) -> Self {
        Self {
            world_id,
            ..Default::default()
        }
    }

    /// Settings taken from the server configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            world_id: config.world_id,
            name: config.server_name.clone(),
            tick_rate_ms: config.tick_rate_ms,
            max_players: config.max_players as usize,
            outbound_queue_capacity: config.outbound_queue_capacity,
            buffer_pool_size: config.buffer_pool_size,
        }
    }
}

/// World state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    /// World is initializing
    Initializing,
    /// World is running normally
    Running,
    /// World is shutting down
    ShuttingDown,
    /// World has stopped
    Stopped,
}

impl WorldState {
    /// Check if the world is accepting new connections
    pub fn accepting_connections(&self) -> bool {
        matches!(self, WorldState::Running)
    }

    /// Check if the world is processing ticks
    pub fn is_active(&self) -> bool {
        matches!(self, WorldState::Running)
    }
}

/// Game world - drives the game tick and owns all world state
pub struct World {
    /// World settings
    pub settings: WorldSettings,
    state: WorldState,
    tick: u64,
    start_time: Option<Instant>,
    players: PlayerList,
    regions: RegionManager,
    plugins: PluginManager,
    tasks: TaskScheduler<World>,
    updater: PlayerUpdater,
    messages: MessageRepository,
}

impl World {
    /// Create a world without plugins
    pub fn new(settings: WorldSettings) -> Self {
        Self::with_plugins(settings, PluginManager::new("config/plugins"))
    }

    /// Create a world dispatching events to `plugins`
    pub fn with_plugins(settings: WorldSettings, plugins: PluginManager) -> Self {
        info!(
            world_id = settings.world_id,
            name = %settings.name,
            plugins = plugins.len(),
            "Creating game world"
        );

        let max_players = settings.max_players.min(MAX_PLAYERS);
        let pool = BufferPool::new(settings.buffer_pool_size);

        Self {
            players: PlayerList::new(max_players),
            regions: RegionManager::new(),
            plugins,
            tasks: TaskScheduler::new(),
            updater: PlayerUpdater::new(pool),
            messages: MessageRepository::default(),
            state: WorldState::Initializing,
            tick: 0,
            start_time: None,
            settings,
        }
    }

    /// Get the current world state
    pub fn state(&self) -> WorldState {
        self.state
    }

    /// Set the world state
    pub fn set_state(&mut self, new_state: WorldState) {
        let old_state = self.state;
        self.state = new_state;
        info!(
            old_state = ?old_state,
            new_state = ?new_state,
            "World state changed"
        );
    }

    /// Get the current tick number
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Get the player count
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn players(&self) -> &PlayerList {
        &self.players
    }

    pub fn player(&self, index: u16) -> Option<&Player> {
        self.players.get(index)
    }

    pub fn player_mut(&mut self, index: u16) -> Option<&mut Player> {
        self.players.get_mut(index)
    }

    pub fn regions(&self) -> &RegionManager {
        &self.regions
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn updater(&self) -> &PlayerUpdater {
        &self.updater
    }

    /// Number of tasks waiting to run
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Get the uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Start plugins and open the world for players
    pub fn launch(&mut self) {
        if self.state != WorldState::Initializing {
            warn!(state = ?self.state, "World already launched");
            return;
        }
        self.start_time = Some(Instant::now());
        self.plugins.start();
        self.set_state(WorldState::Running);
        self.plugins.publish(&WorldEvent::ServerLaunch);
        self.apply_plugin_actions();
    }

    pub fn schedule(&mut self, task: Task<World>) -> TaskHandle {
        self.tasks.schedule(task)
    }

    pub fn cancel(&mut self, handle: TaskHandle) {
        self.tasks.cancel(handle);
    }

    /// Register a player with an outbound queue sized from the settings.
    /// Returns the slot index and the receiving end of the queue.
    pub fn connect(&mut self, details: PlayerDetails) -> Result<(u16, mpsc::Receiver<Bytes>)> {
        let (outbound, rx) = Outbound::channel(self.settings.outbound_queue_capacity);
        let index = self.register_player(details, Some(outbound))?;
        Ok((index, rx))
    }

    /// Allocate a slot, place and activate the player, and publish `Login`
    pub fn register_player(
        &mut self,
        details: PlayerDetails,
        outbound: Option<Outbound>,
    ) -> Result<u16> {
        if !self.state.accepting_connections() {
            return Err(GameError::InvalidAction(format!(
                "world is not accepting players ({:?})",
                self.state
            ))
            .into());
        }
        if self.players.find_by_username(&details.username).is_some() {
            return Err(GameError::InvalidAction(format!(
                "{} is already logged in",
                details.username
            ))
            .into());
        }

        let index = self.players.next_free_index()?;
        let mut player = Player::new(index, details.username.as_str(), &mut self.plugins);
        player.rights = details.rights;
        player.muted = details.muted;
        player.appearance = details.appearance;
        if let Some(outbound) = outbound {
            player.attach_outbound(outbound);
        }

        let entity = player.entity_mut();
        entity.set_position(details.position, &mut self.regions, &mut self.plugins)?;
        if let Err(e) = entity.set_state(EntityState::Active, &mut self.regions, &mut self.plugins) {
            entity.set_state(EntityState::Inactive, &mut self.regions, &mut self.plugins)?;
            return Err(e);
        }
        player.set_teleporting(true);
        self.players.insert(player)?;

        info!(
            player_index = index,
            username = %details.username,
            position = %details.position,
            online = self.players.len(),
            "Player logged in"
        );

        self.plugins.publish(&WorldEvent::Login {
            index,
            username: details.username,
            muted: details.muted,
        });
        self.apply_plugin_actions();
        Ok(index)
    }

    /// Take a player out of the world. The slot is freed at the end of the
    /// next tick, after every observer has been told the player is gone.
    pub fn logout(&mut self, index: u16) -> Result<()> {
        let player = self.players.require_mut(index)?;
        player.walking.clear();
        let changed = player
            .entity_mut()
            .set_state(EntityState::Inactive, &mut self.regions, &mut self.plugins)?;
        if changed {
            info!(player_index = index, username = %player.username, "Player logged out");
            self.plugins.publish(&WorldEvent::Logout { index });
            self.apply_plugin_actions();
        }
        Ok(())
    }

    /// Move a player without walking
    pub fn teleport(&mut self, index: u16, position: Position) -> Result<()> {
        let player = self.players.require_mut(index)?;
        player
            .entity_mut()
            .set_position(position, &mut self.regions, &mut self.plugins)?;
        player.walking.clear();
        player.set_teleporting(true);
        debug!(player_index = index, position = %position, "Player teleported");
        Ok(())
    }

    /// Queue a chatbox message for every active player with at least
    /// `min_rights`. Returns how many players it was sent to.
    pub fn broadcast(&mut self, min_rights: PlayerRights, message: &str) -> usize {
        let mut sent = 0;
        for player in self.players.iter_mut() {
            if player.rights >= min_rights && player.entity().is_active() {
                player.send_message(message);
                sent += 1;
            }
        }
        debug!(min_rights = ?min_rights, recipients = sent, "Broadcast message");
        sent
    }

    /// Decode and apply one client message. Anything that fails is dropped
    /// without affecting the player's connection.
    pub fn handle_packet(&mut self, index: u16, packet: IncomingGamePacket) {
        let action = match self.messages.decode(&packet) {
            Ok(action) => action,
            Err(e) => {
                debug!(
                    player_index = index,
                    opcode = packet.opcode,
                    error = %e,
                    "Dropping inbound message"
                );
                return;
            }
        };
        if let Err(e) = self.apply_action(index, action) {
            debug!(
                player_index = index,
                opcode = packet.opcode,
                error = %e,
                "Dropping inbound message"
            );
        }
    }

    fn apply_action(&mut self, index: u16, action: InboundAction) -> Result<()> {
        let player = self.players.require_mut(index)?;
        if !player.entity().is_active() {
            return Err(GameError::InvalidAction(format!("player {} is not active", index)).into());
        }

        match action {
            InboundAction::Walk {
                first,
                offsets,
                running,
            } => {
                let position = player
                    .position()
                    .ok_or_else(|| GameError::NotPlaced(player.entity().id()))?;
                let start = Position::new(first.0, first.1, position.z);
                let mut waypoints = Vec::with_capacity(offsets.len() + 1);
                waypoints.push(start);
                waypoints.extend(
                    offsets
                        .iter()
                        .map(|&(dx, dy)| start.translate(dx as i32, dy as i32)),
                );
                player.walking.set_path(position, &waypoints, running);
                trace!(player_index = index, steps = player.walking.len(), "Walking path set");
            }
            InboundAction::Chat(chat) => {
                if player.muted {
                    debug!(player_index = index, "Muted player tried to chat");
                    return Ok(());
                }
                let message = chat.message.clone();
                player.chat(chat);
                self.plugins.publish(&WorldEvent::Chat { index, message });
            }
            InboundAction::Command { name, args } => {
                debug!(player_index = index, command = %name, "Command received");
                self.plugins
                    .publish(&WorldEvent::Command { index, name, args });
            }
        }

        self.apply_plugin_actions();
        Ok(())
    }

    /// Apply everything plugins asked for since the last call
    pub fn apply_plugin_actions(&mut self) {
        for action in self.plugins.take_actions() {
            match action {
                PluginAction::Schedule(task) => {
                    self.tasks.schedule(task);
                }
                PluginAction::SendMessage { index, message } => match self.players.get_mut(index) {
                    Some(player) => player.send_message(&message),
                    None => debug!(player_index = index, "Message for missing player dropped"),
                },
                PluginAction::Broadcast {
                    min_rights,
                    message,
                } => {
                    self.broadcast(min_rights, &message);
                }
            }
        }
    }

    /// Run one game tick
    pub fn pulse(&mut self) {
        let started = Instant::now();
        self.tick += 1;

        if self.tick % 1000 == 0 {
            debug!(
                tick = self.tick,
                players = self.players.len(),
                "Game tick milestone"
            );
        }

        self.run_tasks();
        self.apply_plugin_actions();
        self.pre_update();
        let departed = self.update();
        self.flush();
        self.post_update(&departed);

        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(self.settings.tick_rate_ms) {
            warn!(
                tick = self.tick,
                elapsed_ms = elapsed.as_millis() as u64,
                tick_rate_ms = self.settings.tick_rate_ms,
                "Tick overran its budget"
            );
        }
    }

    /// Tasks get the whole world, so the scheduler is detached while they
    /// run. Anything scheduled or cancelled meanwhile lands on a stand-in
    /// that is merged back afterwards.
    fn run_tasks(&mut self) {
        let stand_in = self.tasks.stand_in();
        let mut scheduler = std::mem::replace(&mut self.tasks, stand_in);
        scheduler.pulse(self);
        let stand_in = std::mem::replace(&mut self.tasks, TaskScheduler::new());
        scheduler.absorb(stand_in);
        self.tasks = scheduler;
    }

    fn pre_update(&mut self) {
        for index in self.players.indices() {
            if let Err(e) = self.pre_update_player(index) {
                warn!(player_index = index, error = %e, "Pre-update failed");
            }
        }
    }

    fn pre_update_player(&mut self, index: u16) -> Result<()> {
        let player = self.players.require_mut(index)?;
        if !player.entity().is_active() {
            return Ok(());
        }
        let position = player
            .position()
            .ok_or_else(|| GameError::NotPlaced(player.entity().id()))?;

        if let Some(step) = player.walking.process(position) {
            let entity = player.entity_mut();
            entity.set_position(position.step(step.walk), &mut self.regions, &mut self.plugins)?;
            if step.run.is_some() {
                entity.set_position(step.destination, &mut self.regions, &mut self.plugins)?;
            }
            player.set_directions(Some(step.walk), step.run);
        }

        if player.needs_region_update() {
            let position = player
                .position()
                .ok_or_else(|| GameError::NotPlaced(player.entity().id()))?;
            player.set_region_changed(true);
            player.set_last_region(position);
            player.queue(build_map_region(position));
            trace!(player_index = index, position = %position, "Map region changed");
        }
        Ok(())
    }

    /// Build every active player's update message. Returns the players that
    /// were already inactive, whose slots can be freed once the tick ends.
    fn update(&mut self) -> Vec<u16> {
        let mut departed = Vec::new();
        for index in self.players.indices() {
            let Some(state) = self.players.get(index).map(|p| p.entity().state()) else {
                continue;
            };
            match state {
                EntityState::Active => {
                    match self.updater.update(index, &mut self.players, &self.regions) {
                        Ok(packet) => {
                            if let Some(player) = self.players.get_mut(index) {
                                player.queue(packet);
                            }
                        }
                        Err(e) => {
                            warn!(player_index = index, error = %e, "Player update failed, skipping");
                        }
                    }
                }
                EntityState::Inactive => departed.push(index),
                EntityState::Idle => {}
            }
        }
        departed
    }

    fn flush(&mut self) {
        let mut closed = Vec::new();
        for player in self.players.iter_mut() {
            let packets = player.take_queued();
            let index = player.index();
            let Some(outbound) = player.outbound() else {
                trace!(player_index = index, dropped = packets.len(), "No transport attached");
                continue;
            };

            for packet in packets {
                let frame = match packet.encode() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(player_index = index, opcode = packet.opcode, error = %e, "Could not frame packet");
                        continue;
                    }
                };
                match outbound.send(frame) {
                    Ok(()) => {}
                    Err(RustscapeError::Network(NetworkError::WriteBufferFull)) => {
                        warn!(player_index = index, opcode = packet.opcode, "Outbound queue full, dropping frame");
                    }
                    Err(e) => {
                        debug!(player_index = index, error = %e, "Transport gone");
                        if player.entity().is_active() {
                            closed.push(index);
                        }
                        break;
                    }
                }
            }
        }

        for index in closed {
            if let Err(e) = self.logout(index) {
                error!(player_index = index, error = %e, "Could not log out disconnected player");
            }
        }
    }

    fn post_update(&mut self, departed: &[u16]) {
        for player in self.players.iter_mut() {
            player.reset_tick();
        }
        for &index in departed {
            if let Some(player) = self.players.remove(index) {
                debug!(player_index = index, username = %player.username, "Freed player slot");
            }
        }
    }

    /// Log everyone out and stop
    pub fn shutdown(&mut self) {
        self.set_state(WorldState::ShuttingDown);
        for index in self.players.indices() {
            if let Err(e) = self.logout(index) {
                error!(player_index = index, error = %e, "Could not log out player");
            }
        }
        // One last tick delivers the removals and frees the slots
        self.pulse();
        self.set_state(WorldState::Stopped);
    }

    /// Run the game world tick loop until shutdown is signalled
    pub async fn run(&mut self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            world_id = self.settings.world_id,
            tick_rate_ms = self.settings.tick_rate_ms,
            "Starting game world"
        );

        self.launch();

        // Create tick interval
        let mut tick_interval = interval(Duration::from_millis(self.settings.tick_rate_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Main game loop
        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    if !self.state.is_active() {
                        break;
                    }
                    self.pulse();
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("{}", self.info());
        self.shutdown();

        info!(
            total_ticks = self.tick,
            uptime_secs = self.uptime_secs(),
            "Game world stopped"
        );
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "World {} ({}) - {} players - Tick {} - Uptime {}s",
            self.settings.world_id,
            self.settings.name,
            self.player_count(),
            self.tick,
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("player_count", &self.players.len())
            .field("regions", &self.regions.len())
            .field("plugins", &self.plugins)
            .field("tasks", &self.tasks)
            .field("uptime_secs", &self.uptime_secs())
            .finish()
    }
}
