//! Plugin system
//!
//! Plugins are registered statically and receive every [`WorldEvent`].
//! Each plugin gets its JSON config from `<config_dir>/<name>.json` at init.
//! Plugins never touch the world directly; they record [`PluginAction`]s on
//! a [`PluginContext`] and the world applies them after dispatch.
//!
//! A failing plugin is logged and skipped. It never stops the event from
//! reaching the other plugins, and never fails the placement or transition
//! that produced the event.

pub mod announcements;
pub mod login;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, error, info, trace};

use crate::game::entity::{Entity, EntityListener, EntityState};
use crate::game::event::{EventPublisher, WorldEvent};
use crate::game::player::PlayerRights;
use crate::game::position::Position;
use crate::game::task::Task;
use crate::game::world::World;

pub use announcements::AnnouncementsPlugin;
pub use login::LoginPlugin;

/// A server extension driven by world events
pub trait Plugin: Send {
    /// Name used for logging and the config file name. Letters, digits
    /// and underscores only.
    fn name(&self) -> &str;

    fn version(&self) -> u32 {
        0
    }

    /// Called once before [`Plugin::start`] with the plugin's config
    /// (`Value::Null` when it has none)
    fn init(&mut self, config: &Value) -> anyhow::Result<()>;

    fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_event(&mut self, event: &WorldEvent, ctx: &mut PluginContext) -> anyhow::Result<()>;
}

/// Deferred effect requested by a plugin
pub enum PluginAction {
    /// Register a task with the world scheduler
    Schedule(Task<World>),
    /// Queue a chatbox message for a player
    SendMessage { index: u16, message: String },
    /// Queue a chatbox message for every player with at least `min_rights`
    Broadcast {
        min_rights: PlayerRights,
        message: String,
    },
}

impl std::fmt::Debug for PluginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginAction::Schedule(task) => f.debug_tuple("Schedule").field(task).finish(),
            PluginAction::SendMessage { index, message } => f
                .debug_struct("SendMessage")
                .field("index", index)
                .field("message", message)
                .finish(),
            PluginAction::Broadcast {
                min_rights,
                message,
            } => f
                .debug_struct("Broadcast")
                .field("min_rights", min_rights)
                .field("message", message)
                .finish(),
        }
    }
}

/// Collects the actions plugins request while handling one event
#[derive(Debug, Default)]
pub struct PluginContext {
    actions: Vec<PluginAction>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: Task<World>) {
        self.actions.push(PluginAction::Schedule(task));
    }

    pub fn send_message(&mut self, index: u16, message: impl Into<String>) {
        self.actions.push(PluginAction::SendMessage {
            index,
            message: message.into(),
        });
    }

    pub fn broadcast(&mut self, min_rights: PlayerRights, message: impl Into<String>) {
        self.actions.push(PluginAction::Broadcast {
            min_rights,
            message: message.into(),
        });
    }

    pub fn actions(&self) -> &[PluginAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<PluginAction> {
        self.actions
    }
}

/// Owns the registered plugins and dispatches events to them
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    config_dir: PathBuf,
    actions: Vec<PluginAction>,
}

impl PluginManager {
    /// A manager with no plugins
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins: Vec::new(),
            config_dir: config_dir.into(),
            actions: Vec::new(),
        }
    }

    /// A manager with the built-in plugins registered
    pub fn with_defaults(config_dir: impl Into<PathBuf>) -> Self {
        let mut manager = Self::new(config_dir);
        manager.register(Box::new(AnnouncementsPlugin::default()));
        manager.register(Box::new(LoginPlugin::default()));
        manager
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), version = plugin.version(), "Registered plugin");
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Initialize every plugin with its config. Plugins that fail to load
    /// their config or to initialize are dropped.
    pub async fn init(&mut self) {
        let mut ready = Vec::with_capacity(self.plugins.len());
        for mut plugin in std::mem::take(&mut self.plugins) {
            let result = match load_plugin_config(&self.config_dir, plugin.name()).await {
                Ok(config) => plugin.init(&config),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    info!(plugin = plugin.name(), version = plugin.version(), "Loaded plugin");
                    ready.push(plugin);
                }
                Err(e) => {
                    error!(plugin = plugin.name(), error = %e, "Could not init plugin");
                }
            }
        }
        self.plugins = ready;
    }

    /// Start every plugin, logging failures
    pub fn start(&mut self) {
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.start() {
                error!(plugin = plugin.name(), error = %e, "Could not start plugin");
            }
        }
    }

    /// Actions recorded since the last call, in request order
    pub fn take_actions(&mut self) -> Vec<PluginAction> {
        std::mem::take(&mut self.actions)
    }
}

impl EventPublisher for PluginManager {
    fn publish(&mut self, event: &WorldEvent) {
        trace!(event = event.kind(), plugins = self.plugins.len(), "Publishing event");
        let mut ctx = PluginContext::new();
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.on_event(event, &mut ctx) {
                error!(
                    plugin = plugin.name(),
                    event = event.kind(),
                    error = %e,
                    "Plugin failed to handle event"
                );
            }
        }
        self.actions.extend(ctx.into_actions());
    }
}

impl EntityListener for PluginManager {
    fn on_idle(&mut self, entity: &Entity) {
        self.publish(&WorldEvent::StateChanged {
            entity: entity.id(),
            state: EntityState::Idle,
        });
    }

    fn on_active(&mut self, entity: &Entity) {
        self.publish(&WorldEvent::StateChanged {
            entity: entity.id(),
            state: EntityState::Active,
        });
    }

    fn on_inactive(&mut self, entity: &Entity) {
        self.publish(&WorldEvent::StateChanged {
            entity: entity.id(),
            state: EntityState::Inactive,
        });
    }

    fn on_position_change(&mut self, entity: &Entity, old: Option<Position>, new: Position) {
        self.publish(&WorldEvent::PositionChanged {
            entity: entity.id(),
            old,
            new,
        });
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.names())
            .field("config_dir", &self.config_dir)
            .field("pending_actions", &self.actions.len())
            .finish()
    }
}

/// Read `<dir>/<name>.json`; a missing or blank file means no config
async fn load_plugin_config(dir: &Path, name: &str) -> anyhow::Result<Value> {
    let path = dir.join(format!("{}.json", name));
    match tokio::fs::read_to_string(&path).await {
        Ok(content) if content.trim().is_empty() => Ok(Value::Null),
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plugin config: {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No plugin config, using defaults");
            Ok(Value::Null)
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read plugin config: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityId, NoopListener};
    use crate::game::region::RegionManager;

    #[derive(Default)]
    struct Sample {
        fail: bool,
    }

    impl Plugin for Sample {
        fn name(&self) -> &str {
            "sample"
        }

        fn init(&mut self, config: &Value) -> anyhow::Result<()> {
            if let Some(fail) = config.get("fail").and_then(Value::as_bool) {
                self.fail = fail;
            }
            Ok(())
        }

        fn on_event(&mut self, event: &WorldEvent, ctx: &mut PluginContext) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sample failure");
            }
            match event {
                WorldEvent::Logout { index } => ctx.send_message(*index, "bye"),
                WorldEvent::StateChanged {
                    entity,
                    state: EntityState::Active,
                } => ctx.send_message(entity.index, "active"),
                WorldEvent::PositionChanged { entity, old: None, .. } => {
                    ctx.send_message(entity.index, "placed")
                }
                _ => {}
            }
            Ok(())
        }
    }

    struct Broken;

    impl Plugin for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn init(&mut self, _config: &Value) -> anyhow::Result<()> {
            anyhow::bail!("cannot init")
        }

        fn on_event(&mut self, _event: &WorldEvent, _ctx: &mut PluginContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn scratch_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rustscape-plugins-{}-{}", label, std::process::id()))
    }

    #[tokio::test]
    async fn test_missing_config_is_null() {
        let mut manager = PluginManager::new(scratch_dir("missing"));
        manager.register(Box::new(Sample::default()));
        manager.init().await;
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_config_file_loaded() {
        let dir = scratch_dir("present");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("sample.json"), r#"{"answer": 42}"#)
            .await
            .unwrap();

        let value = load_plugin_config(&dir, "sample").await.unwrap();
        assert_eq!(value["answer"], 42);

        tokio::fs::write(dir.join("sample.json"), "{ not json")
            .await
            .unwrap();
        assert!(load_plugin_config(&dir, "sample").await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_init_drops_plugin() {
        let mut manager = PluginManager::new(scratch_dir("broken"));
        manager.register(Box::new(Broken));
        manager.register(Box::new(Sample::default()));
        manager.init().await;
        assert_eq!(manager.names(), vec!["sample"]);
    }

    #[test]
    fn test_failing_plugin_does_not_stop_dispatch() {
        let mut manager = PluginManager::new("unused");
        manager.register(Box::new(Sample { fail: true }));
        manager.register(Box::new(Sample::default()));

        manager.publish(&WorldEvent::Logout { index: 4 });
        let actions = manager.take_actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            PluginAction::SendMessage { index: 4, message } if message == "bye"
        ));
        assert!(manager.take_actions().is_empty());
    }

    #[test]
    fn test_entity_hooks_become_events() {
        let mut manager = PluginManager::new("unused");
        manager.register(Box::new(Sample::default()));
        let mut regions = RegionManager::new();
        let mut entity = Entity::new(EntityId::player(7), &mut NoopListener);
        entity
            .set_position(Position::new(3200, 3200, 0), &mut regions, &mut manager)
            .unwrap();
        entity
            .set_state(EntityState::Active, &mut regions, &mut manager)
            .unwrap();

        let messages: Vec<_> = manager
            .take_actions()
            .into_iter()
            .filter_map(|action| match action {
                PluginAction::SendMessage { index, message } => Some((index, message)),
                _ => None,
            })
            .collect();
        assert_eq!(
            messages,
            vec![(7, "placed".to_string()), (7, "active".to_string())]
        );
    }

    #[test]
    fn test_context_records_in_order() {
        let mut ctx = PluginContext::new();
        ctx.send_message(1, "one");
        ctx.broadcast(PlayerRights::Administrator, "two");
        assert_eq!(ctx.actions().len(), 2);
        assert!(matches!(
            &ctx.actions()[1],
            PluginAction::Broadcast { min_rights: PlayerRights::Administrator, .. }
        ));
    }
}
