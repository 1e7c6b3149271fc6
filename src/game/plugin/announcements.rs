//! Periodic staff announcements

use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::game::event::WorldEvent;
use crate::game::player::PlayerRights;
use crate::game::plugin::{Plugin, PluginContext};
use crate::game::task::{Task, TaskControl};
use crate::game::world::World;

fn default_interval_ticks() -> u64 {
    30
}

fn default_messages() -> Vec<String> {
    vec![
        "Remember to check the reports queue.".to_string(),
        "Server uptime is tracked in the world info log.".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementsConfig {
    /// Ticks between announcements
    #[serde(default = "default_interval_ticks")]
    pub interval_ticks: u64,

    /// Lines to pick from at random
    #[serde(default = "default_messages")]
    pub messages: Vec<String>,
}

impl Default for AnnouncementsConfig {
    fn default() -> Self {
        Self {
            interval_ticks: default_interval_ticks(),
            messages: default_messages(),
        }
    }
}

/// Sends a random configured line to every administrator on a fixed interval
#[derive(Debug, Default)]
pub struct AnnouncementsPlugin {
    config: AnnouncementsConfig,
}

impl AnnouncementsPlugin {
    pub fn config(&self) -> &AnnouncementsConfig {
        &self.config
    }
}

impl Plugin for AnnouncementsPlugin {
    fn name(&self) -> &str {
        "announcements"
    }

    fn init(&mut self, config: &Value) -> anyhow::Result<()> {
        if !config.is_null() {
            self.config = AnnouncementsConfig::deserialize(config)?;
        }
        Ok(())
    }

    fn on_event(&mut self, event: &WorldEvent, ctx: &mut PluginContext) -> anyhow::Result<()> {
        if !matches!(event, WorldEvent::ServerLaunch) {
            return Ok(());
        }
        if self.config.messages.is_empty() {
            debug!("No announcements configured");
            return Ok(());
        }

        let messages = self.config.messages.clone();
        ctx.schedule(Task::repeating(
            "announcements",
            self.config.interval_ticks,
            move |world: &mut World| {
                if let Some(line) = messages.choose(&mut rand::thread_rng()) {
                    world.broadcast(PlayerRights::Administrator, line);
                }
                Ok(TaskControl::Continue)
            },
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::plugin::PluginAction;
    use serde_json::json;

    #[test]
    fn test_null_config_uses_defaults() {
        let mut plugin = AnnouncementsPlugin::default();
        plugin.init(&Value::Null).unwrap();
        assert_eq!(plugin.config().interval_ticks, 30);
        assert!(!plugin.config().messages.is_empty());
    }

    #[test]
    fn test_custom_config() {
        let mut plugin = AnnouncementsPlugin::default();
        plugin
            .init(&json!({ "interval_ticks": 5, "messages": ["hello staff"] }))
            .unwrap();
        assert_eq!(plugin.config().interval_ticks, 5);
        assert_eq!(plugin.config().messages, vec!["hello staff".to_string()]);

        assert!(plugin.init(&json!({ "interval_ticks": "soon" })).is_err());
    }

    #[test]
    fn test_schedules_on_launch_only() {
        let mut plugin = AnnouncementsPlugin::default();
        let mut ctx = PluginContext::new();
        plugin
            .on_event(&WorldEvent::Logout { index: 1 }, &mut ctx)
            .unwrap();
        assert!(ctx.actions().is_empty());

        plugin.on_event(&WorldEvent::ServerLaunch, &mut ctx).unwrap();
        match ctx.actions() {
            [PluginAction::Schedule(task)] => {
                assert_eq!(task.name(), "announcements");
                assert_eq!(task.interval(), Some(30));
            }
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn test_empty_messages_schedule_nothing() {
        let mut plugin = AnnouncementsPlugin::default();
        plugin.init(&json!({ "messages": [] })).unwrap();
        let mut ctx = PluginContext::new();
        plugin.on_event(&WorldEvent::ServerLaunch, &mut ctx).unwrap();
        assert!(ctx.actions().is_empty());
    }
}
