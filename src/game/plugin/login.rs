//! Login greetings

use serde::Deserialize;
use serde_json::Value;

use crate::game::event::WorldEvent;
use crate::game::plugin::{Plugin, PluginContext};

fn default_welcome() -> String {
    "Welcome to Rustscape.".to_string()
}

fn default_mute_notice() -> String {
    "You are muted. It can only be overturned by an administrator.".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_welcome")]
    pub welcome: String,

    #[serde(default = "default_mute_notice")]
    pub mute_notice: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            mute_notice: default_mute_notice(),
        }
    }
}

/// Greets players as they log in and reminds muted players of their mute
#[derive(Debug, Default)]
pub struct LoginPlugin {
    config: LoginConfig,
}

impl Plugin for LoginPlugin {
    fn name(&self) -> &str {
        "login"
    }

    fn init(&mut self, config: &Value) -> anyhow::Result<()> {
        if !config.is_null() {
            self.config = LoginConfig::deserialize(config)?;
        }
        Ok(())
    }

    fn on_event(&mut self, event: &WorldEvent, ctx: &mut PluginContext) -> anyhow::Result<()> {
        if let WorldEvent::Login { index, muted, .. } = event {
            ctx.send_message(*index, self.config.welcome.as_str());
            if *muted {
                ctx.send_message(*index, self.config.mute_notice.as_str());
            }
        }
        Ok(())
    }
}
