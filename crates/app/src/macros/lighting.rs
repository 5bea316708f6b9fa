//! `LIGHTING` macros: buttons toggle a group of lighting controls.
//!
//! Settings:
//!
//! ```json
//! {
//!   "buttons": [{ "control": "wb-gpio/A1", "trigger": "1" }],
//!   "lightings": ["wb-mr6cu_21/K1", "wb-mr6cu_21/K2"]
//! }
//! ```
//!
//! State: `{ "switch": "ON" | "OFF" }`.

use serde::{Deserialize, Serialize};

use wbhub_domain::error::{HubError, InvalidArgumentsError};
use wbhub_domain::event::OutboundMessage;
use wbhub_domain::id::ControlKey;
use wbhub_domain::macros::MacrosConfig;

use super::{Macros, MacrosInput};
use crate::reconciler::World;

pub const KIND: &str = "LIGHTING";

#[derive(Debug, Clone, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    buttons: Vec<Button>,
    #[serde(default)]
    lightings: Vec<ControlKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct Button {
    control: ControlKey,
    #[serde(default = "Button::default_trigger")]
    trigger: String,
}

impl Button {
    fn default_trigger() -> String {
        "1".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Switch {
    On,
    #[default]
    Off,
}

impl Switch {
    fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    /// Value written to a lighting control's command topic.
    fn payload(self) -> &'static str {
        match self {
            Self::On => "1",
            Self::Off => "0",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct State {
    #[serde(default)]
    switch: Switch,
}

impl State {
    fn parse(value: &serde_json::Value) -> Result<Self, HubError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|err| InvalidArgumentsError::InvalidSettings(err).into())
    }
}

/// Toggles its lightings whenever one of its buttons reaches its trigger.
#[derive(Debug)]
pub struct Lighting {
    config: MacrosConfig,
    settings: Settings,
    switch: Switch,
}

impl Lighting {
    /// Constructor registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::InvalidSettings`] when settings or
    /// state do not match the lighting shape.
    pub fn build(config: MacrosConfig) -> Result<Box<dyn Macros>, HubError> {
        let settings: Settings = serde_json::from_value(config.settings.clone())
            .map_err(InvalidArgumentsError::InvalidSettings)?;
        let state = State::parse(&config.state)?;
        let mut lighting = Self {
            config,
            settings,
            switch: state.switch,
        };
        lighting.set_switch(state.switch);
        Ok(Box::new(lighting))
    }

    #[must_use]
    pub fn switch(&self) -> Switch {
        self.switch
    }

    fn set_switch(&mut self, switch: Switch) {
        self.switch = switch;
        self.config.state = serde_json::json!({ "switch": switch.as_str() });
    }

    fn button_pressed(&self, input: &MacrosInput<'_>) -> bool {
        self.settings.buttons.iter().any(|button| {
            input.value_changed(&button.control)
                && input
                    .current(&button.control)
                    .is_some_and(|control| control.value == button.trigger)
        })
    }

    fn lightings_on(&self, world: &World) -> bool {
        self.settings
            .lightings
            .iter()
            .filter_map(|key| world.control(key))
            .any(|control| control.value == "1")
    }

    fn commands(&self, world: &World) -> Vec<OutboundMessage> {
        let payload = self.switch.payload();
        self.settings
            .lightings
            .iter()
            .filter_map(|key| {
                let control = world.control(key).filter(|c| c.is_writable());
                if control.is_none() {
                    tracing::debug!(macros_id = %self.config.id, control = %key, "lighting is not writable");
                }
                control
            })
            .map(|control| OutboundMessage::new(&control.topic, payload))
            .collect()
    }
}

impl Macros for Lighting {
    fn config(&self) -> &MacrosConfig {
        &self.config
    }

    fn accept(&mut self, input: &MacrosInput<'_>) -> Vec<OutboundMessage> {
        if self.button_pressed(input) {
            self.set_switch(self.switch.toggled());
            tracing::debug!(
                macros_id = %self.config.id,
                switch = self.switch.as_str(),
                "lighting toggled"
            );
            return self.commands(input.world);
        }

        let lighting_touched = self
            .settings
            .lightings
            .iter()
            .any(|key| input.current(key).is_some());
        if lighting_touched {
            let observed = if self.lightings_on(input.world) {
                Switch::On
            } else {
                Switch::Off
            };
            if observed != self.switch {
                self.set_switch(observed);
            }
        }
        Vec::new()
    }

    fn set_state(&mut self, state: serde_json::Value) -> Result<(), HubError> {
        let state = State::parse(&state)?;
        self.set_switch(state.switch);
        Ok(())
    }
}
