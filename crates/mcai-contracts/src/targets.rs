use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::McaiError;

/// Block-editor profile a request is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Microbit,
    Arcade,
    Maker,
}

pub const TARGETS: &[Target] = &[Target::Microbit, Target::Arcade, Target::Maker];

const MICROBIT_NAMESPACES: &[&str] = &[
    "basic",
    "input",
    "music",
    "led",
    "radio",
    "pins",
    "loops",
    "logic",
    "variables",
    "math",
    "functions",
    "arrays",
    "text",
    "game",
    "images",
    "serial",
    "control",
];

const ARCADE_NAMESPACES: &[&str] = &[
    "controller",
    "game",
    "scene",
    "sprites",
    "info",
    "music",
    "effects",
];

const MAKER_NAMESPACES: &[&str] = &["pins", "input", "loops", "music"];

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Microbit => "microbit",
            Self::Arcade => "arcade",
            Self::Maker => "maker",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Microbit => "micro:bit",
            Self::Arcade => "Arcade",
            Self::Maker => "Maker",
        }
    }

    pub fn allowed_namespaces(self) -> &'static [&'static str] {
        match self {
            Self::Microbit => MICROBIT_NAMESPACES,
            Self::Arcade => ARCADE_NAMESPACES,
            Self::Maker => MAKER_NAMESPACES,
        }
    }

    /// Minimal program known to decompile to blocks for this target.
    pub fn fallback_stub(self) -> &'static str {
        match self {
            Self::Arcade => {
                "controller.A.onEvent(ControllerButtonEvent.Pressed, function () {\n    game.splash(\"Start!\")\n})\ngame.onUpdate(function () {\n})"
            }
            Self::Maker => "loops.forever(function () {\n})",
            Self::Microbit => "basic.onStart(function () {\n    basic.showString(\"Hi\")\n})",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = McaiError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TARGETS
            .iter()
            .copied()
            .find(|target| target.as_str() == raw)
            .ok_or_else(|| McaiError::InvalidTarget(raw.to_string()))
    }
}
