//! Models that can back an assistant.

use std::fmt;
use std::str::FromStr;

/// Known assistant-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Gpt4Turbo,
    Gpt4Vision,
    Gpt4,
    Gpt4Context32k,
    Gpt35Turbo1106,
    Gpt35Turbo,
    Gpt35Turbo16k,
}

impl Model {
    pub const ALL: &'static [Model] = &[
        Model::Gpt4Turbo,
        Model::Gpt4Vision,
        Model::Gpt4,
        Model::Gpt4Context32k,
        Model::Gpt35Turbo1106,
        Model::Gpt35Turbo,
        Model::Gpt35Turbo16k,
    ];

    /// API identifier.
    pub fn id(self) -> &'static str {
        match self {
            Model::Gpt4Turbo => "gpt-4-1106-preview",
            Model::Gpt4Vision => "gpt-4-vision-preview",
            Model::Gpt4 => "gpt-4-0613",
            Model::Gpt4Context32k => "gpt-4-32k-0613",
            Model::Gpt35Turbo1106 => "gpt-3.5-turbo-1106",
            Model::Gpt35Turbo => "gpt-3.5-turbo",
            Model::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
        }
    }

    /// Context window in tokens.
    pub fn context_window(self) -> u32 {
        match self {
            Model::Gpt4Turbo | Model::Gpt4Vision => 128_000,
            Model::Gpt4 => 8_192,
            Model::Gpt4Context32k => 32_768,
            Model::Gpt35Turbo1106 | Model::Gpt35Turbo16k => 16_385,
            Model::Gpt35Turbo => 4_096,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Model::Gpt4Turbo => "GPT-4 Turbo with JSON mode and parallel function calling",
            Model::Gpt4Vision => "GPT-4 Turbo with image understanding",
            Model::Gpt4 => "GPT-4 base model",
            Model::Gpt4Context32k => "GPT-4 with extended context",
            Model::Gpt35Turbo1106 => "Latest GPT-3.5 Turbo",
            Model::Gpt35Turbo => "GPT-3.5 Turbo base model",
            Model::Gpt35Turbo16k => "GPT-3.5 Turbo with extended context",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Gpt4Turbo
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .iter()
            .copied()
            .find(|m| m.id() == s)
            .ok_or_else(|| format!("Unknown model: {s}"))
    }
}
