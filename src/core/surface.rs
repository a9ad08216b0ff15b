/// Presentation surface, input signals, and scene-exit seams.
///
/// The engine only ever writes to a surface; it never reads back.
use serde::{Deserialize, Serialize};

use crate::schema::asset::AssetHandle;

/// Discrete player input, already mapped from raw device events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSignal {
    Advance,
    Skip,
    PauseToggle,
}

/// Identifies one option affordance in one specific option list.
///
/// The generation changes every time the list is rebuilt, so a token
/// can never select an option from a list it was not issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionToken {
    pub generation: u64,
    pub index: usize,
}

/// A selectable option as handed to the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionBinding {
    pub token: OptionToken,
    pub label: String,
    pub target: String,
}

/// Everything the engine can tell a renderer to do.
pub trait PresentationSurface {
    fn set_speaker(&mut self, name: &str);
    /// Replace the body text with `text` (a full line or a partial reveal).
    fn set_text(&mut self, text: &str);
    fn set_portrait_visible(&mut self, slot: &str, visible: bool);
    fn set_portrait_sprite(&mut self, slot: &str, sprite: &AssetHandle);
    fn set_background(&mut self, sprite: &AssetHandle);
    fn set_panel_opacity(&mut self, opacity: f32);
    fn set_volume(&mut self, volume: f32);
    fn play_clip(&mut self, clip: &AssetHandle, looping: bool);
    fn show_options(&mut self, options: &[OptionBinding]);
    fn clear_options(&mut self);
    fn set_pause_menu_visible(&mut self, visible: bool);
}

/// Hands control to whatever loads named scenes outside the dialogue.
pub trait SceneTransition {
    fn load_scene(&mut self, scene: &str);
}

impl<F: FnMut(&str)> SceneTransition for F {
    fn load_scene(&mut self, scene: &str) {
        self(scene)
    }
}

/// A recorded surface call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SurfaceCommand {
    Speaker { name: String },
    Text { text: String },
    PortraitVisible { slot: String, visible: bool },
    PortraitSprite { slot: String, sprite: AssetHandle },
    Background { sprite: AssetHandle },
    PanelOpacity { opacity: f32 },
    Volume { volume: f32 },
    PlayClip { clip: AssetHandle, looping: bool },
    ShowOptions { options: Vec<OptionBinding> },
    ClearOptions,
    PauseMenu { visible: bool },
}

/// A surface that records every command, plus the latest value of each
/// piece of visible state. Used by tests, the terminal player, and the
/// browser bindings.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Vec<SurfaceCommand>,
    pub speaker: String,
    pub text: String,
    pub background: Option<AssetHandle>,
    pub panel_opacity: f32,
    pub volume: f32,
    pub clip: Option<AssetHandle>,
    pub options: Vec<OptionBinding>,
    pub pause_menu_visible: bool,
    pub portraits: Vec<(String, bool, Option<AssetHandle>)>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self {
            panel_opacity: 1.0,
            volume: 1.0,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[SurfaceCommand] {
        &self.commands
    }

    /// Take every command recorded so far, leaving the state snapshot intact.
    pub fn drain(&mut self) -> Vec<SurfaceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn portrait_visible(&self, slot: &str) -> bool {
        self.portraits
            .iter()
            .any(|(s, visible, _)| s == slot && *visible)
    }

    pub fn portrait_sprite(&self, slot: &str) -> Option<&AssetHandle> {
        self.portraits
            .iter()
            .find(|(s, _, _)| s == slot)
            .and_then(|(_, _, sprite)| sprite.as_ref())
    }

    fn portrait_mut(&mut self, slot: &str) -> &mut (String, bool, Option<AssetHandle>) {
        let pos = match self.portraits.iter().position(|(s, _, _)| s == slot) {
            Some(pos) => pos,
            None => {
                self.portraits.push((slot.to_string(), false, None));
                self.portraits.len() - 1
            }
        };
        &mut self.portraits[pos]
    }
}

impl PresentationSurface for CommandLog {
    fn set_speaker(&mut self, name: &str) {
        self.speaker = name.to_string();
        self.commands.push(SurfaceCommand::Speaker {
            name: name.to_string(),
        });
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.commands.push(SurfaceCommand::Text {
            text: text.to_string(),
        });
    }

    fn set_portrait_visible(&mut self, slot: &str, visible: bool) {
        self.portrait_mut(slot).1 = visible;
        self.commands.push(SurfaceCommand::PortraitVisible {
            slot: slot.to_string(),
            visible,
        });
    }

    fn set_portrait_sprite(&mut self, slot: &str, sprite: &AssetHandle) {
        self.portrait_mut(slot).2 = Some(sprite.clone());
        self.commands.push(SurfaceCommand::PortraitSprite {
            slot: slot.to_string(),
            sprite: sprite.clone(),
        });
    }

    fn set_background(&mut self, sprite: &AssetHandle) {
        self.background = Some(sprite.clone());
        self.commands.push(SurfaceCommand::Background {
            sprite: sprite.clone(),
        });
    }

    fn set_panel_opacity(&mut self, opacity: f32) {
        self.panel_opacity = opacity;
        self.commands.push(SurfaceCommand::PanelOpacity { opacity });
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.commands.push(SurfaceCommand::Volume { volume });
    }

    fn play_clip(&mut self, clip: &AssetHandle, looping: bool) {
        self.clip = Some(clip.clone());
        self.commands.push(SurfaceCommand::PlayClip {
            clip: clip.clone(),
            looping,
        });
    }

    fn show_options(&mut self, options: &[OptionBinding]) {
        self.options = options.to_vec();
        self.commands.push(SurfaceCommand::ShowOptions {
            options: options.to_vec(),
        });
    }

    fn clear_options(&mut self) {
        self.options.clear();
        self.commands.push(SurfaceCommand::ClearOptions);
    }

    fn set_pause_menu_visible(&mut self, visible: bool) {
        self.pause_menu_visible = visible;
        self.commands.push(SurfaceCommand::PauseMenu { visible });
    }
}
