/// Character roster: maps stable speaker ids to portrait slots.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a character is drawn and which sprite set it uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortraitSlot {
    /// Stable identifier matched against `DialogueLine::speaker`.
    pub id: String,
    /// Name shown in the speaker field. Falls back to `id` when unset.
    #[serde(default)]
    pub display_name: Option<String>,
    /// UI slot the portrait is drawn in.
    pub slot: String,
    /// Prefix for emotion sprites: `<sprite_set>/<emotion>`.
    pub sprite_set: String,
}

impl PortraitSlot {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// Asset key for this character's sprite in the given emotion.
    pub fn sprite_key(&self, emotion: &str) -> String {
        format!("{}/{}", self.sprite_set, emotion)
    }
}

/// Registry of every character that owns a portrait slot.
///
/// Adding a character is a data entry here, not a code change in the engine.
#[derive(Debug, Clone, Default)]
pub struct CharacterRoster {
    characters: FxHashMap<String, PortraitSlot>,
    // Registration order, so slot hiding is deterministic.
    order: Vec<String>,
}

impl CharacterRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, character: PortraitSlot) {
        if !self.characters.contains_key(&character.id) {
            self.order.push(character.id.clone());
        }
        self.characters.insert(character.id.clone(), character);
    }

    pub fn get(&self, speaker: &str) -> Option<&PortraitSlot> {
        self.characters.get(speaker)
    }

    /// Every registered character, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &PortraitSlot> {
        self.order.iter().filter_map(|id| self.characters.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The name to show for a speaker id.
    pub fn display_name<'a>(&'a self, speaker: &'a str) -> &'a str {
        self.get(speaker).map_or(speaker, PortraitSlot::display_name)
    }

    /// Load characters from a RON file holding a list of `PortraitSlot`s.
    pub fn load_from_ron(&mut self, path: &Path) -> Result<(), RosterError> {
        let contents = std::fs::read_to_string(path)?;
        self.parse_from_ron(&contents)
    }

    pub fn parse_from_ron(&mut self, input: &str) -> Result<(), RosterError> {
        let characters: Vec<PortraitSlot> = ron::from_str(input)?;
        for character in characters {
            self.register(character);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
