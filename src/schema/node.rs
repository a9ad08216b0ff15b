use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One spoken utterance within a node.
///
/// `speaker` is a stable character identifier, not a display name. The
/// roster maps it to a portrait slot and to the name shown on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    /// Empty for narration: no name shown, no portrait.
    #[serde(default, alias = "name")]
    pub speaker: String,
    pub text: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub emotion: Option<String>,
    #[serde(
        default,
        alias = "backgroundOverride",
        deserialize_with = "empty_as_none"
    )]
    pub background_override: Option<String>,
}

/// One player choice. `target` is either a node id or the exit sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueOption {
    #[serde(alias = "text")]
    pub label: String,
    #[serde(alias = "targetNodeId", alias = "nextNode")]
    pub target: String,
}

/// One narrative beat: a run of lines followed by branching options.
///
/// An empty option list marks a terminal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub background: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub music: Option<String>,
    #[serde(alias = "dialogue")]
    pub lines: Vec<DialogueLine>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub options: Vec<DialogueOption>,
}

impl DialogueNode {
    /// Returns true if the node has no options to follow its lines.
    pub fn is_terminal(&self) -> bool {
        self.options.is_empty()
    }

    /// Ids of every node this one can branch to, in option order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|o| o.target.as_str())
    }
}

// Legacy JSON writes "" for unset cues; treat those as absent.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

// Options may be a bare list, `null`, or `None`; absent lists are terminal.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<DialogueOption>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptionsVisitor;

    impl<'de> Visitor<'de> for OptionsVisitor {
        type Value = Vec<DialogueOption>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of options or null")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D2>(self, deserializer: D2) -> Result<Self::Value, D2::Error>
        where
            D2: Deserializer<'de>,
        {
            Vec::deserialize(deserializer)
        }

        fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            Vec::deserialize(de::value::SeqAccessDeserializer::new(seq))
        }
    }

    deserializer.deserialize_any(OptionsVisitor)
}
