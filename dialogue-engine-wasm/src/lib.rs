//! WASM bindings for dialogue-engine, driving a browser-rendered dialogue.
//!
//! The page owns rendering: it calls `tick` every animation frame, then
//! replays `drain_commands()` onto its DOM.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;

use dialogue_engine::core::config::EngineConfig;
use dialogue_engine::core::engine::{DialogueEngine, LoadOutcome};
use dialogue_engine::core::store::MemoryNodeStore;
use dialogue_engine::core::surface::{CommandLog, InputSignal};
use dialogue_engine::schema::asset::{AssetCategory, AssetHandle, AssetProvider};
use dialogue_engine::schema::character::CharacterRoster;

/// Every asset is assumed to exist; the page maps handle keys to URLs
/// and handles its own 404s.
struct BrowserAssets;

impl AssetProvider for BrowserAssets {
    fn resolve(&self, category: AssetCategory, id: &str) -> Option<AssetHandle> {
        Some(AssetHandle::new(category, format!("{}/{}", category.dir(), id)))
    }
}

/// Frame time from a JS millisecond count. Oversized values clamp to
/// `Duration::MAX`; negative, zero and NaN values are dropped.
fn frame_time(ms: f64) -> Option<Duration> {
    if ms.is_nan() || ms <= 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX))
}

#[derive(serde::Serialize)]
struct StateInfo<'a> {
    node: Option<&'a str>,
    line_index: usize,
    phase: String,
    paused: bool,
    finished: bool,
}

#[wasm_bindgen]
pub struct WebDialogue {
    engine: DialogueEngine<CommandLog>,
    exited_to: Rc<RefCell<Option<String>>>,
}

#[wasm_bindgen]
impl WebDialogue {
    /// Create a dialogue from a JSON object mapping node ids to node
    /// documents. `roster_ron` and `config_json` are optional.
    #[wasm_bindgen(constructor)]
    pub fn new(
        nodes_json: &str,
        roster_ron: Option<String>,
        config_json: Option<String>,
    ) -> Result<WebDialogue, JsError> {
        let store = MemoryNodeStore::from_json_map(nodes_json)
            .map_err(|e| JsError::new(&format!("Invalid nodes JSON: {e}")))?;

        let mut roster = CharacterRoster::new();
        if let Some(src) = roster_ron {
            roster
                .parse_from_ron(&src)
                .map_err(|e| JsError::new(&format!("Roster parse error: {e}")))?;
        }

        let config: EngineConfig = match config_json {
            Some(src) => serde_json::from_str(&src)
                .map_err(|e| JsError::new(&format!("Invalid config JSON: {e}")))?,
            None => EngineConfig::default(),
        };

        let exited_to = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&exited_to);
        let engine = DialogueEngine::builder()
            .with_store(store)
            .with_assets(BrowserAssets)
            .with_roster(roster)
            .with_config(config)
            .with_scene_transition(move |scene: &str| {
                *sink.borrow_mut() = Some(scene.to_string());
            })
            .build(CommandLog::new())
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

        Ok(WebDialogue { engine, exited_to })
    }

    /// Load the start node. Returns true if the start node was the exit.
    pub fn start(&mut self) -> Result<bool, JsError> {
        let outcome = self
            .engine
            .start()
            .map_err(|e| JsError::new(&format!("Start error: {e}")))?;
        Ok(outcome == LoadOutcome::Exited)
    }

    /// Advance timed effects by `ms` milliseconds.
    pub fn tick(&mut self, ms: f64) {
        if let Some(dt) = frame_time(ms) {
            self.engine.tick(dt);
        }
    }

    pub fn advance(&mut self) {
        self.engine.handle_input(InputSignal::Advance);
    }

    pub fn skip(&mut self) {
        self.engine.handle_input(InputSignal::Skip);
    }

    /// Returns the new paused state.
    pub fn toggle_pause(&mut self) -> bool {
        self.engine.handle_input(InputSignal::PauseToggle);
        self.engine.is_paused()
    }

    /// Pick option `index` of the list on screen. Returns true if the
    /// choice left the dialogue.
    pub fn choose(&mut self, index: usize) -> Result<bool, JsError> {
        let outcome = self
            .engine
            .choose(index)
            .map_err(|e| JsError::new(&format!("Choice error: {e}")))?;
        Ok(outcome == LoadOutcome::Exited)
    }

    /// JSON array of surface commands recorded since the last call.
    pub fn drain_commands(&mut self) -> Result<String, JsError> {
        let commands = self.engine.surface_mut().drain();
        serde_json::to_string(&commands)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// JSON array of diagnostics recorded since the last call.
    pub fn drain_diagnostics(&mut self) -> Result<String, JsError> {
        let messages: Vec<String> = self
            .engine
            .take_diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect();
        serde_json::to_string(&messages)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// JSON snapshot of the session state.
    pub fn state(&self) -> Result<String, JsError> {
        let state = self.engine.state();
        let info = StateInfo {
            node: state.current_node.as_ref().map(|n| n.id.as_str()),
            line_index: state.line_index,
            phase: format!("{:?}", state.phase),
            paused: state.paused,
            finished: self.engine.is_finished(),
        };
        serde_json::to_string(&info)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// The scene the dialogue handed off to, once it has exited.
    pub fn exited_to(&self) -> Option<String> {
        self.exited_to.borrow().clone()
    }
}
