/// The dialogue engine: node traversal, the line state machine, and
/// the portrait, background and music cues attached to nodes and lines.
///
/// Single-threaded and tick-driven. The host forwards frame time through
/// `tick`, input through `handle_input`, and option clicks through
/// `select_option`. Everything visible goes out through the surface.
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::audio::{AudioCrossfader, CrossfadeOutcome};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::fader::PanelFader;
use crate::core::store::{LoadFailure, NodeStore, NodeStoreError};
use crate::core::surface::{InputSignal, OptionBinding, OptionToken, PresentationSurface, SceneTransition};
use crate::core::timing::TaskStatus;
use crate::core::typewriter::Typewriter;
use crate::schema::asset::{AssetCategory, AssetManifest, AssetProvider};
use crate::schema::character::CharacterRoster;
use crate::schema::node::{DialogueLine, DialogueNode};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node load failed: {0}")]
    Node(#[from] NodeStoreError),
    #[error("option target '{target}' could not be loaded: {source}")]
    InvalidTransition {
        target: String,
        #[source]
        source: NodeStoreError,
    },
    #[error("no option at index {0}")]
    NoSuchOption(usize),
    #[error("option token {0:?} belongs to an earlier option list")]
    StaleOption(OptionToken),
    #[error("options are not being shown")]
    NotShowingOptions,
    #[error("input ignored while paused")]
    Paused,
    #[error("the dialogue session has ended")]
    SessionEnded,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Sub-state of the line state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No node has been loaded yet.
    Idle,
    Typing,
    AwaitingAdvance,
    ShowingOptions,
}

/// What a successful load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A node replaced the current one.
    Loaded,
    /// The exit sentinel was targeted; control went to the scene collaborator.
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    NotFound,
    ParseError,
    InvalidTransition,
    MissingAsset,
}

/// A non-fatal problem the engine degraded around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<LoadFailure> for DiagnosticKind {
    fn from(failure: LoadFailure) -> Self {
        match failure {
            LoadFailure::NotFound => Self::NotFound,
            LoadFailure::ParseError => Self::ParseError,
        }
    }
}

/// Mutable session state. Created at engine start, discarded on exit.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub current_node: Option<DialogueNode>,
    pub line_index: usize,
    pub phase: Phase,
    pub current_track: Option<String>,
    pub paused: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            current_node: None,
            line_index: 0,
            phase: Phase::Idle,
            current_track: None,
            paused: false,
        }
    }
}

struct LogExit;

impl SceneTransition for LogExit {
    fn load_scene(&mut self, scene: &str) {
        info!("dialogue exited to scene '{}' with no scene handler installed", scene);
    }
}

/// The dialogue engine. Built via `DialogueEngine::builder()`.
pub struct DialogueEngine<S: PresentationSurface> {
    store: Box<dyn NodeStore>,
    assets: Box<dyn AssetProvider>,
    scenes: Box<dyn SceneTransition>,
    roster: CharacterRoster,
    config: EngineConfig,
    surface: S,
    typewriter: Typewriter,
    panel: PanelFader,
    audio: AudioCrossfader,
    state: EngineState,
    options: Vec<OptionBinding>,
    option_generation: u64,
    // Full text of the line last started, used for the end marker.
    last_text: String,
    diagnostics: Vec<Diagnostic>,
    ended: bool,
}

/// Builder for constructing a `DialogueEngine`.
pub struct DialogueEngineBuilder {
    store: Option<Box<dyn NodeStore>>,
    assets: Option<Box<dyn AssetProvider>>,
    scenes: Option<Box<dyn SceneTransition>>,
    roster: CharacterRoster,
    config: EngineConfig,
}

impl DialogueEngine<crate::core::surface::CommandLog> {
    /// Shorthand for `DialogueEngineBuilder::new()`. The surface type is
    /// chosen later, by `build`.
    pub fn builder() -> DialogueEngineBuilder {
        DialogueEngineBuilder::new()
    }
}

impl Default for DialogueEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueEngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            assets: None,
            scenes: None,
            roster: CharacterRoster::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_store(mut self, store: impl NodeStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_assets(mut self, assets: impl AssetProvider + 'static) -> Self {
        self.assets = Some(Box::new(assets));
        self
    }

    pub fn with_scene_transition(mut self, scenes: impl SceneTransition + 'static) -> Self {
        self.scenes = Some(Box::new(scenes));
        self
    }

    pub fn with_roster(mut self, roster: CharacterRoster) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build<S: PresentationSurface>(self, surface: S) -> Result<DialogueEngine<S>, EngineError> {
        self.config.validate()?;
        let store = self
            .store
            .ok_or_else(|| ConfigError::Invalid("a node store is required".to_string()))?;
        let config = self.config;

        Ok(DialogueEngine {
            store,
            assets: self
                .assets
                .unwrap_or_else(|| Box::new(AssetManifest::default()) as Box<dyn AssetProvider>),
            scenes: self
                .scenes
                .unwrap_or_else(|| Box::new(LogExit) as Box<dyn SceneTransition>),
            roster: self.roster,
            typewriter: Typewriter::new(config.typing_interval(), config.chars_per_tick),
            panel: PanelFader::new(),
            audio: AudioCrossfader::new(config.music_volume, config.music_fade()),
            config,
            surface,
            state: EngineState::default(),
            options: Vec::new(),
            option_generation: 0,
            last_text: String::new(),
            diagnostics: Vec::new(),
            ended: false,
        })
    }
}

impl<S: PresentationSurface> DialogueEngine<S> {
    /// Begin the session: hide the panel, start default music, and load
    /// the configured start node.
    pub fn start(&mut self) -> Result<LoadOutcome, EngineError> {
        self.panel.set(0.0, &mut self.surface);
        if let Some(track) = self.config.default_music.clone() {
            self.play_music(&track);
        }
        let start = self.config.start_node.clone();
        self.load_node(&start)
    }

    /// Load `id` and start playing its first line.
    ///
    /// On failure the current node, line and phase are left exactly as
    /// they were, and a diagnostic is recorded.
    pub fn load_node(&mut self, id: &str) -> Result<LoadOutcome, EngineError> {
        self.transition(id).map_err(|e| {
            if let EngineError::Node(ref source) = e {
                error!("failed to load node '{}': {}", id, source);
                self.record(source.kind().into(), source.to_string());
            }
            e
        })
    }

    fn transition(&mut self, id: &str) -> Result<LoadOutcome, EngineError> {
        if self.ended {
            return Err(EngineError::SessionEnded);
        }
        if id == self.config.exit_node {
            info!("exit sentinel reached, handing off to scene '{}'", self.config.exit_scene);
            self.typewriter.cancel();
            self.clear_options();
            self.ended = true;
            self.scenes.load_scene(&self.config.exit_scene);
            return Ok(LoadOutcome::Exited);
        }

        let node = self.store.load_node(id)?;
        debug!("loaded node '{}' ({} lines, {} options)", id, node.lines.len(), node.options.len());
        self.enter_node(node);
        Ok(LoadOutcome::Loaded)
    }

    fn enter_node(&mut self, node: DialogueNode) {
        self.clear_options();
        if let Some(background) = &node.background {
            self.show_background(background);
        }
        if let Some(track) = &node.music {
            self.play_music(track);
        }
        self.panel.fade(
            0.0,
            1.0,
            self.config.panel_delay(),
            self.config.panel_duration(),
            &mut self.surface,
        );

        self.state.current_node = Some(node);
        self.state.line_index = 0;
        self.advance_line();
    }

    /// Show the next line, or the options once every line has been shown.
    pub fn advance_line(&mut self) -> Phase {
        if self.ended {
            return self.state.phase;
        }
        let Some(node) = self.state.current_node.as_ref() else {
            return self.state.phase;
        };
        let Some(line) = node.lines.get(self.state.line_index).cloned() else {
            self.show_options();
            return self.state.phase;
        };

        self.surface
            .set_speaker(self.roster.display_name(&line.speaker));
        self.state.line_index += 1;
        if let Some(background) = &line.background_override {
            self.show_background(background);
        }

        let (_, status) = self.typewriter.start(&line.text, &mut self.surface);
        self.last_text = line.text.clone();
        self.state.phase = match status {
            TaskStatus::Complete => Phase::AwaitingAdvance,
            _ => Phase::Typing,
        };
        self.update_portraits(&line);
        self.state.phase
    }

    fn update_portraits(&mut self, line: &DialogueLine) {
        for character in self.roster.iter() {
            self.surface.set_portrait_visible(&character.slot, false);
        }
        let Some(character) = self.roster.get(&line.speaker) else {
            return;
        };
        self.surface.set_portrait_visible(&character.slot, true);

        let Some(emotion) = &line.emotion else {
            return;
        };
        let key = character.sprite_key(emotion);
        match self.assets.resolve(AssetCategory::Portrait, &key) {
            Some(sprite) => self.surface.set_portrait_sprite(&character.slot, &sprite),
            None => {
                let message = format!("emotion sprite '{}' not found for '{}'", key, line.speaker);
                warn!("{}", message);
                self.record(DiagnosticKind::MissingAsset, message);
            }
        }
    }

    /// Enter `ShowingOptions`: bind one affordance per option, or show the
    /// end marker on a terminal node.
    /// Does nothing before the first node loads or after the session ends.
    pub fn show_options(&mut self) {
        if self.ended || self.state.current_node.is_none() {
            return;
        }
        self.typewriter.cancel();
        self.clear_options();
        self.state.phase = Phase::ShowingOptions;

        let Some(node) = self.state.current_node.as_ref() else {
            return;
        };
        if node.options.is_empty() {
            debug!("node '{}' is terminal", node.id);
            self.surface.set_speaker("");
            let text = format!("{}{}", self.last_text, self.config.end_marker);
            self.surface.set_text(&text);
            return;
        }

        let generation = self.option_generation;
        self.options = node
            .options
            .iter()
            .enumerate()
            .map(|(index, option)| OptionBinding {
                token: OptionToken { generation, index },
                label: option.label.clone(),
                target: option.target.clone(),
            })
            .collect();
        self.surface.show_options(&self.options);
    }

    fn clear_options(&mut self) {
        self.option_generation += 1;
        self.options.clear();
        self.surface.clear_options();
    }

    /// Follow the option the token was issued for.
    pub fn select_option(&mut self, token: OptionToken) -> Result<LoadOutcome, EngineError> {
        if self.ended {
            return Err(EngineError::SessionEnded);
        }
        if self.state.paused {
            return Err(EngineError::Paused);
        }
        if self.state.phase != Phase::ShowingOptions {
            return Err(EngineError::NotShowingOptions);
        }
        if token.generation != self.option_generation {
            warn!("rejected stale option token {:?}", token);
            return Err(EngineError::StaleOption(token));
        }
        let target = self
            .options
            .get(token.index)
            .map(|binding| binding.target.clone())
            .ok_or(EngineError::NoSuchOption(token.index))?;

        debug!("option {} selected, target '{}'", token.index, target);
        match self.transition(&target) {
            Err(EngineError::Node(source)) => {
                let message = format!("option target '{}' failed to load: {}", target, source);
                error!("{}", message);
                self.record(DiagnosticKind::InvalidTransition, message);
                Err(EngineError::InvalidTransition { target, source })
            }
            other => other,
        }
    }

    /// Select option `index` from the list currently shown.
    pub fn choose(&mut self, index: usize) -> Result<LoadOutcome, EngineError> {
        self.select_option(OptionToken {
            generation: self.option_generation,
            index,
        })
    }

    /// Route one input signal. Advance and skip are dropped while paused.
    pub fn handle_input(&mut self, signal: InputSignal) -> Phase {
        if self.ended {
            return self.state.phase;
        }
        match signal {
            InputSignal::PauseToggle => {
                self.toggle_pause();
            }
            _ if self.state.paused => {
                debug!("ignoring {:?} while paused", signal);
            }
            InputSignal::Skip | InputSignal::Advance if self.state.phase == Phase::Typing => {
                self.skip();
            }
            InputSignal::Advance if self.state.phase == Phase::AwaitingAdvance => {
                self.advance_line();
            }
            _ => {}
        }
        self.state.phase
    }

    /// Finish the line being typed. Harmless when nothing is typing.
    pub fn skip(&mut self) {
        if self.typewriter.skip(&mut self.surface) == TaskStatus::Complete
            && self.state.phase == Phase::Typing
        {
            self.state.phase = Phase::AwaitingAdvance;
        }
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.state.paused = !self.state.paused;
        self.surface.set_pause_menu_visible(self.state.paused);
        debug!("paused: {}", self.state.paused);
        self.state.paused
    }

    /// Advance every timed effect by `dt`. Frozen while paused.
    pub fn tick(&mut self, dt: Duration) {
        if self.state.paused || self.ended {
            return;
        }
        if self.typewriter.tick(dt, &mut self.surface) == TaskStatus::Complete
            && self.state.phase == Phase::Typing
        {
            self.state.phase = Phase::AwaitingAdvance;
        }
        self.panel.tick(dt, &mut self.surface);
        self.audio.tick(dt, &mut self.surface);
    }

    fn show_background(&mut self, id: &str) {
        match self.assets.resolve(AssetCategory::Background, id) {
            Some(sprite) => self.surface.set_background(&sprite),
            None => {
                let message = format!("background '{}' not found", id);
                warn!("{}", message);
                self.record(DiagnosticKind::MissingAsset, message);
            }
        }
    }

    fn play_music(&mut self, track: &str) {
        if self.state.current_track.as_deref() == Some(track) {
            return;
        }
        match self.audio.change_track(track, self.assets.as_ref(), &mut self.surface) {
            Ok(CrossfadeOutcome::Started) | Ok(CrossfadeOutcome::AlreadyPlaying) => {
                self.state.current_track = Some(track.to_string());
            }
            Err(e) => {
                warn!("{}", e);
                self.record(DiagnosticKind::MissingAsset, e.to_string());
            }
        }
    }

    fn record(&mut self, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic { kind, message });
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn current_node(&self) -> Option<&DialogueNode> {
        self.state.current_node.as_ref()
    }

    /// The line most recently started.
    pub fn current_line(&self) -> Option<&DialogueLine> {
        let index = self.state.line_index.checked_sub(1)?;
        self.current_node()?.lines.get(index)
    }

    pub fn line_index(&self) -> usize {
        self.state.line_index
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn is_typing(&self) -> bool {
        self.typewriter.is_typing()
    }

    pub fn current_track(&self) -> Option<&str> {
        self.state.current_track.as_deref()
    }

    /// Options bound to the surface right now.
    pub fn options(&self) -> &[OptionBinding] {
        &self.options
    }

    /// True on a terminal node once its end marker is showing.
    pub fn is_finished(&self) -> bool {
        self.state.phase == Phase::ShowingOptions
            && self.current_node().is_some_and(DialogueNode::is_terminal)
    }

    /// True once the exit sentinel handed control away.
    pub fn has_exited(&self) -> bool {
        self.ended
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn roster(&self) -> &CharacterRoster {
        &self.roster
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryNodeStore;
    use crate::core::surface::{CommandLog, SurfaceCommand};
    use crate::schema::asset::AssetHandle;
    use crate::schema::character::PortraitSlot;
    use crate::schema::node::DialogueOption;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn line(speaker: &str, text: &str, emotion: Option<&str>) -> DialogueLine {
        DialogueLine {
            speaker: speaker.to_string(),
            text: text.to_string(),
            emotion: emotion.map(str::to_string),
            background_override: None,
        }
    }

    fn node(id: &str, lines: Vec<DialogueLine>, options: &[(&str, &str)]) -> DialogueNode {
        DialogueNode {
            id: id.to_string(),
            background: None,
            music: None,
            lines,
            options: options
                .iter()
                .map(|(label, target)| DialogueOption {
                    label: label.to_string(),
                    target: target.to_string(),
                })
                .collect(),
        }
    }

    fn roster() -> CharacterRoster {
        let mut roster = CharacterRoster::new();
        for (id, slot) in [("Fairy", "tooth_fairy"), ("Noah", "noah"), ("Mike", "mike")] {
            roster.register(PortraitSlot {
                id: id.to_string(),
                display_name: None,
                slot: slot.to_string(),
                sprite_set: id.to_string(),
            });
        }
        roster
    }

    fn assets() -> AssetManifest {
        AssetManifest::new()
            .with(AssetCategory::Background, "bedroom")
            .with(AssetCategory::Background, "night")
            .with(AssetCategory::Portrait, "Fairy/happy")
            .with(AssetCategory::Portrait, "Noah/neutral")
            .with(AssetCategory::Music, "calm")
            .with(AssetCategory::Music, "tense")
    }

    fn story() -> MemoryNodeStore {
        let mut start = node(
            "start",
            vec![
                line("Fairy", "Hello.", Some("happy")),
                line("Noah", "Hi!", Some("neutral")),
            ],
            &[("Continue", "node2")],
        );
        start.background = Some("bedroom".to_string());
        start.music = Some("calm".to_string());

        let mut node2 = node(
            "node2",
            vec![line("Mike", "Which way?", None)],
            &[("Left", "left"), ("Right", "right"), ("Nowhere", "missing"), ("Quit", "END")],
        );
        node2.music = Some("tense".to_string());

        let left = node("left", vec![line("Noah", "Left it is.", None)], &[("Back", "node2")]);
        let right = node("right", vec![line("Noah", "The end.", None)], &[]);

        let mut store = MemoryNodeStore::new();
        for n in [&start, &node2, &left, &right] {
            store.insert_node(n).unwrap();
        }
        store.insert_document("broken", crate::core::store::NodeFormat::Ron, "(id: \"broken\"");
        store
    }

    fn engine_with_exits() -> (DialogueEngine<CommandLog>, Rc<RefCell<Vec<String>>>) {
        let exits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&exits);
        let engine = DialogueEngine::builder()
            .with_store(story())
            .with_assets(assets())
            .with_roster(roster())
            .with_scene_transition(move |scene: &str| sink.borrow_mut().push(scene.to_string()))
            .build(CommandLog::new())
            .unwrap();
        (engine, exits)
    }

    fn engine() -> DialogueEngine<CommandLog> {
        engine_with_exits().0
    }

    fn finish_typing(engine: &mut DialogueEngine<CommandLog>) {
        while engine.phase() == Phase::Typing {
            engine.tick(ms(30));
        }
    }

    #[test]
    fn load_resets_cursor_and_starts_typing_first_line() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        assert_eq!(engine.phase(), Phase::Typing);
        assert_eq!(engine.line_index(), 1);
        assert_eq!(engine.current_line().map(|l| l.text.as_str()), Some("Hello."));
        assert_eq!(engine.surface().text, "");

        // Reloading mid-node starts from the top again
        finish_typing(&mut engine);
        engine.handle_input(InputSignal::Advance);
        engine.load_node("start").unwrap();
        assert_eq!(engine.line_index(), 1);
        assert_eq!(engine.phase(), Phase::Typing);
        assert_eq!(engine.current_line().map(|l| l.speaker.as_str()), Some("Fairy"));
    }

    #[test]
    fn walkthrough_start_to_node2() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        finish_typing(&mut engine);
        assert_eq!(engine.phase(), Phase::AwaitingAdvance);
        assert_eq!(engine.surface().text, "Hello.");
        assert_eq!(engine.surface().speaker, "Fairy");

        assert_eq!(engine.handle_input(InputSignal::Advance), Phase::Typing);
        finish_typing(&mut engine);
        assert_eq!(engine.surface().text, "Hi!");
        assert_eq!(engine.surface().speaker, "Noah");

        assert_eq!(engine.handle_input(InputSignal::Advance), Phase::ShowingOptions);
        let options = engine.options().to_vec();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "Continue");
        assert_eq!(engine.surface().options, options);

        engine.select_option(options[0].token).unwrap();
        assert_eq!(engine.current_node().map(|n| n.id.as_str()), Some("node2"));
        assert!(engine.options().is_empty());
    }

    #[test]
    fn skip_twice_matches_skip_once() {
        let mut once = engine();
        once.load_node("start").unwrap();
        once.tick(ms(30));
        once.handle_input(InputSignal::Skip);

        let mut twice = engine();
        twice.load_node("start").unwrap();
        twice.tick(ms(30));
        twice.handle_input(InputSignal::Skip);
        twice.handle_input(InputSignal::Skip);

        assert_eq!(once.surface().text, "Hello.");
        assert_eq!(once.surface().text, twice.surface().text);
        assert_eq!(once.phase(), Phase::AwaitingAdvance);
        assert_eq!(twice.phase(), Phase::AwaitingAdvance);
        assert_eq!(twice.line_index(), 1);
    }

    #[test]
    fn advance_while_typing_skips_instead_of_moving_on() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        assert_eq!(engine.handle_input(InputSignal::Advance), Phase::AwaitingAdvance);
        assert_eq!(engine.surface().text, "Hello.");
        assert_eq!(engine.line_index(), 1);
    }

    #[test]
    fn advance_past_last_line_shows_options_not_typing() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        engine.advance_line();
        assert_eq!(engine.line_index(), 2);
        assert_eq!(engine.advance_line(), Phase::ShowingOptions);
        assert_eq!(engine.advance_line(), Phase::ShowingOptions);
        assert!(!engine.is_typing());
    }

    #[test]
    fn option_index_resolves_after_rebuilds() {
        let mut engine = engine();
        engine.load_node("node2").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        engine.choose(0).unwrap();
        assert_eq!(engine.current_node().unwrap().id, "left");

        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        assert_eq!(engine.options()[0].target, "node2");
        engine.choose(0).unwrap();

        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        let bound: Vec<&str> = engine.options().iter().map(|o| o.target.as_str()).collect();
        assert_eq!(bound, vec!["left", "right", "missing", "END"]);
        engine.choose(1).unwrap();
        assert_eq!(engine.current_node().unwrap().id, "right");
    }

    #[test]
    fn stale_token_is_rejected() {
        let mut engine = engine();
        engine.load_node("node2").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        let stale = engine.options()[1].token;

        engine.choose(0).unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);

        let err = engine.select_option(stale).unwrap_err();
        assert!(matches!(err, EngineError::StaleOption(t) if t == stale));
        assert_eq!(engine.current_node().unwrap().id, "left");
    }

    #[test]
    fn terminal_node_shows_end_marker() {
        let mut engine = engine();
        engine.load_node("right").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);

        assert!(engine.is_finished());
        assert_eq!(engine.surface().speaker, "");
        assert_eq!(engine.surface().text, "The end.\n\n[End]");
        assert!(engine.options().is_empty());

        engine.handle_input(InputSignal::Advance);
        engine.tick(ms(1000));
        assert_eq!(engine.current_node().unwrap().id, "right");
        assert_eq!(engine.surface().text, "The end.\n\n[End]");
        assert!(matches!(engine.choose(0), Err(EngineError::NoSuchOption(0))));
    }

    #[test]
    fn missing_node_leaves_state_unchanged() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        engine.tick(ms(60));
        let text = engine.surface().text.clone();
        let commands = engine.surface().commands().len();

        let err = engine.load_node("missing").unwrap_err();
        assert!(matches!(err, EngineError::Node(NodeStoreError::NotFound(_))));
        assert_eq!(engine.current_node().unwrap().id, "start");
        assert_eq!(engine.phase(), Phase::Typing);
        assert_eq!(engine.line_index(), 1);
        assert_eq!(engine.surface().text, text);
        assert_eq!(engine.surface().commands().len(), commands);
        assert_eq!(engine.diagnostics().len(), 1);
        assert_eq!(engine.diagnostics()[0].kind, DiagnosticKind::NotFound);
    }

    #[test]
    fn malformed_node_records_parse_error() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        assert!(engine.load_node("broken").is_err());
        assert_eq!(engine.current_node().unwrap().id, "start");
        assert_eq!(engine.diagnostics()[0].kind, DiagnosticKind::ParseError);
    }

    #[test]
    fn dangling_option_is_invalid_transition() {
        let mut engine = engine();
        engine.load_node("node2").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);

        let err = engine.choose(2).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { ref target, .. } if target == "missing"));
        assert_eq!(engine.phase(), Phase::ShowingOptions);
        assert_eq!(engine.options().len(), 4);
        assert_eq!(engine.diagnostics()[0].kind, DiagnosticKind::InvalidTransition);

        // The screen is still usable
        engine.choose(0).unwrap();
        assert_eq!(engine.current_node().unwrap().id, "left");
    }

    #[test]
    fn exit_sentinel_hands_off_without_parsing() {
        let (mut engine, exits) = engine_with_exits();
        assert_eq!(engine.load_node("END").unwrap(), LoadOutcome::Exited);
        assert_eq!(*exits.borrow(), vec!["MainMenu".to_string()]);
        assert!(engine.has_exited());
        assert!(engine.current_node().is_none());
        assert!(engine.diagnostics().is_empty());
        assert!(matches!(engine.load_node("start"), Err(EngineError::SessionEnded)));
    }

    #[test]
    fn exit_via_option() {
        let (mut engine, exits) = engine_with_exits();
        engine.load_node("node2").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        assert_eq!(engine.choose(3).unwrap(), LoadOutcome::Exited);
        assert_eq!(exits.borrow().len(), 1);
        assert!(engine.options().is_empty());
    }

    #[test]
    fn direct_calls_after_exit_leave_surface_alone() {
        let mut engine = engine();
        engine.load_node("node2").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        engine.choose(3).unwrap();

        let before = engine.surface().commands().len();
        let phase = engine.phase();
        assert_eq!(engine.advance_line(), phase);
        engine.show_options();
        assert_eq!(engine.surface().commands().len(), before);
        assert_eq!(engine.phase(), phase);
    }

    #[test]
    fn show_options_before_any_node_stays_idle() {
        let mut engine = engine();
        engine.show_options();
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.advance_line(), Phase::Idle);
        assert!(engine.surface().commands().is_empty());
    }

    #[test]
    fn narration_line_clears_speaker_and_portraits() {
        let mut store = story();
        store
            .insert_node(&node(
                "narration",
                vec![line("Fairy", "Psst.", None), line("", "The room goes quiet.", None)],
                &[],
            ))
            .unwrap();
        let mut engine = DialogueEngine::builder()
            .with_store(store)
            .with_assets(assets())
            .with_roster(roster())
            .build(CommandLog::new())
            .unwrap();

        engine.load_node("narration").unwrap();
        engine.skip();
        assert!(engine.surface().portrait_visible("tooth_fairy"));
        engine.handle_input(InputSignal::Advance);
        engine.skip();
        assert_eq!(engine.surface().speaker, "");
        assert_eq!(engine.surface().text, "The room goes quiet.");
        assert!(!engine.surface().portrait_visible("tooth_fairy"));
        assert!(engine.diagnostics().is_empty());
    }

    #[test]
    fn pause_blocks_input_and_freezes_time() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        engine.tick(ms(30));
        assert!(engine.handle_input(InputSignal::PauseToggle) == Phase::Typing);
        assert!(engine.is_paused());
        assert!(engine.surface().pause_menu_visible);

        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        engine.tick(ms(10_000));
        assert_eq!(engine.phase(), Phase::Typing);
        assert_eq!(engine.surface().text, "H");

        engine.handle_input(InputSignal::PauseToggle);
        assert!(!engine.surface().pause_menu_visible);
        engine.tick(ms(30));
        assert_eq!(engine.surface().text, "He");
    }

    #[test]
    fn portraits_follow_speaker() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        let log = engine.surface();
        assert!(log.portrait_visible("tooth_fairy"));
        assert!(!log.portrait_visible("noah"));
        assert!(!log.portrait_visible("mike"));
        assert_eq!(
            log.portrait_sprite("tooth_fairy"),
            Some(&AssetHandle::new(AssetCategory::Portrait, "Fairy/happy"))
        );

        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);
        let log = engine.surface();
        assert!(!log.portrait_visible("tooth_fairy"));
        assert!(log.portrait_visible("noah"));
    }

    #[test]
    fn unknown_speaker_hides_every_portrait() {
        let mut store = MemoryNodeStore::new();
        store
            .insert_node(&node("n", vec![line("Narrator", "Night falls.", None)], &[]))
            .unwrap();
        let mut engine = DialogueEngine::builder()
            .with_store(store)
            .with_roster(roster())
            .build(CommandLog::new())
            .unwrap();
        engine.load_node("n").unwrap();
        let log = engine.surface();
        assert_eq!(log.speaker, "Narrator");
        for slot in ["tooth_fairy", "noah", "mike"] {
            assert!(!log.portrait_visible(slot));
        }
    }

    #[test]
    fn missing_emotion_sprite_keeps_previous() {
        let mut store = MemoryNodeStore::new();
        store
            .insert_node(&node(
                "n",
                vec![line("Fairy", "A.", Some("happy")), line("Fairy", "B.", Some("furious"))],
                &[],
            ))
            .unwrap();
        let mut engine = DialogueEngine::builder()
            .with_store(store)
            .with_assets(assets())
            .with_roster(roster())
            .build(CommandLog::new())
            .unwrap();
        engine.load_node("n").unwrap();
        engine.handle_input(InputSignal::Skip);
        engine.handle_input(InputSignal::Advance);

        assert!(engine.surface().portrait_visible("tooth_fairy"));
        assert_eq!(
            engine.surface().portrait_sprite("tooth_fairy"),
            Some(&AssetHandle::new(AssetCategory::Portrait, "Fairy/happy"))
        );
        assert_eq!(engine.diagnostics().len(), 1);
        assert_eq!(engine.diagnostics()[0].kind, DiagnosticKind::MissingAsset);
    }

    #[test]
    fn node_cues_set_background_music_and_fade_panel() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        let log = engine.surface();
        assert_eq!(
            log.background,
            Some(AssetHandle::new(AssetCategory::Background, "bedroom"))
        );
        assert_eq!(engine.current_track(), Some("calm"));
        assert_eq!(log.panel_opacity, 0.0);

        engine.tick(ms(500));
        engine.tick(ms(1000));
        assert_eq!(engine.surface().panel_opacity, 1.0);
        assert_eq!(engine.surface().volume, 1.0);
    }

    #[test]
    fn same_music_across_nodes_does_not_restart() {
        let mut store = story();
        let mut again = node("again", vec![line("Noah", "Again.", None)], &[]);
        again.music = Some("calm".to_string());
        store.insert_node(&again).unwrap();

        let mut engine = DialogueEngine::builder()
            .with_store(store)
            .with_assets(assets())
            .build(CommandLog::new())
            .unwrap();
        engine.load_node("start").unwrap();
        engine.load_node("again").unwrap();
        let plays = engine
            .surface()
            .commands()
            .iter()
            .filter(|c| matches!(c, SurfaceCommand::PlayClip { .. }))
            .count();
        assert_eq!(plays, 1);
    }

    #[test]
    fn start_uses_config() {
        let config = EngineConfig {
            start_node: "node2".to_string(),
            default_music: Some("calm".to_string()),
            ..EngineConfig::default()
        };
        let mut engine = DialogueEngine::builder()
            .with_store(story())
            .with_assets(assets())
            .with_config(config)
            .build(CommandLog::new())
            .unwrap();
        engine.start().unwrap();
        assert_eq!(engine.current_node().unwrap().id, "node2");
        // node2 asks for "tense", superseding the default track
        assert_eq!(engine.current_track(), Some("tense"));
        assert_eq!(engine.surface().commands()[0], SurfaceCommand::PanelOpacity { opacity: 0.0 });
    }

    /// Remembers only the latest text, to show any surface type can host the engine.
    #[derive(Default)]
    struct TextOnly {
        text: String,
    }

    impl PresentationSurface for TextOnly {
        fn set_speaker(&mut self, _name: &str) {}
        fn set_text(&mut self, text: &str) {
            self.text = text.to_string();
        }
        fn set_portrait_visible(&mut self, _slot: &str, _visible: bool) {}
        fn set_portrait_sprite(&mut self, _slot: &str, _sprite: &AssetHandle) {}
        fn set_background(&mut self, _sprite: &AssetHandle) {}
        fn set_panel_opacity(&mut self, _opacity: f32) {}
        fn set_volume(&mut self, _volume: f32) {}
        fn play_clip(&mut self, _clip: &AssetHandle, _looping: bool) {}
        fn show_options(&mut self, _options: &[OptionBinding]) {}
        fn clear_options(&mut self) {}
        fn set_pause_menu_visible(&mut self, _visible: bool) {}
    }

    #[test]
    fn builder_hosts_any_surface() {
        let mut engine = DialogueEngineBuilder::new()
            .with_store(story())
            .build(TextOnly::default())
            .unwrap();
        engine.load_node("start").unwrap();
        engine.skip();
        assert_eq!(engine.surface().text, "Hello.");

        let engine = DialogueEngineBuilder::default()
            .with_store(story())
            .build(TextOnly::default())
            .unwrap();
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn builder_requires_store() {
        let result = DialogueEngine::builder().build(CommandLog::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn select_outside_options_phase() {
        let mut engine = engine();
        engine.load_node("start").unwrap();
        assert!(matches!(engine.choose(0), Err(EngineError::NotShowingOptions)));
    }
}
