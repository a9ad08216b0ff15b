/// Tooth Fairy example: a short branching bedtime dialogue, played
/// through with a fixed list of choices.
///
/// Run with: cargo run --example tooth_fairy

use dialogue_engine::core::config::EngineConfig;
use dialogue_engine::core::engine::{DialogueEngine, LoadOutcome, Phase};
use dialogue_engine::core::store::MemoryNodeStore;
use dialogue_engine::core::surface::{CommandLog, InputSignal};
use dialogue_engine::schema::asset::{AssetCategory, AssetManifest};
use dialogue_engine::schema::character::{CharacterRoster, PortraitSlot};
use std::time::Duration;

const NODES: &str = r#"{
    "start": {
        "id": "start",
        "background": "bedroom",
        "music": "lullaby",
        "lines": [
            {"speaker": "Noah", "text": "Is somebody there?", "emotion": "scared"},
            {"speaker": "Fairy", "text": "Only me. I came for your tooth!", "emotion": "happy"}
        ],
        "options": [
            {"label": "Here it is", "target": "trade"},
            {"label": "I lost it", "target": "lost"}
        ]
    },
    "trade": {
        "id": "trade",
        "lines": [
            {"speaker": "Fairy", "text": "Shiny and clean. You must brush every day.", "emotion": "happy"},
            {"speaker": "Noah", "text": "Twice a day!", "emotion": "happy"}
        ],
        "options": [
            {"label": "Go to sleep", "target": "END"}
        ]
    },
    "lost": {
        "id": "lost",
        "music": "worried",
        "lines": [
            {"speaker": "Fairy", "text": "Then we had better look under the bed.", "emotion": "neutral", "background_override": "under_bed"}
        ],
        "options": []
    }
}"#;

const FRAME: Duration = Duration::from_millis(16);

fn main() {
    let store = MemoryNodeStore::from_json_map(NODES).expect("Failed to parse nodes");

    let mut roster = CharacterRoster::new();
    roster.register(PortraitSlot {
        id: "Fairy".to_string(),
        display_name: Some("Tooth Fairy".to_string()),
        slot: "tooth_fairy".to_string(),
        sprite_set: "ToothFairy".to_string(),
    });
    roster.register(PortraitSlot {
        id: "Noah".to_string(),
        display_name: None,
        slot: "noah".to_string(),
        sprite_set: "Noah".to_string(),
    });

    let assets = AssetManifest::new()
        .with(AssetCategory::Background, "bedroom")
        .with(AssetCategory::Portrait, "ToothFairy/happy")
        .with(AssetCategory::Portrait, "Noah/scared")
        .with(AssetCategory::Portrait, "Noah/happy")
        .with(AssetCategory::Music, "lullaby");

    let config = EngineConfig {
        exit_scene: "Bedroom".to_string(),
        ..EngineConfig::default()
    };

    let mut engine = DialogueEngine::builder()
        .with_store(store)
        .with_assets(assets)
        .with_roster(roster)
        .with_config(config)
        .with_scene_transition(|scene: &str| println!("\n(scene change: {})", scene))
        .build(CommandLog::new())
        .expect("Failed to build engine");

    // Picks for each option list reached, in order.
    let choices = [0, 0];
    let mut picks = choices.iter();

    engine.start().expect("Failed to load start node");

    while !engine.has_exited() {
        match engine.phase() {
            Phase::Typing => engine.tick(FRAME),
            Phase::AwaitingAdvance => {
                let surface = engine.surface();
                println!("{}: {}", surface.speaker, surface.text);
                engine.handle_input(InputSignal::Advance);
            }
            Phase::ShowingOptions if engine.is_finished() => {
                println!("{}", engine.surface().text);
                break;
            }
            Phase::ShowingOptions => {
                for (n, option) in engine.options().iter().enumerate() {
                    println!("  {}. {}", n + 1, option.label);
                }
                let Some(&pick) = picks.next() else {
                    break;
                };
                println!("> {}", engine.options()[pick].label);
                if engine.choose(pick).expect("Choice failed") == LoadOutcome::Exited {
                    break;
                }
            }
            Phase::Idle => break,
        }
    }

    for diagnostic in engine.diagnostics() {
        println!("warning: {}", diagnostic);
    }
}
