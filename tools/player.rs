/// Player: plays a node directory in the terminal.
///
/// Usage: player --nodes <dir> [--roster <file>] [--assets <file|dir>] [--config <file>]
///
/// Commands:
///   advance (a)      advance, or finish the line being typed
///   skip (s)         finish the line being typed
///   pause (p)        toggle the pause menu
///   choose <n> (c)   pick option n (1-based)
///   tick <ms>        advance time by ms
///   run (r)          tick until the line is fully shown
///   state            print the engine state
///   help             list commands
///   quit             exit

use dialogue_engine::core::config::EngineConfig;
use dialogue_engine::core::engine::{DialogueEngine, DialogueEngineBuilder, Phase};
use dialogue_engine::core::store::DirectoryNodeStore;
use dialogue_engine::core::surface::{CommandLog, InputSignal, SurfaceCommand};
use dialogue_engine::schema::asset::{AssetDirectory, AssetManifest};
use dialogue_engine::schema::character::CharacterRoster;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);
// Upper bound for `run`, in frames.
const RUN_LIMIT: usize = 10_000;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut nodes_path = None;
    let mut roster_path = None;
    let mut assets_path = None;
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--nodes" if i + 1 < args.len() => {
                i += 1;
                nodes_path = Some(args[i].clone());
            }
            "--roster" if i + 1 < args.len() => {
                i += 1;
                roster_path = Some(args[i].clone());
            }
            "--assets" if i + 1 < args.len() => {
                i += 1;
                assets_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dialogue_engine=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Some(nodes_path) = nodes_path else {
        eprintln!("ERROR: --nodes is required");
        process::exit(1);
    };

    let mut roster = CharacterRoster::new();
    if let Some(ref path) = roster_path {
        if let Err(e) = roster.load_from_ron(Path::new(path)) {
            eprintln!("ERROR: Failed to load roster: {}", e);
            process::exit(1);
        }
    }

    let config = match config_path {
        Some(ref path) => match EngineConfig::load_from_ron(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ERROR: Failed to load config: {}", e);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let builder = DialogueEngine::builder()
        .with_store(DirectoryNodeStore::new(&nodes_path))
        .with_roster(roster)
        .with_config(config)
        .with_scene_transition(|scene: &str| println!("\n>>> scene: {}", scene));
    let builder = match assets_path {
        Some(ref path) => with_assets(builder, Path::new(path)),
        None => builder,
    };

    let mut engine = match builder.build(CommandLog::new()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!("Nodes: {}", nodes_path);
    println!("Type 'help' for commands.\n");

    if let Err(e) = engine.start() {
        println!("ERROR: {}", e);
    }
    print_commands(&mut engine);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("player> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
            }
            "advance" | "a" => {
                engine.handle_input(InputSignal::Advance);
            }
            "skip" | "s" => {
                engine.handle_input(InputSignal::Skip);
            }
            "pause" | "p" => {
                engine.handle_input(InputSignal::PauseToggle);
            }
            "choose" | "c" => {
                let Some(n) = parts.get(1).and_then(|s| s.parse::<usize>().ok()) else {
                    println!("Usage: choose <n>");
                    for (n, option) in engine.options().iter().enumerate() {
                        println!("  {}. {}", n + 1, option.label);
                    }
                    continue;
                };
                if let Err(e) = engine.choose(n.saturating_sub(1)) {
                    println!("ERROR: {}", e);
                }
            }
            "tick" => {
                match parts.get(1).and_then(|s| s.parse::<u64>().ok()) {
                    Some(ms) => engine.tick(Duration::from_millis(ms)),
                    None => println!("Usage: tick <ms>"),
                }
            }
            "run" | "r" => {
                let mut frames = 0;
                while engine.phase() == Phase::Typing && !engine.is_paused() && frames < RUN_LIMIT {
                    engine.tick(FRAME);
                    frames += 1;
                }
                // Let the panel and music settle too.
                for _ in 0..120 {
                    engine.tick(FRAME);
                }
            }
            "state" => {
                print_state(&engine);
                continue;
            }
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
                continue;
            }
        }

        print_commands(&mut engine);
        if engine.has_exited() {
            break;
        }
    }
}

fn with_assets(builder: DialogueEngineBuilder, path: &Path) -> DialogueEngineBuilder {
    if path.is_dir() {
        return builder.with_assets(AssetDirectory::new(path));
    }
    match AssetManifest::load_from_ron(path) {
        Ok(manifest) => builder.with_assets(manifest),
        Err(e) => {
            eprintln!("ERROR: Failed to load asset manifest: {}", e);
            process::exit(1);
        }
    }
}

/// Print the surface commands issued since the last call. Opacity and
/// volume steps are collapsed to keep the transcript readable.
fn print_commands(engine: &mut DialogueEngine<CommandLog>) {
    let mut last_text = None;
    for command in engine.surface_mut().drain() {
        match command {
            SurfaceCommand::Text { text } => last_text = Some(text),
            SurfaceCommand::PanelOpacity { .. } | SurfaceCommand::Volume { .. } => {}
            SurfaceCommand::Speaker { name } if !name.is_empty() => println!("[{}]", name),
            SurfaceCommand::ShowOptions { options } => {
                if let Some(text) = last_text.take() {
                    println!("{}", text);
                }
                for (n, option) in options.iter().enumerate() {
                    println!("  {}. {}", n + 1, option.label);
                }
            }
            SurfaceCommand::Background { sprite } => println!("  (background: {})", sprite.key),
            SurfaceCommand::PlayClip { clip, .. } => println!("  (music: {})", clip.key),
            SurfaceCommand::PortraitSprite { slot, sprite } => {
                println!("  ({}: {})", slot, sprite.key)
            }
            SurfaceCommand::PauseMenu { visible } => {
                println!("  (pause menu {})", if visible { "open" } else { "closed" })
            }
            _ => {}
        }
    }
    if let Some(text) = last_text {
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    for diagnostic in engine.take_diagnostics() {
        println!("WARNING: {}", diagnostic);
    }
}

fn print_state(engine: &DialogueEngine<CommandLog>) {
    let state = engine.state();
    println!(
        "node: {}",
        state
            .current_node
            .as_ref()
            .map(|n| n.id.as_str())
            .unwrap_or("-")
    );
    println!("line: {}", state.line_index);
    println!("phase: {:?}", state.phase);
    println!("paused: {}", state.paused);
    println!("music: {}", state.current_track.as_deref().unwrap_or("-"));
}

fn print_usage() {
    println!("Player: interactive terminal shell for dialogue node directories.");
    println!();
    println!("Usage: player --nodes <dir> [--roster <file>] [--assets <file|dir>] [--config <file>]");
    println!();
    println!("  --nodes <dir>        Directory of <id>.ron / <id>.json node files");
    println!("  --roster <file>      Character roster (RON)");
    println!("  --assets <file|dir>  Asset manifest (RON) or asset root directory");
    println!("  --config <file>      Engine config (RON)");
    println!();
    println!("Set RUST_LOG to change log verbosity (default: dialogue_engine=info).");
}

fn print_help() {
    println!("Commands:");
    println!("  advance (a)     advance, or finish the line being typed");
    println!("  skip (s)        finish the line being typed");
    println!("  pause (p)       toggle the pause menu");
    println!("  choose <n> (c)  pick option n");
    println!("  tick <ms>       advance time by ms");
    println!("  run (r)         tick until the line is fully shown");
    println!("  state           print the engine state");
    println!("  quit            exit");
}
