/// Node Linter: validates a directory of dialogue nodes.
///
/// Usage: node_linter <node_dir> [--start <id>] [--exit <id>]

use dialogue_engine::core::config::EngineConfig;
use dialogue_engine::core::store::{DirectoryNodeStore, NodeStore};
use dialogue_engine::schema::node::DialogueNode;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: node_linter <node_dir> [--start <id>] [--exit <id>]");
        process::exit(0);
    }

    let node_dir = &args[1];
    let defaults = EngineConfig::default();
    let mut start = defaults.start_node;
    let mut exit = defaults.exit_node;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = args[i].clone();
            }
            "--exit" if i + 1 < args.len() => {
                i += 1;
                exit = args[i].clone();
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    if !Path::new(node_dir).is_dir() {
        eprintln!("ERROR: Path '{}' is not a directory", node_dir);
        process::exit(1);
    }

    let store = DirectoryNodeStore::new(node_dir);
    let ids = match store.node_ids() {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("ERROR: Failed to list '{}': {}", node_dir, e);
            process::exit(1);
        }
    };

    let mut nodes = BTreeMap::new();
    let mut errors = Vec::new();
    for id in &ids {
        match store.load_node(id) {
            Ok(node) => {
                nodes.insert(id.clone(), node);
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    println!("Loaded {} of {} nodes", nodes.len(), ids.len());

    let (lint_errors, warnings) = lint_nodes(&nodes, &start, &exit);
    errors.extend(lint_errors);

    println!("\n=== Node Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_nodes(
    nodes: &BTreeMap<String, DialogueNode>,
    start: &str,
    exit: &str,
) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !nodes.contains_key(start) {
        errors.push(format!("Start node '{}' does not exist", start));
    }

    for (id, node) in nodes {
        if node.id != *id {
            warnings.push(format!("Node file '{}' declares id '{}'", id, node.id));
        }

        for target in node.targets() {
            if target != exit && !nodes.contains_key(target) {
                errors.push(format!("Node '{}' has an option to missing node '{}'", id, target));
            }
        }

        for (n, line) in node.lines.iter().enumerate() {
            if line.text.trim().is_empty() {
                warnings.push(format!("Node '{}' line {} has no text", id, n + 1));
            }
        }

        if node.lines.is_empty() && node.is_terminal() {
            warnings.push(format!("Node '{}' has no lines and no options", id));
        }
    }

    // Reachability from the start node
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    if nodes.contains_key(start) {
        reached.insert(start);
        queue.push_back(start);
    }
    while let Some(id) = queue.pop_front() {
        let Some(node) = nodes.get(id) else {
            continue;
        };
        for target in node.targets() {
            if nodes.contains_key(target) && reached.insert(target) {
                queue.push_back(target);
            }
        }
    }
    if !reached.is_empty() {
        for id in nodes.keys() {
            if !reached.contains(id.as_str()) {
                warnings.push(format!("Node '{}' is unreachable from '{}'", id, start));
            }
        }
    }

    (errors, warnings)
}
