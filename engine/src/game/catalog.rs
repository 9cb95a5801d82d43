//! Game file discovery
//!
//! Lists the game files in a directory and optionally narrows them to the
//! 33-game benchmark subset. A game's identifier is its file name up to the
//! first dot (`zork1.z5` -> `zork1`).

use sdk::errors::EngineError;
use std::path::{Path, PathBuf};

/// Games in the 33-game benchmark subset
pub const BENCHMARK_33: [&str; 33] = [
    "905",
    "acorncourt",
    "advent",
    "adventureland",
    "afflicted",
    "anchor",
    "awaken",
    "balances",
    "deephome",
    "detective",
    "dragon",
    "enchanter",
    "gold",
    "inhumane",
    "jewel",
    "karn",
    "library",
    "ludicorp",
    "moonlit",
    "omniquest",
    "pentari",
    "reverb",
    "snacktime",
    "sorcerer",
    "spellbrkr",
    "spirit",
    "temple",
    "tryst205",
    "yomomma",
    "zenon",
    "zork1",
    "zork3",
    "ztuu",
];

/// One discovered game file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GameEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Identifier of the game stored at `path`
pub fn game_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

pub fn is_benchmark_game(name: &str) -> bool {
    BENCHMARK_33.contains(&name)
}

/// List game files in `dir`, sorted by identifier
///
/// Hidden files and subdirectories are skipped.
///
/// # Errors
/// Returns `EngineError::Config` if the directory cannot be read.
pub fn discover_games(dir: &Path, only_33: bool) -> Result<Vec<GameEntry>, EngineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        EngineError::Config(format!(
            "Cannot read games directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut games = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let name = game_name(&path);
        if name.is_empty() {
            continue;
        }
        if only_33 && !is_benchmark_game(&name) {
            continue;
        }

        games.push(GameEntry { name, path });
    }

    games.sort();
    Ok(games)
}

/// Keep only the games whose identifier is listed in `names`
pub fn select_games(games: Vec<GameEntry>, names: &[String]) -> Vec<GameEntry> {
    if names.is_empty() {
        return games;
    }
    games
        .into_iter()
        .filter(|game| names.iter().any(|n| n == &game.name))
        .collect()
}
