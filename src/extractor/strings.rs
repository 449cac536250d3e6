//! Printable-string extraction from depot binaries
//!
//! Streams a file through a fixed-size buffer, collecting maximal runs of
//! printable ASCII. Runs that match one of the interest patterns are kept
//! and categorized; runs that are merely "reasonable" (short enough and
//! containing at least one letter) are kept as `other`; everything else is
//! dropped. Values are deduplicated across the whole file.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Shortest printable run worth keeping.
pub const MIN_STRING_LEN: usize = 4;

/// Longest run still considered a real identifier rather than packed data.
const MAX_REASONABLE_LEN: usize = 100;

const BUFFER_SIZE: usize = 64 * 1024;

/// Byte-runs matching any of these are always kept.
static INTEREST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)CMsg[A-Z]",
        r"(?i)CUser",
        r"(?i)CClient",
        r"(?i)CServer",
        r"(?i)weapon_",
        r"(?i)item_",
        r"(?i)ability_",
        r"(?i)hero_",
        r"(?i)npc_",
        r"(?i)proto",
        r"(?i)_proto$",
        r"(?i)k_E[A-Z]",
        r"(?i)DOTA_",
        r"(?i)CS_",
        r"(?i)game\.",
        r"(?i)convar",
        r"(?i)cvar",
        r"(?i)sv_",
        r"(?i)mp_",
        r"(?i)cl_",
        r"(?i)de_",
        r"(?i)cs_",
        r"(?i)ar_",
        r"(?i)sf_ui_",
        r"(?i)hud_",
        r"(?i)panorama",
        r"(?i)sound",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("interest pattern compiles"))
    .collect()
});

/// A kept string and the bucket it landed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringMatch {
    pub value: String,
    pub category: String,
}

/// Stream `path` and return its deduplicated interesting strings.
pub fn extract_strings(path: &Path) -> std::io::Result<Vec<StringMatch>> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; BUFFER_SIZE];

    let mut matches = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current: Vec<u8> = Vec::new();

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &byte in &buf[..n] {
            if is_printable(byte) {
                current.push(byte);
            } else {
                flush_run(&mut current, &mut seen, &mut matches);
            }
        }
    }
    flush_run(&mut current, &mut seen, &mut matches);

    Ok(matches)
}

fn flush_run(current: &mut Vec<u8>, seen: &mut HashSet<String>, matches: &mut Vec<StringMatch>) {
    if current.len() >= MIN_STRING_LEN {
        // Runs are pure printable ASCII, so this cannot fail.
        let s = String::from_utf8_lossy(current).into_owned();
        if !seen.contains(&s) {
            if let Some(m) = evaluate(&s) {
                seen.insert(s);
                matches.push(m);
            }
        }
    }
    current.clear();
}

/// Decide whether a candidate run is kept, and under which category.
pub fn evaluate(s: &str) -> Option<StringMatch> {
    if INTEREST_PATTERNS.iter().any(|p| p.is_match(s)) {
        return Some(StringMatch {
            value: s.to_string(),
            category: categorize(s),
        });
    }
    if is_reasonable(s) {
        return Some(StringMatch {
            value: s.to_string(),
            category: "other".to_string(),
        });
    }
    None
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

fn is_reasonable(s: &str) -> bool {
    s.len() <= MAX_REASONABLE_LEN && s.chars().any(|c| c.is_alphabetic())
}

/// First matching rule wins, scanning the lowercased candidate.
pub fn categorize(s: &str) -> String {
    let lower = s.to_lowercase();
    let category = if lower.contains("cmsg") || lower.contains("proto") {
        "protobuf"
    } else if lower.contains("weapon_") {
        "weapon"
    } else if lower.contains("item_") {
        "item"
    } else if lower.contains("de_") || lower.contains("cs_") || lower.contains("ar_") {
        "map"
    } else if lower.contains("sf_ui_") || lower.contains("hud_") || lower.contains("panorama") {
        "ui"
    } else if lower.contains("sound") || lower.contains("music") || lower.contains("audio") {
        "sound"
    } else if lower.contains("ability_") || lower.contains("hero_") {
        "gameplay"
    } else if lower.contains("npc_") {
        "npc"
    } else if lower.contains("sv_") || lower.contains("mp_") || lower.contains("cl_") {
        "convar"
    } else if lower.contains("k_e") {
        "enum"
    } else {
        "misc"
    };
    category.to_string()
}

/// Set difference between two extractions: `(added, removed)`.
pub fn compare_string_sets(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let old_set: HashSet<&String> = old.iter().collect();
    let new_set: HashSet<&String> = new.iter().collect();

    let added = new_set
        .difference(&old_set)
        .map(|s| (*s).clone())
        .collect();
    let removed = old_set
        .difference(&new_set)
        .map(|s| (*s).clone())
        .collect();

    (added, removed)
}
