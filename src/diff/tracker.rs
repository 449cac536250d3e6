//! Diff materialization and update classification
//!
//! Composes a [`DiffResult`] from two manifest snapshots, then (when depot
//! binaries were analyzable) refines it with string-level analysis. The
//! update-type heuristics work in two stages: depot identity first, then
//! prefix histograms over newly-added strings, where a string verdict only
//! replaces a depot verdict when it is more specific than `Unknown`.

use serde::{Deserialize, Serialize};

use crate::steamcmd::AppInfo;

/// Strings retained on the result after set-difference analysis.
const MAX_RESULT_STRINGS: usize = 5000;

/// Added strings listed in the notable-additions fragment.
const MAX_NOTABLE_STRINGS: usize = 20;

/// Entries per section in the rendered summary.
const MAX_SUMMARY_ENTRIES: usize = 20;

/// Classification taxonomy for a detected update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    #[default]
    Unknown,
    Feature,
    Patch,
    Map,
    Item,
    Localization,
    Server,
    Balance,
    #[serde(rename = "Anti-Cheat")]
    AntiCheat,
    Cosmetic,
    #[serde(rename = "Protobuf/Networking")]
    Protobuf,
}

impl std::fmt::Display for UpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateType::Unknown => "Unknown",
            UpdateType::Feature => "Feature",
            UpdateType::Patch => "Patch",
            UpdateType::Map => "Map",
            UpdateType::Item => "Item",
            UpdateType::Localization => "Localization",
            UpdateType::Server => "Server",
            UpdateType::Balance => "Balance",
            UpdateType::AntiCheat => "Anti-Cheat",
            UpdateType::Cosmetic => "Cosmetic",
            UpdateType::Protobuf => "Protobuf/Networking",
        };
        f.write_str(s)
    }
}

/// One depot whose manifest moved between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotChange {
    pub id: String,
    /// Empty when the depot was first seen in the new snapshot.
    pub old_gid: String,
    pub new_gid: String,
    pub name: String,
}

/// Strings of one category, in display order, for API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBlock {
    pub category: String,
    pub icon: String,
    pub count: usize,
    pub strings: Vec<String>,
}

/// The materialized outcome of one detected change, persisted gzipped and
/// handed to the notifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub old_version: String,
    pub new_version: String,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub type_reason: String,
    #[serde(default)]
    pub changed_depots: Vec<DepotChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_depots: Vec<DepotChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_protobufs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_strings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categorized_strings: Vec<CategoryBlock>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw_diff: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub analysis: String,
}

/// Compare the depot maps of two snapshots.
///
/// Every depot in `new` that is absent from `old` (or present with a
/// different public manifest) becomes a [`DepotChange`]. Depots that
/// disappeared from `new` are recorded separately in `removed_depots`, with
/// `new_gid` empty.
pub fn process_update(old: &AppInfo, new: &AppInfo) -> DiffResult {
    let mut result = DiffResult {
        old_version: old.change_number.clone(),
        new_version: new.change_number.clone(),
        ..DiffResult::default()
    };

    for (depot_id, new_depot) in &new.depots {
        match old.depots.get(depot_id) {
            None => result.changed_depots.push(DepotChange {
                id: depot_id.clone(),
                old_gid: String::new(),
                new_gid: new_depot.gid.clone(),
                name: depot_name(depot_id).to_string(),
            }),
            Some(old_depot) if old_depot.gid != new_depot.gid => {
                result.changed_depots.push(DepotChange {
                    id: depot_id.clone(),
                    old_gid: old_depot.gid.clone(),
                    new_gid: new_depot.gid.clone(),
                    name: depot_name(depot_id).to_string(),
                })
            }
            Some(_) => {}
        }
    }

    for (depot_id, old_depot) in &old.depots {
        if !new.depots.contains_key(depot_id) {
            result.removed_depots.push(DepotChange {
                id: depot_id.clone(),
                old_gid: old_depot.gid.clone(),
                new_gid: String::new(),
                name: depot_name(depot_id).to_string(),
            });
        }
    }

    // HashMap iteration order is arbitrary; keep the output stable.
    result.changed_depots.sort_by(|a, b| a.id.cmp(&b.id));
    result.removed_depots.sort_by(|a, b| a.id.cmp(&b.id));

    let (update_type, reason) = classify_by_depots(&result.changed_depots);
    result.update_type = update_type;
    result.type_reason = reason;

    result
}

/// Refine a result with the string sets extracted from old and new binaries.
///
/// Stores the first [`MAX_RESULT_STRINGS`] added strings, re-classifies from
/// prefix histograms, and writes the notable-additions fragment.
pub fn enhance_with_string_analysis(
    result: &mut DiffResult,
    new_strings: &[String],
    old_strings: &[String],
) {
    let (added, removed) = crate::extractor::compare_string_sets(old_strings, new_strings);

    result.new_strings = added.iter().take(MAX_RESULT_STRINGS).cloned().collect();

    let (update_type, reason) = classify_by_strings(&added, &removed);
    if update_type != UpdateType::Unknown {
        result.update_type = update_type;
        result.type_reason = reason;
    }

    result.analysis = notable_additions(&added, result.update_type);
}

/// Bucket added strings into the fixed display categories, dropping empty
/// ones.
pub fn categorize_strings(strings: &[String]) -> Vec<CategoryBlock> {
    const ORDER: [&str; 8] = [
        "weapons", "maps", "items", "network", "security", "ui", "audio", "other",
    ];

    let mut buckets: std::collections::HashMap<&str, Vec<String>> = std::collections::HashMap::new();

    for s in strings {
        let bucket = display_category(s);
        buckets.entry(bucket).or_default().push(s.clone());
    }

    ORDER
        .iter()
        .filter_map(|&category| {
            let strings = buckets.remove(category)?;
            Some(CategoryBlock {
                category: category.to_string(),
                icon: String::new(),
                count: strings.len(),
                strings,
            })
        })
        .collect()
}

fn display_category(s: &str) -> &'static str {
    let lower = s.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&["weapon_", "ak47", "m4a1", "awp", "knife", "gun", "ammo"]) {
        "weapons"
    } else if contains_any(&["map_", "de_", "cs_", "ar_", "level", "spawn"]) {
        "maps"
    } else if contains_any(&["item_", "skin", "case", "sticker", "agent", "glove"]) {
        "items"
    } else if contains_any(&["ui_", "hud", "menu", "button", "panel", "label"]) {
        "ui"
    } else if contains_any(&["net_", "server", "client", "packet", "proto", "msg"]) {
        "network"
    } else if contains_any(&["vac", "cheat", "ban", "trust", "secure", "rsa", "key", "cert"]) {
        "security"
    } else if contains_any(&["sound", "audio", "music", "sfx", "voice"]) {
        "audio"
    } else {
        "other"
    }
}

fn classify_by_depots(depots: &[DepotChange]) -> (UpdateType, String) {
    for depot in depots {
        match depot.id.as_str() {
            "2347779" => {
                return (
                    UpdateType::Server,
                    "CS2 Dedicated Server depot changed".to_string(),
                )
            }
            "731" => return (UpdateType::Patch, "Public depot changed".to_string()),
            "2347770" => return (UpdateType::Patch, "CS2 Content depot changed".to_string()),
            _ => {}
        }
    }
    (UpdateType::Unknown, String::new())
}

fn classify_by_strings(added: &[String], _removed: &[String]) -> (UpdateType, String) {
    let mut proto_count = 0usize;
    let mut weapon_count = 0usize;
    let mut cosmetic_count = 0usize;
    let mut balance_count = 0usize;

    for s in added {
        let lower = s.to_lowercase();

        if lower.starts_with("cmsg") || lower.contains("proto") {
            proto_count += 1;
        }
        if lower.starts_with("weapon_") {
            weapon_count += 1;
        }
        if lower.starts_with("item_") || lower.contains("cosmetic") {
            cosmetic_count += 1;
        }
        if ["damage", "armor", "speed", "accuracy"]
            .iter()
            .any(|n| lower.contains(n))
        {
            balance_count += 1;
        }
    }

    if proto_count > 5 {
        return (
            UpdateType::Protobuf,
            "Multiple new protobuf definitions detected".to_string(),
        );
    }
    if weapon_count > 3 {
        return (
            UpdateType::Balance,
            "Multiple weapon-related strings detected".to_string(),
        );
    }
    if cosmetic_count > 5 {
        return (
            UpdateType::Cosmetic,
            "Multiple cosmetic-related strings detected".to_string(),
        );
    }
    if balance_count > 5 {
        return (
            UpdateType::Balance,
            "Multiple balance-related strings detected".to_string(),
        );
    }

    (UpdateType::Unknown, String::new())
}

fn is_notable(s: &str) -> bool {
    const NOTABLE_PREFIXES: [&str; 10] = [
        "weapon_", "item_", "cmsg", "ability_", "hero_", "npc_", "k_e", "sv_", "mp_", "cl_",
    ];
    let lower = s.to_lowercase();
    NOTABLE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn notable_additions(added: &[String], update_type: UpdateType) -> String {
    let mut out = String::new();
    out.push_str("## Update Analysis\n\n");
    out.push_str(&format!("**Detected Type:** {update_type}\n\n"));

    if !added.is_empty() {
        out.push_str("**Notable Additions:**\n");
        for s in added
            .iter()
            .filter(|s| is_notable(s))
            .take(MAX_NOTABLE_STRINGS)
        {
            out.push_str(&format!("- `{s}`\n"));
        }
    }

    out
}

impl DiffResult {
    /// Render the final markdown summary: type, reason, and capped lists of
    /// new protobufs and new strings.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();

        out.push_str("## Update Analysis\n\n");
        out.push_str(&format!("**Type:** {}\n", self.update_type));
        if !self.type_reason.is_empty() {
            out.push_str(&format!("**Reason:** {}\n", self.type_reason));
        }
        out.push('\n');

        if !self.new_protobufs.is_empty() {
            out.push_str("### New Protobufs\n");
            for (i, proto) in self.new_protobufs.iter().enumerate() {
                if i >= MAX_SUMMARY_ENTRIES {
                    out.push_str("... and more\n");
                    break;
                }
                out.push_str(&format!("- `{proto}`\n"));
            }
            out.push('\n');
        }

        if !self.new_strings.is_empty() {
            out.push_str("### Notable New Strings\n");
            for (i, s) in self.new_strings.iter().enumerate() {
                if i >= MAX_SUMMARY_ENTRIES {
                    out.push_str("... and more\n");
                    break;
                }
                out.push_str(&format!("- `{s}`\n"));
            }
        }

        out
    }
}

/// Human name for a well-known depot id.
pub fn depot_name(depot_id: &str) -> &'static str {
    match depot_id {
        "731" => "Public",
        "732" => "Public (Beta)",
        "733" => "Public (Debug)",
        "734" => "Binaries",
        "735" => "Binaries Win64",
        "736" => "Binaries Linux",
        "737" => "Binaries Mac",
        "738" => "Binaries Mac ARM",
        "2347770" => "CS2 Content",
        "2347771" => "CS2 Content (Low Violence)",
        "2347772" => "CS2 Content Asia",
        "2347773" => "CS2 Workshop",
        "2347774" => "CS2 Workshop Linux",
        "2347779" => "CS2 Dedicated Server",
        _ => "Unknown Depot",
    }
}

#[cfg(test)]
mod tests {
    use crate::steamcmd::DepotInfo;

    use super::*;

    fn app_info(change_number: &str, depots: &[(&str, &str)]) -> AppInfo {
        let mut info = AppInfo {
            change_number: change_number.to_string(),
            ..AppInfo::default()
        };
        for (id, gid) in depots {
            info.depots.insert(
                id.to_string(),
                DepotInfo {
                    id: id.to_string(),
                    gid: gid.to_string(),
                    ..DepotInfo::default()
                },
            );
        }
        info
    }

    #[test]
    fn test_server_depot_bump() {
        let old = app_info("98000", &[("2347779", "G_OLD")]);
        let new = app_info("99999", &[("2347779", "G_NEW")]);

        let result = process_update(&old, &new);

        assert_eq!(result.old_version, "98000");
        assert_eq!(result.new_version, "99999");
        assert_eq!(
            result.changed_depots,
            vec![DepotChange {
                id: "2347779".to_string(),
                old_gid: "G_OLD".to_string(),
                new_gid: "G_NEW".to_string(),
                name: "CS2 Dedicated Server".to_string(),
            }]
        );
        assert_eq!(result.update_type, UpdateType::Server);
        assert_eq!(result.type_reason, "CS2 Dedicated Server depot changed");
    }

    #[test]
    fn test_first_seen_depot() {
        let old = app_info("1", &[]);
        let new = app_info("2", &[("999999", "G1")]);

        let result = process_update(&old, &new);

        assert_eq!(
            result.changed_depots,
            vec![DepotChange {
                id: "999999".to_string(),
                old_gid: String::new(),
                new_gid: "G1".to_string(),
                name: "Unknown Depot".to_string(),
            }]
        );
        assert_eq!(result.update_type, UpdateType::Unknown);
        assert!(result.type_reason.is_empty());
    }

    #[test]
    fn test_unchanged_depot_is_not_reported() {
        let old = app_info("1", &[("731", "SAME")]);
        let new = app_info("2", &[("731", "SAME")]);

        let result = process_update(&old, &new);
        assert!(result.changed_depots.is_empty());
    }

    #[test]
    fn test_removed_depot_is_recorded() {
        let old = app_info("1", &[("731", "G1"), ("736", "G2")]);
        let new = app_info("2", &[("731", "G1")]);

        let result = process_update(&old, &new);

        assert!(result.changed_depots.is_empty());
        assert_eq!(
            result.removed_depots,
            vec![DepotChange {
                id: "736".to_string(),
                old_gid: "G2".to_string(),
                new_gid: String::new(),
                name: "Binaries Linux".to_string(),
            }]
        );
    }

    #[test]
    fn test_depot_rule_priority() {
        // 2347779 wins over 731 regardless of map order.
        let old = app_info("1", &[("731", "A1"), ("2347779", "B1")]);
        let new = app_info("2", &[("731", "A2"), ("2347779", "B2")]);

        let result = process_update(&old, &new);
        assert_eq!(result.update_type, UpdateType::Server);
    }

    #[test]
    fn test_string_classification_overrides_depot_patch() {
        let old = app_info("1", &[("731", "A1")]);
        let new = app_info("2", &[("731", "A2")]);
        let mut result = process_update(&old, &new);
        assert_eq!(result.update_type, UpdateType::Patch);

        let added: Vec<String> = (0..6).map(|i| format!("CMsgThing{i}")).collect();
        enhance_with_string_analysis(&mut result, &added, &[]);

        assert_eq!(result.update_type, UpdateType::Protobuf);
        assert_eq!(
            result.type_reason,
            "Multiple new protobuf definitions detected"
        );
    }

    #[test]
    fn test_protobuf_rule_beats_weapon_rule() {
        let mut added: Vec<String> = (0..6).map(|i| format!("CMsgThing{i}")).collect();
        added.extend((0..6).map(|i| format!("weapon_gun{i}")));

        let (update_type, _) = classify_by_strings(&added, &[]);
        assert_eq!(update_type, UpdateType::Protobuf);
    }

    #[test]
    fn test_weapon_threshold() {
        let added: Vec<String> = (0..4).map(|i| format!("weapon_gun{i}")).collect();
        let (update_type, reason) = classify_by_strings(&added, &[]);
        assert_eq!(update_type, UpdateType::Balance);
        assert_eq!(reason, "Multiple weapon-related strings detected");
    }

    #[test]
    fn test_below_thresholds_stays_unknown() {
        let added: Vec<String> = vec!["weapon_one".to_string(), "CMsgTwo".to_string()];
        let (update_type, _) = classify_by_strings(&added, &[]);
        assert_eq!(update_type, UpdateType::Unknown);
    }

    #[test]
    fn test_unknown_string_verdict_keeps_depot_verdict() {
        let old = app_info("1", &[("2347779", "B1")]);
        let new = app_info("2", &[("2347779", "B2")]);
        let mut result = process_update(&old, &new);

        enhance_with_string_analysis(&mut result, &["plain_string".to_string()], &[]);

        assert_eq!(result.update_type, UpdateType::Server);
        assert_eq!(result.type_reason, "CS2 Dedicated Server depot changed");
    }

    #[test]
    fn test_enhance_stores_added_strings() {
        let mut result = DiffResult::default();
        let new_strings = vec!["kept".to_string(), "shared".to_string()];
        let old_strings = vec!["shared".to_string(), "gone".to_string()];

        enhance_with_string_analysis(&mut result, &new_strings, &old_strings);

        assert_eq!(result.new_strings, vec!["kept".to_string()]);
    }

    #[test]
    fn test_category_blocks_order_and_counts() {
        let strings = vec![
            "weapon_ak47".to_string(),
            "de_mirage".to_string(),
            "plain_thing".to_string(),
            "weapon_awp".to_string(),
        ];

        let blocks = categorize_strings(&strings);

        let categories: Vec<&str> = blocks.iter().map(|b| b.category.as_str()).collect();
        assert_eq!(categories, vec!["weapons", "maps", "other"]);
        assert_eq!(blocks[0].count, 2);
        assert_eq!(blocks[0].strings, vec!["weapon_ak47", "weapon_awp"]);
    }

    #[test]
    fn test_empty_categories_are_dropped() {
        let blocks = categorize_strings(&["voice_line".to_string()]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].category, "audio");
    }

    #[test]
    fn test_update_type_serialization() {
        assert_eq!(
            serde_json::to_string(&UpdateType::Protobuf).unwrap(),
            "\"Protobuf/Networking\""
        );
        assert_eq!(
            serde_json::to_string(&UpdateType::AntiCheat).unwrap(),
            "\"Anti-Cheat\""
        );
        assert_eq!(serde_json::to_string(&UpdateType::Server).unwrap(), "\"Server\"");
    }

    #[test]
    fn test_summary_rendering() {
        let result = DiffResult {
            update_type: UpdateType::Server,
            type_reason: "CS2 Dedicated Server depot changed".to_string(),
            new_protobufs: vec!["CMsgServerHello".to_string()],
            new_strings: (0..25).map(|i| format!("sv_var{i}")).collect(),
            ..DiffResult::default()
        };

        let summary = result.render_summary();

        assert!(summary.contains("**Type:** Server"));
        assert!(summary.contains("**Reason:** CS2 Dedicated Server depot changed"));
        assert!(summary.contains("`CMsgServerHello`"));
        assert!(summary.contains("... and more"));
    }
}
