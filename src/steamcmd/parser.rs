//! Manifest-dump parser
//!
//! The tool's `app_info_print` output is a brace-nested quoted-text dump
//! preceded by free-form console status lines. Parsing runs two passes:
//! a scalar pass of anchored regexes for globally-unique fields, and a
//! line-by-line structural pass with a brace-depth counter for the depot
//! and branch trees.
//!
//! The parser never fails hard. Unrecognized sections are skipped and
//! missing fields stay empty; an empty `change_number` in the result means
//! the dump was unusable and must not be treated as an update.
//!
//! Known limitation: values containing embedded quotes are truncated at the
//! first closing quote.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parsed app manifest: the subset of the dump the pipeline cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_id: String,
    pub name: String,
    pub change_number: String,
    pub build_id: String,
    pub depots: HashMap<String, DepotInfo>,
    pub branches: HashMap<String, BranchInfo>,
    pub common: HashMap<String, String>,
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepotInfo {
    pub id: String,
    pub name: String,
    /// Public-branch manifest id; empty when the depot has no public manifest.
    pub gid: String,
    #[serde(rename = "maxsize")]
    pub max_size: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub manifests: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    #[serde(rename = "buildid")]
    pub build_id: String,
    #[serde(rename = "timeupdated")]
    pub time_updated: String,
}

/// Release channels tracked in `AppInfo::branches`; everything else in the
/// dump's branch list is ignored.
const TRACKED_BRANCHES: [&str; 3] = ["public", "beta", "preview"];

/// Presentation fields lifted verbatim into `AppInfo::common`.
const COMMON_FIELDS: [&str; 8] = [
    "type",
    "oslist",
    "clienticon",
    "clienttga",
    "icon",
    "logo",
    "logo_small",
    "controller_support",
];

static STATUS_CHANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"change number : (\d+)").expect("STATUS_CHANGE_RE compiles"));
static BLOCK_CHANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"changenumber"\s+"?(\d+)"?"#).expect("BLOCK_CHANGE_RE compiles")
});
static STATUS_APPID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AppID : (\d+)").expect("STATUS_APPID_RE compiles"));
static BLOCK_APPID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""appid"\s+"?(\d+)"?"#).expect("BLOCK_APPID_RE compiles"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name"\s+"([^"]+)""#).expect("NAME_RE compiles"));
static BUILDID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""buildid"\s+"(\d+)""#).expect("BUILDID_RE compiles"));
static DEPOT_ID_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"(\d+)"$"#).expect("DEPOT_ID_LINE_RE compiles"));
static QUOTED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]+)"$"#).expect("QUOTED_KEY_RE compiles"));
static KEY_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]+)"\s+"([^"]*)""#).expect("KEY_VALUE_RE compiles"));
static BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(\w+)"\s*\{\s*"buildid"\s+"(\d+)""#).expect("BRANCH_RE compiles")
});
static TIME_UPDATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""timeupdated"\s+"(\d+)""#).expect("TIME_UPDATED_RE compiles"));

/// Parse a full `app_info_print` dump into an [`AppInfo`].
pub fn parse_app_info(output: &str) -> AppInfo {
    let mut info = AppInfo::default();

    // Scalar pass. The tool's own status lines are authoritative when
    // present; the nested block is the fallback.
    info.change_number = capture(&STATUS_CHANGE_RE, output)
        .or_else(|| capture(&BLOCK_CHANGE_RE, output))
        .unwrap_or_default();
    info.app_id = capture(&STATUS_APPID_RE, output)
        .or_else(|| capture(&BLOCK_APPID_RE, output))
        .unwrap_or_default();
    info.name = capture(&NAME_RE, output).unwrap_or_default();
    info.build_id = capture(&BUILDID_RE, output).unwrap_or_default();

    parse_common(output, &mut info);
    parse_depots(output, &mut info);
    parse_branches(output, &mut info);

    info
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .map(|caps| caps[1].to_string())
}

fn parse_common(output: &str, info: &mut AppInfo) {
    for field in COMMON_FIELDS {
        let re = Regex::new(&format!(r#""{field}"\s+"([^"]+)""#)).expect("field regex compiles");
        if let Some(value) = capture(&re, output) {
            info.common.insert(field.to_string(), value);
        }
    }
}

/// Structural pass over the depot tree.
///
/// A quoted all-digit line of 3-10 digits below the top level opens a depot
/// context; the context ends when its closing brace drops the depth back
/// below 3. Inside a depot, a `"manifests"` key enables branch tracking:
/// the next bare quoted key names the branch and the following `"gid"`
/// key/value fills `manifests[branch]` (and `gid` itself for `public`).
fn parse_depots(output: &str, info: &mut AppInfo) {
    let mut current_depot: Option<String> = None;
    let mut in_manifests = false;
    let mut current_branch: Option<String> = None;
    let mut depth: i32 = 0;

    for raw_line in output.lines() {
        let line = raw_line.trim();

        if line == "{" {
            depth += 1;
            continue;
        }
        if line == "}" {
            depth -= 1;
            if depth < 3 {
                current_depot = None;
                in_manifests = false;
                current_branch = None;
            }
            continue;
        }

        if let Some(caps) = DEPOT_ID_LINE_RE.captures(line) {
            let id = &caps[1];
            if depth >= 2 && id.len() >= 3 && id.len() <= 10 {
                info.depots
                    .entry(id.to_string())
                    .or_insert_with(|| DepotInfo {
                        id: id.to_string(),
                        ..DepotInfo::default()
                    });
                current_depot = Some(id.to_string());
                in_manifests = false;
                current_branch = None;
            }
            continue;
        }

        if line == "\"manifests\"" {
            in_manifests = true;
            continue;
        }

        if in_manifests {
            if let Some(caps) = QUOTED_KEY_RE.captures(line) {
                current_branch = Some(caps[1].to_string());
                continue;
            }
        }

        let Some(depot_id) = current_depot.as_deref() else {
            continue;
        };

        if let Some(caps) = KEY_VALUE_RE.captures(line) {
            let key = &caps[1];
            let value = caps[2].to_string();
            let Some(depot) = info.depots.get_mut(depot_id) else {
                continue;
            };

            match key {
                "gid" => {
                    if let Some(branch) = current_branch.as_deref() {
                        depot.manifests.insert(branch.to_string(), value.clone());
                        if branch == "public" {
                            depot.gid = value;
                        }
                    }
                }
                "maxsize" => depot.max_size = value,
                "name" => depot.name = value,
                _ => {}
            }
        }
    }
}

fn parse_branches(output: &str, info: &mut AppInfo) {
    for caps in BRANCH_RE.captures_iter(output) {
        let branch_name = &caps[1];
        if !TRACKED_BRANCHES.contains(&branch_name) {
            continue;
        }
        info.branches.insert(
            branch_name.to_string(),
            BranchInfo {
                name: branch_name.to_string(),
                build_id: caps[2].to_string(),
                time_updated: String::new(),
            },
        );
    }

    if let Some(time_updated) = capture(&TIME_UPDATED_RE, output) {
        if let Some(branch) = info.branches.get_mut("public") {
            branch.time_updated = time_updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DUMP: &str = r#"AppID : 730, change number : 26518109, last change : Fri Oct 10 12:00:00 2025
"730"
{
	"appid"		"730"
	"common"
	{
		"name"		"Counter-Strike 2"
		"type"		"Game"
		"oslist"		"windows,linux"
	}
	"depots"
	{
		"731"
		{
			"name"		"CS2 Public"
			"maxsize"		"1234567"
			"manifests"
			{
				"public"
				{
					"gid"		"7788994455667788"
					"size"		"1234567"
				}
				"beta"
				{
					"gid"		"1122334455667788"
				}
			}
		}
		"735"
		{
			"manifests"
			{
				"public"
				{
					"gid"		"9911223344556677"
				}
			}
		}
		"branches"
		{
			"public"
			{
				"buildid"		"20241001"
				"timeupdated"		"1759968000"
			}
			"beta"
			{
				"buildid"		"20241002"
			}
			"staging"
			{
				"buildid"		"20241003"
				"pwdrequired"		"1"
			}
		}
	}
}
"#;

    #[test]
    fn test_change_number_from_status_line() {
        let info = parse_app_info(SAMPLE_DUMP);
        assert_eq!(info.change_number, "26518109");
        assert_eq!(info.app_id, "730");
    }

    #[test]
    fn test_change_number_fallback_to_block() {
        let dump = "\"730\"\n{\n\t\"changenumber\"\t\t\"999\"\n}\n";
        let info = parse_app_info(dump);
        assert_eq!(info.change_number, "999");
    }

    #[test]
    fn test_empty_change_number_on_garbage() {
        let info = parse_app_info("steamcmd failed to connect\n");
        assert!(info.change_number.is_empty());
    }

    #[test]
    fn test_app_name_and_common_fields() {
        let info = parse_app_info(SAMPLE_DUMP);
        assert_eq!(info.name, "Counter-Strike 2");
        assert_eq!(info.common.get("type").map(String::as_str), Some("Game"));
        assert_eq!(
            info.common.get("oslist").map(String::as_str),
            Some("windows,linux")
        );
    }

    #[test]
    fn test_depot_tree() {
        let info = parse_app_info(SAMPLE_DUMP);

        let depot = info.depots.get("731").expect("depot 731 parsed");
        assert_eq!(depot.id, "731");
        assert_eq!(depot.name, "CS2 Public");
        assert_eq!(depot.max_size, "1234567");
        assert_eq!(depot.gid, "7788994455667788");
        assert_eq!(
            depot.manifests.get("beta").map(String::as_str),
            Some("1122334455667788")
        );
    }

    #[test]
    fn test_depot_without_name_keeps_public_gid() {
        let info = parse_app_info(SAMPLE_DUMP);
        let depot = info.depots.get("735").expect("depot 735 parsed");
        assert_eq!(depot.gid, "9911223344556677");
        assert!(depot.name.is_empty());
    }

    #[test]
    fn test_depot_without_public_manifest_has_empty_gid() {
        let dump = r#""730"
{
	"depots"
	{
		"736"
		{
			"manifests"
			{
				"experimental"
				{
					"gid"		"42"
				}
			}
		}
	}
}
"#;
        let info = parse_app_info(dump);
        let depot = info.depots.get("736").expect("depot 736 parsed");
        assert!(depot.gid.is_empty());
        assert_eq!(depot.manifests.get("experimental").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_duplicate_depot_ids_merge() {
        let dump = r#""730"
{
	"depots"
	{
		"731"
		{
			"name"		"First"
		}
		"731"
		{
			"maxsize"		"99"
		}
	}
}
"#;
        let info = parse_app_info(dump);
        assert_eq!(info.depots.len(), 1);
        let depot = &info.depots["731"];
        assert_eq!(depot.name, "First");
        assert_eq!(depot.max_size, "99");
    }

    #[test]
    fn test_top_level_app_id_is_not_a_depot() {
        let info = parse_app_info(SAMPLE_DUMP);
        assert!(!info.depots.contains_key("730"));
    }

    #[test]
    fn test_branches_filtered_to_known_channels() {
        let info = parse_app_info(SAMPLE_DUMP);
        assert_eq!(info.branches.len(), 2);
        assert_eq!(info.branches["public"].build_id, "20241001");
        assert_eq!(info.branches["public"].time_updated, "1759968000");
        assert_eq!(info.branches["beta"].build_id, "20241002");
        assert!(!info.branches.contains_key("staging"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let a = parse_app_info(SAMPLE_DUMP);
        let b = parse_app_info(SAMPLE_DUMP);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_embedded_quote_truncates_value() {
        let dump = r#""730"
{
	"depots"
	{
		"731"
		{
			"name"		"Say "hi" there"
		}
	}
}
"#;
        let info = parse_app_info(dump);
        assert_eq!(info.depots["731"].name, "Say ");
    }
}
