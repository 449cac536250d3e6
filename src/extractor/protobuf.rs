//! Protobuf-identifier extraction
//!
//! Surfaces message and enum identifiers from extracted strings using a
//! fixed regex set. Identifiers are classified by naming convention into
//! the subsystem they belong to.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static PROTOBUF_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"CMsg[A-Z][a-zA-Z0-9_]+",
        r"CUser[A-Z][a-zA-Z0-9_]+",
        r"CClient[A-Z][a-zA-Z0-9_]+",
        r"CServer[A-Z][a-zA-Z0-9_]+",
        r"CMsgGC[A-Z][a-zA-Z0-9_]+",
        r"CMsgDOTA[A-Z][a-zA-Z0-9_]+",
        r"CMsgCS[A-Z][a-zA-Z0-9_]+",
        r"k_E[A-Z][a-zA-Z0-9_]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("protobuf pattern compiles"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtobufMatch {
    pub name: String,
    pub kind: String,
    /// The full extracted string the identifier was found in.
    pub context: String,
}

/// Scan extracted strings for protobuf-like identifiers. Each distinct
/// identifier is reported once, with the first string it appeared in.
pub fn extract_protobufs(strings: &[String]) -> Vec<ProtobufMatch> {
    let mut matches = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for s in strings {
        for pattern in PROTOBUF_PATTERNS.iter() {
            for found in pattern.find_iter(s) {
                let name = found.as_str();
                if seen.contains(name) {
                    continue;
                }
                seen.insert(name.to_string());
                matches.push(ProtobufMatch {
                    name: name.to_string(),
                    kind: classify_protobuf(name),
                    context: s.clone(),
                });
            }
        }
    }

    matches
}

/// Subsystem classification by naming convention; first match wins.
fn classify_protobuf(name: &str) -> String {
    let lower = name.to_lowercase();
    let kind = if lower.contains("gc") {
        "GameCoordinator"
    } else if lower.contains("client") {
        "Client"
    } else if lower.contains("server") {
        "Server"
    } else if lower.contains("user") {
        "User"
    } else if lower.starts_with("k_e") {
        "Enum"
    } else if lower.contains("dota") {
        "DOTA2"
    } else if lower.contains("cs") {
        "CS2"
    } else {
        "Message"
    };
    kind.to_string()
}

/// Compare two identifier sets by name: `(added, removed)`.
pub fn compare_protobufs(
    old: &[ProtobufMatch],
    new: &[ProtobufMatch],
) -> (Vec<ProtobufMatch>, Vec<ProtobufMatch>) {
    let old_names: HashMap<&str, &ProtobufMatch> =
        old.iter().map(|p| (p.name.as_str(), p)).collect();
    let new_names: HashMap<&str, &ProtobufMatch> =
        new.iter().map(|p| (p.name.as_str(), p)).collect();

    let added = new
        .iter()
        .filter(|p| !old_names.contains_key(p.name.as_str()))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|p| !new_names.contains_key(p.name.as_str()))
        .cloned()
        .collect();

    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(matches: &[ProtobufMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_extracts_identifiers_from_context() {
        let strings = vec![
            "padding CMsgClientHello more".to_string(),
            "k_EMsgProtoBufFlag".to_string(),
            "no identifiers here".to_string(),
        ];

        let matches = extract_protobufs(&strings);
        assert_eq!(names(&matches), vec!["CMsgClientHello", "k_EMsgProtoBufFlag"]);
        assert_eq!(matches[0].context, "padding CMsgClientHello more");
    }

    #[test]
    fn test_identifiers_reported_once() {
        let strings = vec![
            "CMsgClientHello".to_string(),
            "again CMsgClientHello".to_string(),
        ];

        assert_eq!(extract_protobufs(&strings).len(), 1);
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_protobuf("CMsgGCStorePurchase"), "GameCoordinator");
        assert_eq!(classify_protobuf("CMsgClientHello"), "Client");
        assert_eq!(classify_protobuf("CServerHeartbeat"), "Server");
        assert_eq!(classify_protobuf("CUserProfile"), "User");
        assert_eq!(classify_protobuf("k_EResultOk"), "Enum");
        assert_eq!(classify_protobuf("CMsgDOTAMatch"), "DOTA2");
        assert_eq!(classify_protobuf("CMsgBadge"), "Message");
    }

    #[test]
    fn test_compare_protobufs() {
        let old = extract_protobufs(&["CMsgAlpha".to_string(), "CMsgBeta".to_string()]);
        let new = extract_protobufs(&["CMsgBeta".to_string(), "CMsgDelta".to_string()]);

        let (added, removed) = compare_protobufs(&old, &new);
        assert_eq!(names(&added), vec!["CMsgDelta"]);
        assert_eq!(names(&removed), vec!["CMsgAlpha"]);
    }

}
