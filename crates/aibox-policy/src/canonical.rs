// canonical.rs — Canonical policy serialization and content hashing.
//
// The policy version hash must be stable across runs, key reordering, and
// whitespace differences in the source YAML. We therefore render the
// *resolved* effective policy into a canonical key=value form: one line per
// field, lines sorted, sets in lexicographic order, durations in seconds,
// and the closed field-name set below. The hash is the 16-hex-char prefix of
// SHA-256 over those bytes.
//
// Field names here are part of the hash contract. Renaming one silently
// changes every policy hash.

use aibox_core::hash::short_hash;

use crate::merge::EffectivePolicy;

/// Render the canonical byte form of an effective policy.
pub fn canonical_bytes(policy: &EffectivePolicy) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("runtime.engine={}", policy.runtime.engine));
    lines.push(format!("runtime.rootless={}", policy.runtime.rootless));

    lines.push(format!("network.mode={}", policy.network.mode));
    for entry in &policy.network.allow {
        let hosts: Vec<&str> = entry.hosts.iter().map(String::as_str).collect();
        let ports: Vec<String> = entry.ports.iter().map(u16::to_string).collect();
        lines.push(format!(
            "network.allow[{}].hosts={}",
            entry.id,
            hosts.join(",")
        ));
        lines.push(format!(
            "network.allow[{}].ports={}",
            entry.id,
            ports.join(",")
        ));
        let rate = match &entry.rate_limit {
            Some(r) => format!("{}/{}", r.requests_per_min, r.tokens_per_min),
            None => "-".to_string(),
        };
        lines.push(format!("network.allow[{}].rate_limit={}", entry.id, rate));
    }

    // Tool rules are ordered, so the index is part of the canonical key.
    for (i, rule) in policy.tools.iter().enumerate() {
        lines.push(format!("tools[{:04}].match={}", i, rule.pattern));
        lines.push(format!("tools[{:04}].risk_class={}", i, rule.risk_class));
        lines.push(format!("tools[{:04}].reason={}", i, rule.reason));
    }

    lines.push(format!(
        "credentials.revoke_on_stop={}",
        policy.credentials.revoke_on_stop
    ));
    lines.push(format!(
        "credentials.no_persist_to_workspace={}",
        policy.credentials.no_persist_to_workspace
    ));
    lines.push(format!(
        "credentials.git_token_ttl={}",
        policy.credentials.git_token_ttl.as_secs()
    ));
    lines.push(format!(
        "credentials.llm_api_key_ttl={}",
        policy.credentials.llm_api_key_ttl.as_secs()
    ));
    lines.push(format!(
        "credentials.mirror_token_ttl={}",
        policy.credentials.mirror_token_ttl.as_secs()
    ));

    let denied: Vec<&str> = policy
        .filesystem
        .denied_paths
        .iter()
        .map(String::as_str)
        .collect();
    let writable: Vec<&str> = policy
        .filesystem
        .writable_paths
        .iter()
        .map(String::as_str)
        .collect();
    lines.push(format!("filesystem.denied_paths={}", denied.join(",")));
    lines.push(format!("filesystem.writable_paths={}", writable.join(",")));

    lines.sort();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Short content hash of an effective policy's canonical form.
pub fn policy_hash(policy: &EffectivePolicy) -> String {
    short_hash(canonical_bytes(policy).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PolicyDocument, PolicyLevel};
    use crate::merge::merge;
    use crate::validate::validate;
    use std::path::Path;

    fn load(yaml: &str) -> PolicyDocument {
        let doc: PolicyDocument = serde_yaml::from_str(yaml).unwrap();
        validate(&doc, PolicyLevel::Org, Path::new("(test)")).unwrap();
        doc
    }

    const BASE: &str = r#"
version: "1.0"
runtime:
  engine: gvisor
  rootless: true
network:
  mode: deny-by-default
  allow:
    - id: git
      hosts: [git.internal]
      ports: [443]
tools:
  - match: "git *"
    risk_class: safe
    reason: "version control"
credentials:
  revoke_on_stop: true
  git_token_ttl: "8h"
filesystem:
  denied_paths: ["/etc/**"]
  writable_paths: ["/workspace/**"]
"#;

    // Same document with keys reordered, different whitespace, and the TTL
    // written in minutes.
    const REORDERED: &str = r#"
filesystem:
  writable_paths: ["/workspace/**"]
  denied_paths: ["/etc/**"]
credentials:
  git_token_ttl: "480m"
  revoke_on_stop: true
tools:
  - reason: "version control"
    risk_class: safe
    match: "git *"
network:
  allow:
    - ports: [443]
      hosts: [git.internal]
      id: git
  mode: deny-by-default
runtime:
  rootless: true
  engine: gvisor
version: "1.0"
"#;

    #[test]
    fn hash_is_stable_across_runs() {
        let doc = load(BASE);
        let a = merge(&doc, None, None).unwrap();
        let b = merge(&doc, None, None).unwrap();
        assert_eq!(a.version_hash, b.version_hash);
        assert_eq!(a.version_hash.len(), 16);
    }

    #[test]
    fn structurally_equivalent_documents_hash_identically() {
        let a = merge(&load(BASE), None, None).unwrap();
        let b = merge(&load(REORDERED), None, None).unwrap();
        assert_eq!(a.version_hash, b.version_hash);
    }

    #[test]
    fn any_field_change_changes_the_hash() {
        let a = merge(&load(BASE), None, None).unwrap();
        let changed = BASE.replace("git.internal", "git.example");
        let b = merge(&load(&changed), None, None).unwrap();
        assert_ne!(a.version_hash, b.version_hash);
    }

    #[test]
    fn canonical_form_renders_durations_in_seconds() {
        let effective = merge(&load(BASE), None, None).unwrap();
        let canon = canonical_bytes(&effective);
        assert!(canon.contains("credentials.git_token_ttl=28800"));
        assert!(!canon.contains("8h"));
    }

    #[test]
    fn canonical_form_is_sorted_lines() {
        let effective = merge(&load(BASE), None, None).unwrap();
        let canon = canonical_bytes(&effective);
        let lines: Vec<&str> = canon.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
    }
}
