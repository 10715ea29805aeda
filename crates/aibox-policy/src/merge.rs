// merge.rs — Tighten-only hierarchy merge.
//
// merge(org, team, project) folds children onto the org baseline one level
// at a time. A child may only restrict: stronger engine, stricter network
// mode, subset allowlists, appended (never downgrading) tool rules, shorter
// TTLs, unioned deny lists, subset writable lists. Every loosening attempt
// becomes a Violation; violations are collected across all fields and
// returned together. The merge never silently repairs a child document.

use std::collections::BTreeSet;

use crate::canonical;
use crate::document::{
    AllowEntry, FilesystemPolicy, NetworkPolicy, PolicyDocument, PolicyLevel, RuntimeEngine,
    ToolRule, Ttl, GIT_TOKEN_TTL_CAP, LLM_API_KEY_TTL_CAP, MIRROR_TOKEN_TTL_CAP,
};
use crate::error::{PolicyError, Violation};

/// The merged, fully-resolved policy for one sandbox lifetime.
///
/// Immutable once built; `version_hash` is the short content hash over the
/// canonical serialization and appears in every decision entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePolicy {
    pub runtime: EffectiveRuntime,
    pub network: NetworkPolicy,
    pub tools: Vec<ToolRule>,
    pub credentials: EffectiveCredentials,
    pub filesystem: FilesystemPolicy,
    pub version_hash: String,
}

/// Runtime section with defaults resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRuntime {
    pub engine: RuntimeEngine,
    pub rootless: bool,
}

/// Credential section with defaults resolved. Unspecified TTLs resolve to
/// their caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveCredentials {
    pub revoke_on_stop: bool,
    pub no_persist_to_workspace: bool,
    pub git_token_ttl: Ttl,
    pub llm_api_key_ttl: Ttl,
    pub mirror_token_ttl: Ttl,
}

/// Merge org → team → project under the tighten-only invariant.
///
/// The org document must have passed [`crate::validate::validate`] at
/// [`PolicyLevel::Org`] (all sections present).
pub fn merge(
    org: &PolicyDocument,
    team: Option<&PolicyDocument>,
    project: Option<&PolicyDocument>,
) -> Result<EffectivePolicy, PolicyError> {
    let mut resolved = baseline(org)?;
    let mut violations = Vec::new();

    for (child, level) in [(team, PolicyLevel::Team), (project, PolicyLevel::Project)] {
        if let Some(child) = child {
            apply_child(&mut resolved, child, level, &mut violations);
        }
    }

    if !violations.is_empty() {
        return Err(PolicyError::Merge { violations });
    }

    resolved.version_hash = canonical::policy_hash(&resolved);
    Ok(resolved)
}

/// Resolve the org document into the merge baseline.
///
/// Callers normally validate first; a structurally incomplete org document
/// still fails here rather than panicking.
fn baseline(org: &PolicyDocument) -> Result<EffectivePolicy, PolicyError> {
    let section_missing = |field: &str| PolicyError::Schema {
        path: std::path::PathBuf::from("(org)"),
        field: field.to_string(),
        message: "required at org level".to_string(),
    };
    let runtime = org.runtime.as_ref().ok_or_else(|| section_missing("runtime"))?;
    let network = org.network.as_ref().ok_or_else(|| section_missing("network"))?;
    let credentials = org
        .credentials
        .as_ref()
        .ok_or_else(|| section_missing("credentials"))?;
    let filesystem = org
        .filesystem
        .as_ref()
        .ok_or_else(|| section_missing("filesystem"))?;

    Ok(EffectivePolicy {
        runtime: EffectiveRuntime {
            engine: runtime.engine,
            rootless: runtime.rootless.unwrap_or(false),
        },
        network: network.clone(),
        tools: org.tools.clone(),
        credentials: EffectiveCredentials {
            revoke_on_stop: credentials.revoke_on_stop.unwrap_or(false),
            no_persist_to_workspace: credentials.no_persist_to_workspace.unwrap_or(false),
            git_token_ttl: credentials.git_token_ttl.unwrap_or(Ttl(GIT_TOKEN_TTL_CAP)),
            llm_api_key_ttl: credentials
                .llm_api_key_ttl
                .unwrap_or(Ttl(LLM_API_KEY_TTL_CAP)),
            mirror_token_ttl: credentials
                .mirror_token_ttl
                .unwrap_or(Ttl(MIRROR_TOKEN_TTL_CAP)),
        },
        filesystem: filesystem.clone(),
        version_hash: String::new(),
    })
}

fn apply_child(
    resolved: &mut EffectivePolicy,
    child: &PolicyDocument,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    if let Some(runtime) = &child.runtime {
        apply_runtime(resolved, runtime, level, violations);
    }
    if let Some(network) = &child.network {
        apply_network(resolved, network, level, violations);
    }
    apply_tools(resolved, &child.tools, level, violations);
    if let Some(credentials) = &child.credentials {
        apply_credentials(resolved, credentials, level, violations);
    }
    if let Some(filesystem) = &child.filesystem {
        apply_filesystem(resolved, filesystem, level, violations);
    }
}

fn apply_runtime(
    resolved: &mut EffectivePolicy,
    child: &crate::document::RuntimePolicy,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    if child.engine.strength() < resolved.runtime.engine.strength() {
        violations.push(Violation {
            path_in_document: "runtime.engine".to_string(),
            parent_value: resolved.runtime.engine.to_string(),
            child_value: child.engine.to_string(),
            explanation: format!("{} level chose a weaker isolation engine", level),
        });
    } else {
        resolved.runtime.engine = child.engine;
    }

    match child.rootless {
        Some(false) if resolved.runtime.rootless => violations.push(Violation {
            path_in_document: "runtime.rootless".to_string(),
            parent_value: "true".to_string(),
            child_value: "false".to_string(),
            explanation: format!("{} level cleared rootless set by a parent", level),
        }),
        Some(value) => resolved.runtime.rootless = resolved.runtime.rootless || value,
        None => {}
    }
}

fn apply_network(
    resolved: &mut EffectivePolicy,
    child: &NetworkPolicy,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    if child.mode.strictness() < resolved.network.mode.strictness() {
        violations.push(Violation {
            path_in_document: "network.mode".to_string(),
            parent_value: resolved.network.mode.to_string(),
            child_value: child.mode.to_string(),
            explanation: format!("{} level moved the network mode toward open", level),
        });
    } else {
        resolved.network.mode = child.mode;
    }

    // The child's allow list replaces the parent's. Each entry must name an
    // existing parent entry and may only shrink it.
    let mut next_allow = Vec::with_capacity(child.allow.len());
    for entry in &child.allow {
        let Some(parent) = resolved.network.allow.iter().find(|p| p.id == entry.id) else {
            violations.push(Violation {
                path_in_document: format!("network.allow[{}]", entry.id),
                parent_value: "(absent)".to_string(),
                child_value: entry.id.clone(),
                explanation: format!("{} level added an allow entry not present in the parent", level),
            });
            continue;
        };
        restrict_allow_entry(parent, entry, level, violations);
        next_allow.push(entry.clone());
    }
    resolved.network.allow = next_allow;
}

fn restrict_allow_entry(
    parent: &AllowEntry,
    child: &AllowEntry,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    for host in child.hosts.difference(&parent.hosts) {
        violations.push(Violation {
            path_in_document: format!("network.allow[{}].hosts", child.id),
            parent_value: join(&parent.hosts),
            child_value: host.clone(),
            explanation: format!("{} level added a host not present in the parent entry", level),
        });
    }
    let parent_ports: BTreeSet<String> = parent.ports.iter().map(u16::to_string).collect();
    for port in child.ports.iter().filter(|p| !parent.ports.contains(p)) {
        violations.push(Violation {
            path_in_document: format!("network.allow[{}].ports", child.id),
            parent_value: join(&parent_ports),
            child_value: port.to_string(),
            explanation: format!("{} level added a port not present in the parent entry", level),
        });
    }
    match (&parent.rate_limit, &child.rate_limit) {
        (Some(p), Some(c)) => {
            if c.requests_per_min > p.requests_per_min || c.tokens_per_min > p.tokens_per_min {
                violations.push(Violation {
                    path_in_document: format!("network.allow[{}].rate_limit", child.id),
                    parent_value: format!("{}rpm/{}tpm", p.requests_per_min, p.tokens_per_min),
                    child_value: format!("{}rpm/{}tpm", c.requests_per_min, c.tokens_per_min),
                    explanation: format!("{} level raised a rate limit", level),
                });
            }
        }
        (Some(p), None) => violations.push(Violation {
            path_in_document: format!("network.allow[{}].rate_limit", child.id),
            parent_value: format!("{}rpm/{}tpm", p.requests_per_min, p.tokens_per_min),
            child_value: "(absent)".to_string(),
            explanation: format!("{} level removed the parent's rate limit", level),
        }),
        // Parent had no limit: a child may introduce one (tightening) or
        // leave it unlimited.
        (None, _) => {}
    }
}

fn apply_tools(
    resolved: &mut EffectivePolicy,
    child_rules: &[ToolRule],
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    for rule in child_rules {
        // A child restating a parent pattern with a weaker class is a
        // downgrade. (Overlapping-but-distinct patterns are handled by the
        // evaluator, which applies the strictest matching class.)
        if let Some(parent) = resolved.tools.iter().find(|p| p.pattern == rule.pattern) {
            if rule.risk_class.severity() < parent.risk_class.severity() {
                violations.push(Violation {
                    path_in_document: format!("tools[match={}]", rule.pattern),
                    parent_value: parent.risk_class.to_string(),
                    child_value: rule.risk_class.to_string(),
                    explanation: format!("{} level downgraded a parent tool rule", level),
                });
                continue;
            }
        }
        resolved.tools.push(rule.clone());
    }
}

fn apply_credentials(
    resolved: &mut EffectivePolicy,
    child: &crate::document::CredentialPolicy,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    merge_monotone_flag(
        "credentials.revoke_on_stop",
        &mut resolved.credentials.revoke_on_stop,
        child.revoke_on_stop,
        level,
        violations,
    );
    merge_monotone_flag(
        "credentials.no_persist_to_workspace",
        &mut resolved.credentials.no_persist_to_workspace,
        child.no_persist_to_workspace,
        level,
        violations,
    );

    for (field, parent_ttl, child_ttl) in [
        (
            "credentials.git_token_ttl",
            &mut resolved.credentials.git_token_ttl,
            child.git_token_ttl,
        ),
        (
            "credentials.llm_api_key_ttl",
            &mut resolved.credentials.llm_api_key_ttl,
            child.llm_api_key_ttl,
        ),
        (
            "credentials.mirror_token_ttl",
            &mut resolved.credentials.mirror_token_ttl,
            child.mirror_token_ttl,
        ),
    ] {
        if let Some(ttl) = child_ttl {
            if ttl > *parent_ttl {
                violations.push(Violation {
                    path_in_document: field.to_string(),
                    parent_value: format!("{}s", parent_ttl.as_secs()),
                    child_value: format!("{}s", ttl.as_secs()),
                    explanation: format!("{} level lengthened a credential TTL", level),
                });
            } else {
                *parent_ttl = ttl;
            }
        }
    }
}

/// A boolean that may only move false → true across the hierarchy.
fn merge_monotone_flag(
    field: &str,
    parent: &mut bool,
    child: Option<bool>,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    match child {
        Some(false) if *parent => violations.push(Violation {
            path_in_document: field.to_string(),
            parent_value: "true".to_string(),
            child_value: "false".to_string(),
            explanation: format!("{} level cleared a monotone credential flag", level),
        }),
        Some(value) => *parent = *parent || value,
        None => {}
    }
}

fn apply_filesystem(
    resolved: &mut EffectivePolicy,
    child: &FilesystemPolicy,
    level: PolicyLevel,
    violations: &mut Vec<Violation>,
) {
    // Deny lists union: children can only forbid more.
    resolved
        .filesystem
        .denied_paths
        .extend(child.denied_paths.iter().cloned());

    // Writable lists shrink: a child path absent from the parent expands the
    // writable surface.
    if !child.writable_paths.is_empty() {
        let mut next = BTreeSet::new();
        let mut ok = true;
        for path in &child.writable_paths {
            if resolved.filesystem.writable_paths.contains(path) {
                next.insert(path.clone());
            } else {
                ok = false;
                violations.push(Violation {
                    path_in_document: "filesystem.writable_paths".to_string(),
                    parent_value: join(&resolved.filesystem.writable_paths),
                    child_value: path.clone(),
                    explanation: format!("{} level added a writable path", level),
                });
            }
        }
        if ok {
            resolved.filesystem.writable_paths = next;
        }
    }
}

fn join(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(",")
}
