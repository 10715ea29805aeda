// loader.rs — Policy document loading.
//
// The caller supplies explicit paths; this crate never searches for policy
// files. A missing team or project file is normal. A missing org file is
// NoEffectivePolicy — the session layer decides whether that degrades to an
// unenforced start (the default, with a warning) or aborts.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::document::{PolicyDocument, PolicyLevel};
use crate::error::PolicyError;
use crate::validate::{validate, ValidationWarning};

/// The validated documents of one hierarchy, ready to merge.
#[derive(Debug, Clone)]
pub struct PolicyHierarchy {
    pub org: PolicyDocument,
    pub team: Option<PolicyDocument>,
    pub project: Option<PolicyDocument>,
    /// Validation warnings collected across all levels (e.g. an empty
    /// `tools` list that gates every operation behind review).
    pub warnings: Vec<ValidationWarning>,
}

/// Load and validate a single policy document.
pub fn load_document(
    path: impl AsRef<Path>,
    level: PolicyLevel,
) -> Result<PolicyDocument, PolicyError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: PolicyDocument = serde_yaml::from_str(&text).map_err(|e| PolicyError::Parse {
        path: path.to_path_buf(),
        location: e
            .location()
            .map(|l| format!("line {}, column {}", l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string()),
        message: e.to_string(),
    })?;
    // Per-level validation is fatal here; warnings are surfaced by
    // load_hierarchy, which re-validates with the path in hand.
    validate(&doc, level, path)?;
    Ok(doc)
}

/// Load the full hierarchy: org (required), team and project (optional).
///
/// Missing optional files are skipped silently; a missing org file returns
/// [`PolicyError::NoEffectivePolicy`].
pub fn load_hierarchy(
    org_path: impl AsRef<Path>,
    team_path: Option<&Path>,
    project_path: Option<&Path>,
) -> Result<PolicyHierarchy, PolicyError> {
    let org_path = org_path.as_ref();
    if !org_path.exists() {
        return Err(PolicyError::NoEffectivePolicy {
            path: org_path.to_path_buf(),
        });
    }

    let mut warnings = Vec::new();
    let org = load_level(org_path, PolicyLevel::Org, &mut warnings)?;
    let team = load_optional(team_path, PolicyLevel::Team, &mut warnings)?;
    let project = load_optional(project_path, PolicyLevel::Project, &mut warnings)?;

    for w in &warnings {
        warn!(level = %w.level, "policy validation: {}", w.message);
    }

    Ok(PolicyHierarchy {
        org,
        team,
        project,
        warnings,
    })
}

fn load_optional(
    path: Option<&Path>,
    level: PolicyLevel,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<Option<PolicyDocument>, PolicyError> {
    match path {
        Some(p) if p.exists() => Ok(Some(load_level(p, level, warnings)?)),
        _ => Ok(None),
    }
}

fn load_level(
    path: &Path,
    level: PolicyLevel,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<PolicyDocument, PolicyError> {
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: PolicyDocument = serde_yaml::from_str(&text).map_err(|e| PolicyError::Parse {
        path: path.to_path_buf(),
        location: e
            .location()
            .map(|l| format!("line {}, column {}", l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string()),
        message: e.to_string(),
    })?;
    warnings.extend(validate(&doc, level, path)?);
    Ok(doc)
}

/// Default org policy location used by callers that have no explicit
/// configuration.
pub fn default_org_path() -> PathBuf {
    PathBuf::from("/etc/aibox/policy.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const ORG_YAML: &str = r#"
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
  - match: "git status*"
    risk_class: safe
    reason: "read-only"
credentials:
  revoke_on_stop: true
  git_token_ttl: "8h"
filesystem:
  denied_paths: ["/etc/**"]
  writable_paths: ["/workspace/**"]
"#;

    #[test]
    fn load_valid_org_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("org.yaml");
        fs::write(&path, ORG_YAML).unwrap();

        let doc = load_document(&path, PolicyLevel::Org).unwrap();
        assert_eq!(doc.version, "1.0");
    }

    #[test]
    fn parse_error_carries_location() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "version: [unclosed").unwrap();

        match load_document(&path, PolicyLevel::Org) {
            Err(PolicyError::Parse { location, .. }) => {
                assert!(location.contains("line"));
            }
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn missing_org_is_no_effective_policy() {
        let dir = tempdir().unwrap();
        match load_hierarchy(dir.path().join("absent.yaml"), None, None) {
            Err(PolicyError::NoEffectivePolicy { .. }) => {}
            other => panic!("expected NoEffectivePolicy, got {:?}", other),
        }
    }

    #[test]
    fn missing_team_and_project_are_skipped() {
        let dir = tempdir().unwrap();
        let org = dir.path().join("org.yaml");
        fs::write(&org, ORG_YAML).unwrap();

        let hierarchy = load_hierarchy(
            &org,
            Some(&dir.path().join("no-team.yaml")),
            Some(&dir.path().join("no-project.yaml")),
        )
        .unwrap();
        assert!(hierarchy.team.is_none());
        assert!(hierarchy.project.is_none());
    }

    #[test]
    fn hierarchy_loads_all_levels() {
        let dir = tempdir().unwrap();
        let org = dir.path().join("org.yaml");
        let team = dir.path().join("team.yaml");
        fs::write(&org, ORG_YAML).unwrap();
        fs::write(&team, "version: \"1.0\"\ntools:\n  - match: \"rm *\"\n    risk_class: blocked-by-default\n    reason: \"destructive\"\n").unwrap();

        let hierarchy = load_hierarchy(&org, Some(&team), None).unwrap();
        assert!(hierarchy.team.is_some());
        assert_eq!(hierarchy.team.unwrap().tools.len(), 1);
    }
}
