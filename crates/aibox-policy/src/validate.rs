// validate.rs — Per-level document validation.
//
// Each level is validated independently, before any merge:
// - org documents must carry every section (children may be partial)
// - allowlist entries need non-empty ids; org-level hosts may not contain
//   wildcards; llm-gateway entries must declare a rate limit
// - TTLs are positive and within the fixed caps (git 8h, llm 12h, mirror 24h)
// - filesystem patterns are absolute
// - tool rule patterns must compile as globs (fail-fast, with the index)
//
// Validation errors are fatal for the sandbox start. Warnings (notably an
// empty tools list, which gates every operation behind review) are returned
// for the caller to surface.

use std::path::Path;

use glob::Pattern;

use crate::document::{
    PolicyDocument, PolicyLevel, Ttl, GIT_TOKEN_TTL_CAP, LLM_API_KEY_TTL_CAP, MIRROR_TOKEN_TTL_CAP,
};
use crate::error::PolicyError;

/// A non-fatal validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub level: PolicyLevel,
    pub message: String,
}

/// Validate one document. Returns warnings on success.
pub fn validate(
    doc: &PolicyDocument,
    level: PolicyLevel,
    path: &Path,
) -> Result<Vec<ValidationWarning>, PolicyError> {
    let schema_err = |field: &str, message: String| PolicyError::Schema {
        path: path.to_path_buf(),
        field: field.to_string(),
        message,
    };

    if doc.version.trim().is_empty() {
        return Err(schema_err("version", "must be non-empty".to_string()));
    }

    // Org documents must be complete; children inherit what they omit.
    if level == PolicyLevel::Org {
        if doc.runtime.is_none() {
            return Err(schema_err("runtime", "required at org level".to_string()));
        }
        if doc.network.is_none() {
            return Err(schema_err("network", "required at org level".to_string()));
        }
        if doc.credentials.is_none() {
            return Err(schema_err(
                "credentials",
                "required at org level".to_string(),
            ));
        }
        if doc.filesystem.is_none() {
            return Err(schema_err(
                "filesystem",
                "required at org level".to_string(),
            ));
        }
    }

    if let Some(network) = &doc.network {
        for entry in &network.allow {
            if entry.id.trim().is_empty() {
                return Err(schema_err(
                    "network.allow.id",
                    "allow entries must have a non-empty id".to_string(),
                ));
            }
            if level == PolicyLevel::Org {
                if let Some(host) = entry.hosts.iter().find(|h| h.contains('*')) {
                    return Err(schema_err(
                        &format!("network.allow[{}].hosts", entry.id),
                        format!("wildcard host '{}' is not allowed at org level", host),
                    ));
                }
            }
            if entry.is_llm_gateway() && entry.rate_limit.is_none() {
                return Err(schema_err(
                    &format!("network.allow[{}].rate_limit", entry.id),
                    "llm-gateway entries must declare a rate limit".to_string(),
                ));
            }
        }
    }

    if let Some(credentials) = &doc.credentials {
        check_ttl(
            credentials.git_token_ttl,
            GIT_TOKEN_TTL_CAP,
            "credentials.git_token_ttl",
            path,
        )?;
        check_ttl(
            credentials.llm_api_key_ttl,
            LLM_API_KEY_TTL_CAP,
            "credentials.llm_api_key_ttl",
            path,
        )?;
        check_ttl(
            credentials.mirror_token_ttl,
            MIRROR_TOKEN_TTL_CAP,
            "credentials.mirror_token_ttl",
            path,
        )?;
    }

    if let Some(filesystem) = &doc.filesystem {
        for (field, patterns) in [
            ("filesystem.denied_paths", &filesystem.denied_paths),
            ("filesystem.writable_paths", &filesystem.writable_paths),
        ] {
            if let Some(p) = patterns.iter().find(|p| !p.starts_with('/')) {
                return Err(schema_err(
                    field,
                    format!("path pattern '{}' must be absolute", p),
                ));
            }
        }
    }

    for (index, rule) in doc.tools.iter().enumerate() {
        if let Err(e) = Pattern::new(&rule.pattern) {
            return Err(PolicyError::InvalidPattern {
                index,
                pattern: rule.pattern.clone(),
                message: e.to_string(),
            });
        }
    }

    let mut warnings = Vec::new();
    if doc.tools.is_empty() {
        warnings.push(ValidationWarning {
            level,
            message: "tools list is empty; every operation will be gated behind review"
                .to_string(),
        });
    }

    Ok(warnings)
}

fn check_ttl(ttl: Option<Ttl>, cap: std::time::Duration, field: &str, path: &Path) -> Result<(), PolicyError> {
    let Some(ttl) = ttl else { return Ok(()) };
    if ttl.0.is_zero() {
        return Err(PolicyError::Schema {
            path: path.to_path_buf(),
            field: field.to_string(),
            message: "TTL must be positive".to_string(),
        });
    }
    if ttl.0 > cap {
        return Err(PolicyError::Schema {
            path: path.to_path_buf(),
            field: field.to_string(),
            message: format!(
                "TTL {}s exceeds the cap of {}s",
                ttl.as_secs(),
                cap.as_secs()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use crate::document::{
        AllowEntry, CredentialPolicy, FilesystemPolicy, NetworkMode, NetworkPolicy, RateLimit,
        RiskClass, RuntimeEngine, RuntimePolicy, ToolRule,
    };

    fn org_doc() -> PolicyDocument {
        PolicyDocument {
            version: "1.0".to_string(),
            runtime: Some(RuntimePolicy {
                engine: RuntimeEngine::Gvisor,
                rootless: Some(true),
            }),
            network: Some(NetworkPolicy {
                mode: NetworkMode::DenyByDefault,
                allow: vec![AllowEntry {
                    id: "git".to_string(),
                    hosts: BTreeSet::from(["git.internal".to_string()]),
                    ports: BTreeSet::from([443]),
                    rate_limit: None,
                }],
            }),
            tools: vec![ToolRule {
                pattern: "git *".to_string(),
                risk_class: RiskClass::Safe,
                reason: "version control".to_string(),
            }],
            credentials: Some(CredentialPolicy::default()),
            filesystem: Some(FilesystemPolicy {
                denied_paths: BTreeSet::from(["/etc/**".to_string()]),
                writable_paths: BTreeSet::from(["/workspace/**".to_string()]),
            }),
        }
    }

    fn path() -> PathBuf {
        PathBuf::from("/test/policy.yaml")
    }

    #[test]
    fn valid_org_passes_without_warnings() {
        let warnings = validate(&org_doc(), PolicyLevel::Org, &path()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn org_missing_runtime_is_schema_error() {
        let mut doc = org_doc();
        doc.runtime = None;
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::Schema { field, .. }) => assert_eq!(field, "runtime"),
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn partial_team_document_is_fine() {
        let doc = PolicyDocument {
            version: "1.0".to_string(),
            runtime: None,
            network: None,
            tools: vec![ToolRule {
                pattern: "rm *".to_string(),
                risk_class: RiskClass::BlockedByDefault,
                reason: "destructive".to_string(),
            }],
            credentials: None,
            filesystem: None,
        };
        assert!(validate(&doc, PolicyLevel::Team, &path()).is_ok());
    }

    #[test]
    fn empty_allow_id_rejected() {
        let mut doc = org_doc();
        doc.network.as_mut().unwrap().allow[0].id = "".to_string();
        assert!(matches!(
            validate(&doc, PolicyLevel::Org, &path()),
            Err(PolicyError::Schema { .. })
        ));
    }

    #[test]
    fn wildcard_host_rejected_at_org_level() {
        let mut doc = org_doc();
        doc.network
            .as_mut()
            .unwrap()
            .allow[0]
            .hosts
            .insert("*".to_string());
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::Schema { field, message, .. }) => {
                assert!(field.contains("hosts"));
                assert!(message.contains("wildcard"));
            }
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn wildcard_host_tolerated_at_team_level() {
        let doc = PolicyDocument {
            version: "1.0".to_string(),
            runtime: None,
            network: Some(NetworkPolicy {
                mode: NetworkMode::Filtered,
                allow: vec![AllowEntry {
                    id: "mirror".to_string(),
                    hosts: BTreeSet::from(["*.mirror.internal".to_string()]),
                    ports: BTreeSet::from([443]),
                    rate_limit: None,
                }],
            }),
            tools: vec![],
            credentials: None,
            filesystem: None,
        };
        // Syntactic wildcard rejection is an org-level rule only. (The merge
        // still rejects the entry if it extends the parent set.)
        assert!(validate(&doc, PolicyLevel::Team, &path()).is_ok());
    }

    #[test]
    fn llm_gateway_without_rate_limit_rejected() {
        let mut doc = org_doc();
        doc.network.as_mut().unwrap().allow.push(AllowEntry {
            id: "llm-gateway".to_string(),
            hosts: BTreeSet::from(["llm.internal".to_string()]),
            ports: BTreeSet::from([443]),
            rate_limit: None,
        });
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::Schema { field, .. }) => assert!(field.contains("rate_limit")),
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn llm_gateway_with_rate_limit_passes() {
        let mut doc = org_doc();
        doc.network.as_mut().unwrap().allow.push(AllowEntry {
            id: "llm-gateway".to_string(),
            hosts: BTreeSet::from(["llm.internal".to_string()]),
            ports: BTreeSet::from([443]),
            rate_limit: Some(RateLimit {
                requests_per_min: 60,
                tokens_per_min: 100_000,
            }),
        });
        assert!(validate(&doc, PolicyLevel::Org, &path()).is_ok());
    }

    #[test]
    fn ttl_over_cap_rejected() {
        let mut doc = org_doc();
        doc.credentials.as_mut().unwrap().git_token_ttl =
            Some(Ttl(std::time::Duration::from_secs(9 * 3600)));
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::Schema { field, message, .. }) => {
                assert_eq!(field, "credentials.git_token_ttl");
                assert!(message.contains("cap"));
            }
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn zero_ttl_rejected() {
        let mut doc = org_doc();
        doc.credentials.as_mut().unwrap().llm_api_key_ttl =
            Some(Ttl(std::time::Duration::ZERO));
        assert!(matches!(
            validate(&doc, PolicyLevel::Org, &path()),
            Err(PolicyError::Schema { .. })
        ));
    }

    #[test]
    fn relative_filesystem_pattern_rejected() {
        let mut doc = org_doc();
        doc.filesystem
            .as_mut()
            .unwrap()
            .denied_paths
            .insert("etc/**".to_string());
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::Schema { message, .. }) => assert!(message.contains("absolute")),
            other => panic!("expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn bad_tool_pattern_reports_index() {
        let mut doc = org_doc();
        doc.tools.push(ToolRule {
            pattern: "[unclosed".to_string(),
            risk_class: RiskClass::Safe,
            reason: "broken".to_string(),
        });
        match validate(&doc, PolicyLevel::Org, &path()) {
            Err(PolicyError::InvalidPattern { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn empty_tools_warns_about_default_gate() {
        let mut doc = org_doc();
        doc.tools.clear();
        let warnings = validate(&doc, PolicyLevel::Org, &path()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("gated"));
    }
}
