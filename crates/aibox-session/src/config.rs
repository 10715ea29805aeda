// config.rs — Session configuration.
//
// The session never searches for files: every path is supplied here. The
// `for_workspace` constructor lays state out under a `.aibox/` directory in
// the workspace root, with the org policy at its conventional system path.

use std::path::{Path, PathBuf};

use aibox_decision_log::DecisionLogConfig;
use aibox_policy::loader::default_org_path;

/// Everything a [`crate::SandboxSession`] needs to start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Org policy document (required; its absence degrades the session to
    /// unenforced with a warning).
    pub org_policy: PathBuf,
    /// Team policy document, if the deployment has one.
    pub team_policy: Option<PathBuf>,
    /// Project policy document, if the workspace carries one.
    pub project_policy: Option<PathBuf>,

    /// The developer workspace the sandbox mounts.
    pub workspace: PathBuf,
    /// The requesting user, recorded on every decision and audit event.
    pub user: String,

    pub decision_log: DecisionLogConfig,
    /// Directory for immutable audit batches.
    pub audit_dir: PathBuf,
}

impl SessionConfig {
    /// Standard layout: org policy from the system path, project policy and
    /// all session state under `<workspace>/.aibox/`.
    pub fn for_workspace(workspace: impl AsRef<Path>, user: impl Into<String>) -> Self {
        let workspace = workspace.as_ref().to_path_buf();
        let state_dir = workspace.join(".aibox");
        Self {
            org_policy: default_org_path(),
            team_policy: None,
            project_policy: Some(state_dir.join("policy.yaml")),
            workspace,
            user: user.into(),
            decision_log: DecisionLogConfig::new(
                state_dir.join("decisions.jsonl").display().to_string(),
            ),
            audit_dir: state_dir.join("audit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_layout_lands_under_dot_aibox() {
        let config = SessionConfig::for_workspace("/home/dev/project", "dev");
        assert_eq!(
            config.project_policy.as_deref(),
            Some(Path::new("/home/dev/project/.aibox/policy.yaml"))
        );
        assert_eq!(
            config.decision_log.path,
            Path::new("/home/dev/project/.aibox/decisions.jsonl")
        );
        assert_eq!(
            config.audit_dir,
            Path::new("/home/dev/project/.aibox/audit")
        );
        assert_eq!(config.org_policy, default_org_path());
    }
}
