// retention.rs — Minimum retention lookup.
//
// The store only answers "how long must this event type be kept"; actual
// deletion of aged-out batches is an external collaborator's job, driven by
// AuditStore::list.

use crate::event::AuditEventType;

/// Minimum retention for an event type, in years.
pub fn min_retention_years(event_type: AuditEventType) -> u8 {
    use AuditEventType::*;
    match event_type {
        // Credential lifecycle and policy decisions carry compliance weight.
        CredentialIssue | CredentialUse | CredentialRotate | CredentialRevoke => 7,
        PolicyAllow | PolicyDeny | ToolApprove | ToolDeny => 7,
        MonitorAlert => 5,
        SandboxStart | SandboxStop | SessionStart | SessionEnd => 3,
        ToolInvoke | FileRead | FileWrite => 3,
        LlmRequest | LlmResponse => 2,
        NetworkAllow | NetworkDeny | DnsQuery | DnsResponse => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_type_has_a_retention() {
        for event_type in AuditEventType::ALL {
            assert!(min_retention_years(event_type) >= 1);
        }
    }

    #[test]
    fn credential_events_keep_longest() {
        assert_eq!(min_retention_years(AuditEventType::CredentialRevoke), 7);
        assert!(
            min_retention_years(AuditEventType::CredentialIssue)
                > min_retention_years(AuditEventType::DnsQuery)
        );
    }
}
