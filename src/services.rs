//! Remote service identities and their static integration profiles.
//!
//! Every external platform the engine talks to is one variant of
//! [`ServiceId`]; per-service wiring (API base, OAuth endpoints, scope,
//! webhook signature header, event field, default rate limit) lives in a
//! static [`ServiceProfile`] table so adding a service is a table row,
//! not new control flow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of remote services the engine synchronizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceId {
    Crm,
    Fsm,
    Books,
    People,
    Desk,
    Quoting,
}

/// Static integration profile for one remote service.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    /// Stable lowercase identifier used in URLs, config keys and DB rows.
    pub slug: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Default REST API base URL.
    pub api_base: &'static str,
    /// Default OAuth host (authorize + token endpoints live under it).
    pub auth_base: &'static str,
    /// OAuth scope requested during the authorization-code flow.
    pub oauth_scope: &'static str,
    /// Header carrying the hex HMAC-SHA256 webhook signature.
    pub signature_header: &'static str,
    /// JSON field naming the event type in webhook payloads.
    pub event_field: &'static str,
    /// JSON field carrying the remote record identifier in webhook payloads.
    pub record_id_field: &'static str,
    /// Default outbound request ceiling per 60-second window.
    pub rate_limit_per_minute: u32,
}

const CRM_PROFILE: ServiceProfile = ServiceProfile {
    slug: "crm",
    display_name: "CRM",
    api_base: "https://api.pipequarter.com/crm/v2",
    auth_base: "https://accounts.pipequarter.com",
    oauth_scope: "crm.modules.ALL crm.settings.READ",
    signature_header: "x-crm-signature",
    event_field: "operation",
    record_id_field: "id",
    rate_limit_per_minute: 100,
};

const FSM_PROFILE: ServiceProfile = ServiceProfile {
    slug: "fsm",
    display_name: "Field Service",
    api_base: "https://api.fieldmast.com/fsm/v1",
    auth_base: "https://accounts.fieldmast.com",
    oauth_scope: "fsm.workorders.ALL fsm.appointments.ALL",
    signature_header: "x-fsm-webhook-signature",
    event_field: "event",
    record_id_field: "id",
    rate_limit_per_minute: 60,
};

const BOOKS_PROFILE: ServiceProfile = ServiceProfile {
    slug: "books",
    display_name: "Books",
    api_base: "https://api.ledgerloop.com/books/v3",
    auth_base: "https://accounts.ledgerloop.com",
    oauth_scope: "books.fullaccess.all",
    signature_header: "x-books-signature",
    event_field: "event_type",
    record_id_field: "id",
    rate_limit_per_minute: 60,
};

const PEOPLE_PROFILE: ServiceProfile = ServiceProfile {
    slug: "people",
    display_name: "People",
    api_base: "https://api.peopleplane.com/people/v1",
    auth_base: "https://accounts.peopleplane.com",
    oauth_scope: "people.timetracker.ALL people.forms.READ",
    signature_header: "x-people-signature",
    event_field: "event",
    record_id_field: "recordId",
    rate_limit_per_minute: 60,
};

const DESK_PROFILE: ServiceProfile = ServiceProfile {
    slug: "desk",
    display_name: "Desk",
    api_base: "https://api.deskhandle.com/api/v1",
    auth_base: "https://accounts.deskhandle.com",
    oauth_scope: "desk.tickets.ALL desk.contacts.READ",
    signature_header: "x-desk-webhook-signature",
    event_field: "eventType",
    record_id_field: "ticketId",
    rate_limit_per_minute: 120,
};

const QUOTING_PROFILE: ServiceProfile = ServiceProfile {
    slug: "quoting",
    display_name: "Quoting",
    api_base: "https://api.quotewell.com/v1",
    auth_base: "https://accounts.quotewell.com",
    oauth_scope: "quotes.ALL",
    signature_header: "x-quoting-signature",
    event_field: "event_type",
    record_id_field: "id",
    rate_limit_per_minute: 30,
};

impl ServiceId {
    /// All services, in a stable order.
    pub const ALL: [ServiceId; 6] = [
        ServiceId::Crm,
        ServiceId::Fsm,
        ServiceId::Books,
        ServiceId::People,
        ServiceId::Desk,
        ServiceId::Quoting,
    ];

    /// Stable lowercase identifier.
    pub fn as_str(&self) -> &'static str {
        self.profile().slug
    }

    /// Static integration profile for this service.
    pub fn profile(&self) -> &'static ServiceProfile {
        match self {
            ServiceId::Crm => &CRM_PROFILE,
            ServiceId::Fsm => &FSM_PROFILE,
            ServiceId::Books => &BOOKS_PROFILE,
            ServiceId::People => &PEOPLE_PROFILE,
            ServiceId::Desk => &DESK_PROFILE,
            ServiceId::Quoting => &QUOTING_PROFILE,
        }
    }

    /// OAuth token endpoint under the given auth host.
    pub fn token_endpoint(&self, auth_base: &str) -> String {
        format!("{}/oauth/v2/token", auth_base.trim_end_matches('/'))
    }

    /// OAuth authorization endpoint under the given auth host.
    pub fn authorize_endpoint(&self, auth_base: &str) -> String {
        format!("{}/oauth/v2/auth", auth_base.trim_end_matches('/'))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown service slug.
#[derive(Debug, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct UnknownService(pub String);

impl FromStr for ServiceId {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crm" => Ok(ServiceId::Crm),
            "fsm" => Ok(ServiceId::Fsm),
            "books" => Ok(ServiceId::Books),
            "people" => Ok(ServiceId::People),
            "desk" => Ok(ServiceId::Desk),
            "quoting" => Ok(ServiceId::Quoting),
            other => Err(UnknownService(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_roundtrip() {
        for service in ServiceId::ALL {
            let parsed: ServiceId = service.as_str().parse().expect("slug parses");
            assert_eq!(parsed, service);
        }
    }

    #[test]
    fn test_unknown_slug_rejected() {
        assert!("payroll".parse::<ServiceId>().is_err());
        assert!("CRM".parse::<ServiceId>().is_err());
        assert!("".parse::<ServiceId>().is_err());
    }

    #[test]
    fn test_profiles_are_distinct() {
        let mut slugs: Vec<&str> = ServiceId::ALL.iter().map(|s| s.profile().slug).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), ServiceId::ALL.len());

        let mut headers: Vec<&str> = ServiceId::ALL
            .iter()
            .map(|s| s.profile().signature_header)
            .collect();
        headers.sort();
        headers.dedup();
        assert_eq!(headers.len(), ServiceId::ALL.len());
    }

    #[test]
    fn test_signature_headers_are_lowercase() {
        // Header lookups go through axum's HeaderMap, which stores
        // lowercase names.
        for service in ServiceId::ALL {
            let header = service.profile().signature_header;
            assert_eq!(header, header.to_lowercase());
        }
    }

    #[test]
    fn test_token_endpoint_trims_trailing_slash() {
        let endpoint = ServiceId::Crm.token_endpoint("https://accounts.example.com/");
        assert_eq!(endpoint, "https://accounts.example.com/oauth/v2/token");
    }
}
