//! Route table: exposed paths to versioned backend paths
//!
//! Each service group owns a fixed exact-match table. A path without a rule
//! is forwarded unchanged.

use std::collections::HashMap;
use std::fmt;

/// Backend service a route group forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    User,
    Payment,
}

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::User => "user",
            ServiceId::Payment => "payment",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match rewrite of one exposed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub exposed: &'static str,
    pub backend: &'static str,
}

const USER_RULES: &[RouteRule] = &[
    RouteRule {
        exposed: "/user",
        backend: "/api/v1/user",
    },
    RouteRule {
        exposed: "/user/login",
        backend: "/api/v1/user/login",
    },
];

const PAYMENT_RULES: &[RouteRule] = &[
    RouteRule {
        exposed: "/payments/deposit",
        backend: "/api/v1/payments/deposit",
    },
    RouteRule {
        exposed: "/payments/withdraw",
        backend: "/api/v1/payments/withdraw",
    },
    RouteRule {
        exposed: "/payments/transfer",
        backend: "/api/v1/payments/transfer",
    },
    RouteRule {
        exposed: "/payments/confirm",
        backend: "/api/v1/payments/confirm",
    },
    RouteRule {
        exposed: "/payments/cancel",
        backend: "/api/v1/payments/cancel",
    },
];

/// Rules for one service, keyed by exposed path
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: HashMap<&'static str, &'static str>,
}

impl RouteTable {
    /// Table for a service's hardcoded rules
    pub fn for_service(service: ServiceId) -> Self {
        Self {
            rules: rules_for(service)
                .iter()
                .map(|r| (r.exposed, r.backend))
                .collect(),
        }
    }

    /// Backend path for an exact match, `None` otherwise
    pub fn rewrite(&self, path: &str) -> Option<&'static str> {
        self.rules.get(path).copied()
    }

    /// Outbound path: the rewrite, or the path itself when no rule matches
    pub fn resolve<'a>(&self, path: &'a str) -> &'a str {
        match self.rewrite(path) {
            Some(backend) => backend,
            None => path,
        }
    }
}

fn rules_for(service: ServiceId) -> &'static [RouteRule] {
    match service {
        ServiceId::User => USER_RULES,
        ServiceId::Payment => PAYMENT_RULES,
    }
}
