//! Authentication options for simulated sessions.
//!
//! Resolving actual credential material (tokens, certificates) belongs to the
//! session implementation. This module only decides which mechanism a session
//! uses and which workload identity it presents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Trust domain used when none is configured.
pub const DEFAULT_TRUST_DOMAIN: &str = "cluster.local";

/// Authentication mechanism used by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// No transport security.
    Plaintext,
    /// Mutual TLS with workload certificates.
    Mtls,
    /// TLS with a projected service account token.
    Jwt,
    /// Google managed control plane credentials.
    Google,
}

impl AuthType {
    /// All supported values, for help text.
    pub const ALL: [Self; 4] = [Self::Plaintext, Self::Mtls, Self::Jwt, Self::Google];

    /// Pick the mechanism implied by a control-plane address.
    ///
    /// Port 15010 is the plaintext xDS port, port 443 and `googleapis.com`
    /// hosts are managed control planes, everything else expects tokens.
    #[must_use]
    pub fn for_address(address: &str) -> Self {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (address, None),
        };

        if port == Some("15010") {
            Self::Plaintext
        } else if port == Some("443") || host.ends_with("googleapis.com") {
            Self::Google
        } else {
            Self::Jwt
        }
    }

    /// The lowercase name accepted on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::Mtls => "mtls",
            Self::Jwt => "jwt",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SessionError::Config(format!(
                    "unknown auth type {s:?}, expected one of: plaintext, mtls, jwt, google"
                ))
            })
    }
}

/// Cluster-wide authentication settings shared by all sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOptions {
    /// Mechanism to use.
    pub auth_type: AuthType,
    /// SPIFFE trust domain.
    #[serde(default = "AuthOptions::default_trust_domain")]
    pub trust_domain: String,
    /// Project number, required for google auth.
    #[serde(default)]
    pub project_number: String,
    /// Cluster URL, required for google auth.
    #[serde(default)]
    pub cluster_url: String,
}

impl AuthOptions {
    fn default_trust_domain() -> String {
        DEFAULT_TRUST_DOMAIN.to_string()
    }

    /// Options for the given mechanism with default trust domain.
    #[must_use]
    pub fn new(auth_type: AuthType) -> Self {
        Self {
            auth_type,
            trust_domain: Self::default_trust_domain(),
            project_number: String::new(),
            cluster_url: String::new(),
        }
    }

    /// Options derived from the control-plane address.
    #[must_use]
    pub fn for_address(address: &str) -> Self {
        Self::new(AuthType::for_address(address))
    }

    /// Check that every field the mechanism needs is present.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if google auth is missing its project
    /// number or cluster URL, or if the trust domain is empty.
    pub fn validate(&self) -> Result<()> {
        if self.trust_domain.is_empty() {
            return Err(SessionError::Config("trust domain must not be empty".into()));
        }
        if self.auth_type == AuthType::Google {
            if self.project_number.is_empty() {
                return Err(SessionError::Config(
                    "google auth requires a project number".into(),
                ));
            }
            if self.cluster_url.is_empty() {
                return Err(SessionError::Config("google auth requires a cluster URL".into()));
            }
        }
        Ok(())
    }

    /// Credentials a workload presents to the control plane.
    #[must_use]
    pub fn credentials_for(&self, service_account: &str, namespace: &str) -> SessionCredentials {
        let service_account = if service_account.is_empty() {
            "default"
        } else {
            service_account
        };

        SessionCredentials {
            auth_type: self.auth_type,
            service_account: service_account.to_string(),
            namespace: namespace.to_string(),
            trust_domain: self.trust_domain.clone(),
        }
    }
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self::new(AuthType::Plaintext)
    }
}

/// Per-workload authentication parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    /// Mechanism to use.
    pub auth_type: AuthType,
    /// Service account the workload runs as.
    pub service_account: String,
    /// Namespace of the service account.
    pub namespace: String,
    /// SPIFFE trust domain.
    pub trust_domain: String,
}

impl SessionCredentials {
    /// The SPIFFE identity of the workload.
    #[must_use]
    pub fn spiffe_id(&self) -> String {
        format!(
            "spiffe://{}/ns/{}/sa/{}",
            self.trust_domain, self.namespace, self.service_account
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_type_for_address() {
        assert_eq!(AuthType::for_address("localhost:15010"), AuthType::Plaintext);
        assert_eq!(
            AuthType::for_address("istiod.istio-system.svc:15010"),
            AuthType::Plaintext
        );
        assert_eq!(
            AuthType::for_address("istiod.istio-system.svc:15012"),
            AuthType::Jwt
        );
        assert_eq!(AuthType::for_address("meshconfig.example.com:443"), AuthType::Google);
        assert_eq!(
            AuthType::for_address("meshconfig.googleapis.com"),
            AuthType::Google
        );
        assert_eq!(AuthType::for_address("istiod"), AuthType::Jwt);
    }

    #[test]
    fn auth_type_parse() {
        assert_eq!("mtls".parse::<AuthType>().unwrap(), AuthType::Mtls);
        assert_eq!("JWT".parse::<AuthType>().unwrap(), AuthType::Jwt);
        assert!(matches!(
            "kerberos".parse::<AuthType>(),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn google_requires_project_and_cluster() {
        let mut opts = AuthOptions::new(AuthType::Google);
        assert!(opts.validate().is_err());

        opts.project_number = "123456".into();
        assert!(opts.validate().is_err());

        opts.cluster_url = "https://container.googleapis.com/v1/projects/p/locations/l/clusters/c".into();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn empty_trust_domain_is_rejected() {
        let mut opts = AuthOptions::default();
        opts.trust_domain.clear();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn credentials_and_spiffe_id() {
        let opts = AuthOptions::new(AuthType::Jwt);

        let creds = opts.credentials_for("reviews", "bookinfo");
        assert_eq!(creds.auth_type, AuthType::Jwt);
        assert_eq!(
            creds.spiffe_id(),
            "spiffe://cluster.local/ns/bookinfo/sa/reviews"
        );

        let creds = opts.credentials_for("", "bookinfo");
        assert_eq!(creds.service_account, "default");
    }
}
