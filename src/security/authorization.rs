//! Request authorization policy.
//!
//! # Responsibilities
//! - Evaluate origin, htpasswd and inline-credential checks
//! - Compose the checks with `all` / `any` / `none`
//!
//! # Design Decisions
//! - Built once from configuration, immutable afterwards
//! - An unconfigured check passes vacuously
//! - Unknown `valid_on` values fail at setup, never per request

use std::collections::HashMap;
use std::str::FromStr;

use crate::config::AuthorizationConfig;
use crate::message::Message;
use crate::security::htpasswd::HtpasswdFile;
use crate::security::origins::OriginAllowList;
use crate::security::AuthorizationError;

/// How individual checks combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidOn {
    /// Every check must pass.
    #[default]
    All,
    /// At least one check must pass.
    Any,
    /// Policy present but disabled.
    None,
}

impl FromStr for ValidOn {
    type Err = AuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(':').to_ascii_lowercase().as_str() {
            "all" => Ok(ValidOn::All),
            "any" => Ok(ValidOn::Any),
            "none" => Ok(ValidOn::None),
            _ => Err(AuthorizationError::UnknownValidOn(s.to_string())),
        }
    }
}

/// Declarative gate built from an `authorization` config block.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    valid_on: ValidOn,
    origins: Option<OriginAllowList>,
    htpasswd: Option<HtpasswdFile>,
    credentials: Option<HashMap<String, String>>,
}

impl AuthorizationPolicy {
    pub fn from_config(config: &AuthorizationConfig) -> Result<Self, AuthorizationError> {
        let valid_on = match &config.valid_on {
            Some(value) => value.parse()?,
            None => ValidOn::All,
        };
        let origins = if config.allowed_origins.is_empty() {
            None
        } else {
            Some(OriginAllowList::parse(&config.allowed_origins)?)
        };
        let htpasswd = config
            .htpasswd
            .as_deref()
            .map(HtpasswdFile::open)
            .transpose()?;

        Ok(Self {
            valid_on,
            origins,
            htpasswd,
            credentials: config.credentials.clone(),
        })
    }

    pub fn new(valid_on: ValidOn) -> Self {
        Self {
            valid_on,
            origins: None,
            htpasswd: None,
            credentials: None,
        }
    }

    pub fn with_origins(mut self, origins: OriginAllowList) -> Self {
        self.origins = Some(origins);
        self
    }

    pub fn with_htpasswd(mut self, htpasswd: HtpasswdFile) -> Self {
        self.htpasswd = Some(htpasswd);
        self
    }

    pub fn with_credentials(mut self, credentials: HashMap<String, String>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn valid_on(&self) -> ValidOn {
        self.valid_on
    }

    pub fn authorize(&self, message: &Message) -> bool {
        match self.valid_on {
            ValidOn::None => true,
            ValidOn::All => {
                self.origin_allowed(message)
                    && self.htpasswd_allowed(message)
                    && self.credentials_allowed(message)
            }
            ValidOn::Any => {
                self.origin_allowed(message)
                    || self.htpasswd_allowed(message)
                    || self.credentials_allowed(message)
            }
        }
    }

    fn origin_allowed(&self, message: &Message) -> bool {
        match &self.origins {
            None => true,
            Some(list) => message.origin().map(|addr| list.contains(addr)).unwrap_or(false),
        }
    }

    fn htpasswd_allowed(&self, message: &Message) -> bool {
        let Some(file) = &self.htpasswd else {
            return true;
        };
        let auth = message.authentication();
        match (&auth.username, &auth.password) {
            (Some(user), Some(pass)) => file.authenticate(user, pass),
            _ => false,
        }
    }

    fn credentials_allowed(&self, message: &Message) -> bool {
        let Some(credentials) = &self.credentials else {
            return true;
        };
        let auth = message.authentication();
        match (&auth.username, &auth.password) {
            (Some(user), Some(pass)) => credentials.get(user) == Some(pass),
            _ => false,
        }
    }
}

/// Authorization gate for one source. No policy means every message passes.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    policy: Option<AuthorizationPolicy>,
}

impl Authorizer {
    pub fn new(policy: Option<AuthorizationPolicy>) -> Self {
        Self { policy }
    }

    pub fn from_config(config: Option<&AuthorizationConfig>) -> Result<Self, AuthorizationError> {
        let policy = config.map(AuthorizationPolicy::from_config).transpose()?;
        Ok(Self { policy })
    }

    pub fn authorize(&self, message: &Message) -> bool {
        let allowed = self
            .policy
            .as_ref()
            .map(|policy| policy.authorize(message))
            .unwrap_or(true);
        if !allowed {
            tracing::debug!(
                message_id = %message.id(),
                origin = ?message.origin(),
                "Message not authorized"
            );
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Authentication;
    use axum::http::Method;

    fn from(origin: &str) -> Message {
        Message::new(Method::GET, "/").with_origin(origin.parse().unwrap())
    }

    fn creds(user: &str, pass: &str) -> HashMap<String, String> {
        HashMap::from([(user.to_string(), pass.to_string())])
    }

    #[test]
    fn no_policy_allows_everything() {
        assert!(Authorizer::default().authorize(&from("8.8.8.8")));
    }

    #[test]
    fn all_with_origin_only() {
        let policy = AuthorizationPolicy::new(ValidOn::All)
            .with_origins(OriginAllowList::parse(&["10.0.0.0/8"]).unwrap());
        assert!(policy.authorize(&from("10.1.2.3")));
        assert!(!policy.authorize(&from("8.8.8.8")));
        assert!(!policy.authorize(&Message::new(Method::GET, "/")));
    }

    #[test]
    fn all_requires_every_check() {
        let policy = AuthorizationPolicy::new(ValidOn::All)
            .with_origins(OriginAllowList::parse(&["127.0.0.1"]).unwrap())
            .with_credentials(creds("user1", "password1"));

        let good = from("127.0.0.1").with_authentication(Authentication::basic("user1", "password1"));
        let bad_pass = from("127.0.0.1").with_authentication(Authentication::basic("user1", "nope"));
        let bad_origin = from("10.0.0.1").with_authentication(Authentication::basic("user1", "password1"));
        assert!(policy.authorize(&good));
        assert!(!policy.authorize(&bad_pass));
        assert!(!policy.authorize(&bad_origin));
    }

    #[test]
    fn any_needs_one_passing_check() {
        // Unconfigured htpasswd passes vacuously, so configure all three.
        let htpasswd = {
            let mut tmp = tempfile::NamedTempFile::new().unwrap();
            std::io::Write::write_all(&mut tmp, b"fileuser:filepass\n").unwrap();
            HtpasswdFile::open(tmp.path()).unwrap()
        };
        let policy = AuthorizationPolicy::new(ValidOn::Any)
            .with_origins(OriginAllowList::parse(&["192.168.6.0/24"]).unwrap())
            .with_htpasswd(htpasswd)
            .with_credentials(creds("user1", "password1"));

        assert!(policy.authorize(&from("192.168.6.9")));
        assert!(policy.authorize(
            &from("8.8.8.8").with_authentication(Authentication::basic("fileuser", "filepass"))
        ));
        assert!(policy.authorize(
            &from("8.8.8.8").with_authentication(Authentication::basic("user1", "password1"))
        ));
        assert!(!policy.authorize(
            &from("8.8.8.8").with_authentication(Authentication::basic("user1", "wrong"))
        ));
        assert!(!policy.authorize(&from("8.8.8.8")));
    }

    #[test]
    fn any_is_vacuously_true_with_unconfigured_checks() {
        let policy = AuthorizationPolicy::new(ValidOn::Any)
            .with_origins(OriginAllowList::parse(&["10.0.0.0/8"]).unwrap());
        assert!(policy.authorize(&from("8.8.8.8")));
    }

    #[test]
    fn none_always_allows() {
        let policy = AuthorizationPolicy::new(ValidOn::None)
            .with_origins(OriginAllowList::parse(&["10.0.0.0/8"]).unwrap());
        assert!(policy.authorize(&from("8.8.8.8")));
    }

    #[test]
    fn missing_credentials_fail_inline_check() {
        let policy = AuthorizationPolicy::new(ValidOn::All).with_credentials(creds("user1", "password1"));
        assert!(!policy.authorize(&from("127.0.0.1")));
    }

    #[test]
    fn valid_on_parsing() {
        assert_eq!("ALL".parse::<ValidOn>().unwrap(), ValidOn::All);
        assert_eq!(":any".parse::<ValidOn>().unwrap(), ValidOn::Any);
        assert_eq!("none".parse::<ValidOn>().unwrap(), ValidOn::None);
        assert!(matches!(
            "most".parse::<ValidOn>(),
            Err(AuthorizationError::UnknownValidOn(v)) if v == "most"
        ));
    }

    #[test]
    fn from_config_rejects_unknown_valid_on() {
        let config = AuthorizationConfig {
            valid_on: Some("sometimes".into()),
            ..Default::default()
        };
        assert!(AuthorizationPolicy::from_config(&config).is_err());
        assert!(Authorizer::from_config(Some(&config)).is_err());
    }
}
