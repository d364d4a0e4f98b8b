//! Registry lookup and result classification for a single candidate.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use ureq::Agent;

use crate::generate::Candidate;

/// Profile lookup endpoint; the candidate name is appended as the last path segment.
pub const DEFAULT_API_BASE: &str = "https://api.mojang.com/users/profiles/minecraft";

/// Human-browsable profile page; the registry id is appended as the last path segment.
pub const PROFILE_URL_BASE: &str = "https://namemc.com/profile";

/// Per-request timeout used by [`Client::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The classified registry answer for one candidate.
///
/// `Display` renders the line written to the results log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum Outcome {
    /// The registry has no profile under this name.
    Available(Candidate),
    /// The name belongs to an existing profile.
    Taken {
        /// The name that was looked up.
        candidate: Candidate,
        /// Opaque profile id returned by the registry.
        id: String,
        /// Profile page derived from `id`.
        profile_url: String,
    },
    /// The registry answered with a status that is neither "found" nor "not found".
    LookupFailed {
        /// The name that was looked up.
        candidate: Candidate,
        /// HTTP status code of the response.
        status: u16,
    },
}

impl Outcome {
    /// The candidate this outcome is about.
    #[must_use]
    pub fn candidate(&self) -> &Candidate {
        match self {
            Self::Available(candidate)
            | Self::Taken { candidate, .. }
            | Self::LookupFailed { candidate, .. } => candidate,
        }
    }

    /// Whether the name is free to register.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(candidate) => write!(f, "✅ {candidate} 可用！"),
            Self::Taken {
                candidate,
                id,
                profile_url,
            } => write!(
                f,
                "❌ {candidate} 已被注册，UUID: {id}, NameMC 页面: {profile_url}"
            ),
            Self::LookupFailed { candidate, status } => {
                write!(f, "❌ {candidate} 查询失败，状态码: {status}")
            }
        }
    }
}

/// A lookup that produced no classifiable answer.
///
/// Carries the candidate so that a batch of results stays self-describing.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LookupError {
    /// Connection, timeout, or body read failure.
    #[error("{candidate}: request failed: {source}")]
    Transport {
        /// The name whose lookup failed.
        candidate: Candidate,
        /// Underlying HTTP client error.
        #[source]
        source: Box<ureq::Error>,
    },
    /// The registry answered 200 with a body that is not a profile.
    #[error("{candidate}: malformed profile body: {source}")]
    Decode {
        /// The name whose lookup failed.
        candidate: Candidate,
        /// JSON decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// The lookup panicked instead of returning.
    #[error("{candidate}: lookup panicked: {message}")]
    Internal {
        /// The name whose lookup failed.
        candidate: Candidate,
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl LookupError {
    /// The candidate whose lookup failed.
    #[must_use]
    pub fn candidate(&self) -> &Candidate {
        match self {
            Self::Transport { candidate, .. }
            | Self::Decode { candidate, .. }
            | Self::Internal { candidate, .. } => candidate,
        }
    }
}

/// Anything that can classify a single candidate.
///
/// [`Client`] is the HTTP implementation; the dispatcher only depends on this
/// trait, so tests can drive it with an in-memory registry.
pub trait Lookup {
    /// Issue exactly one lookup for `candidate`.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when no registry answer could be classified.
    fn check(&self, candidate: &Candidate) -> Result<Outcome, LookupError>;
}

impl<L: Lookup + ?Sized> Lookup for &L {
    fn check(&self, candidate: &Candidate) -> Result<Outcome, LookupError> {
        (**self).check(candidate)
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

/// An HTTP client configured for registry profile lookups.
///
/// Holds one connection pool; clones share it.
///
/// # Example
///
/// ```no_run
/// use mc_avail::check::{Client, Lookup};
/// use mc_avail::generate::Candidate;
///
/// let client = Client::new();
/// match client.check(&Candidate::from("notch")) {
///     Ok(outcome) => println!("{outcome}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    agent: Agent,
    api_base: String,
}

impl Client {
    /// Create a client for the public registry with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_API_BASE, DEFAULT_TIMEOUT)
    }

    /// Create a client for an arbitrary lookup base URL and per-request timeout.
    #[must_use]
    pub fn with_settings(api_base: impl Into<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                " (",
                env!("CARGO_PKG_REPOSITORY"),
                ")"
            ))
            .build();
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            agent: Agent::new_with_config(config),
            api_base,
        }
    }

    /// The lookup base URL this client queries.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Lookup for Client {
    fn check(&self, candidate: &Candidate) -> Result<Outcome, LookupError> {
        let url = format!("{}/{candidate}", self.api_base);
        debug!(%url, "looking up candidate");

        // Non-2xx statuses come back as `Error::StatusCode`.
        let mut response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => return Ok(Outcome::Available(candidate.clone())),
            Err(ureq::Error::StatusCode(status)) => {
                return Ok(Outcome::LookupFailed {
                    candidate: candidate.clone(),
                    status,
                });
            }
            Err(e) => {
                return Err(LookupError::Transport {
                    candidate: candidate.clone(),
                    source: Box::new(e),
                });
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(Outcome::LookupFailed {
                candidate: candidate.clone(),
                status,
            });
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| LookupError::Transport {
                candidate: candidate.clone(),
                source: Box::new(e),
            })?;
        let profile: Profile =
            serde_json::from_str(&body).map_err(|source| LookupError::Decode {
                candidate: candidate.clone(),
                source,
            })?;

        Ok(taken(candidate.clone(), profile.id))
    }
}

/// Build a [`Outcome::Taken`] with the profile page derived from `id`.
pub fn taken(candidate: Candidate, id: String) -> Outcome {
    let profile_url = profile_url(&id);
    Outcome::Taken {
        candidate,
        id,
        profile_url,
    }
}

/// Profile page for a registry id.
///
/// ```
/// use mc_avail::check::profile_url;
/// assert_eq!(profile_url("abc-123"), "https://namemc.com/profile/abc-123");
/// ```
#[must_use]
pub fn profile_url(id: &str) -> String {
    format!("{PROFILE_URL_BASE}/{id}")
}
