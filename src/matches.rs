//! Match list and detail controller.
//!
//! The panel is never empty: a transport failure or an empty result
//! substitutes a fixed local fallback list. That is a graceful-degradation
//! policy, not an error state — the cards render and behave identically.

use once_cell::sync::Lazy;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::protocol::{Match, Persona};

/// Built-in simulated matches used whenever the server has none to offer.
pub static FALLBACK_MATCHES: Lazy<Vec<Match>> = Lazy::new(|| {
    [
        ("Alex Chen", 92.0, "Shared interest in AI and startups"),
        ("Jordan Taylor", 88.0, "Both love hiking and outdoor activities"),
        ("Sam Rivera", 85.0, "Tech and gaming in common"),
        ("Morgan Lee", 81.0, "Similar communication style and values"),
        ("Casey Kim", 78.0, "Creative and design interests align"),
    ]
    .iter()
    .map(|(name, score, reason)| Match {
        user_a: name.to_string(),
        user_b: "You".to_string(),
        score: *score,
        reason: reason.to_string(),
    })
    .collect()
});

/// Apply the fallback policy to a fetch result.
pub fn effective_matches(result: Result<Vec<Match>, ApiError>) -> Vec<Match> {
    match result {
        Ok(matches) if !matches.is_empty() => matches,
        Ok(_) => FALLBACK_MATCHES.clone(),
        Err(e) => {
            tracing::debug!(error = %e, "match fetch failed, using local fallback");
            FALLBACK_MATCHES.clone()
        }
    }
}

/// Case-insensitive exact name lookup used by the detail panel's profile
/// action.
pub fn find_by_name<'a>(personas: &'a [Persona], name: &str) -> Option<&'a Persona> {
    personas
        .iter()
        .find(|p| p.name.to_lowercase() == name.to_lowercase())
}

/// Outcome of a profile lookup from the detail panel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLookup {
    Found(Persona),
    /// No persona record exists; the match's stored reason is the fallback
    /// context shown in a blocking alert.
    Missing { name: String, reason: String },
}

/// Ranked matches plus the detail-view actions hanging off a selection.
pub struct MatchPanel {
    api: ApiClient,
    matches: Vec<Match>,
}

impl MatchPanel {
    pub fn new(api: ApiClient) -> Self {
        MatchPanel {
            api,
            matches: Vec::new(),
        }
    }

    /// Refetch the ranked list, falling back when the server has nothing.
    /// Any previously selected positional index is stale after this call.
    pub async fn load(&mut self) -> &[Match] {
        self.matches = effective_matches(self.api.matches().await);
        &self.matches
    }

    pub fn list(&self) -> &[Match] {
        &self.matches
    }

    pub fn get(&self, index: usize) -> Option<&Match> {
        self.matches.get(index)
    }

    /// Look up the full persona behind the match at `index`.
    pub async fn lookup_profile(&self, index: usize) -> Result<ProfileLookup, ApiError> {
        let m = match self.get(index) {
            Some(m) => m.clone(),
            None => {
                return Ok(ProfileLookup::Missing {
                    name: String::new(),
                    reason: String::new(),
                })
            }
        };
        let personas = self.api.personas().await?;
        Ok(match find_by_name(&personas, &m.user_a) {
            Some(p) => ProfileLookup::Found(p.clone()),
            None => ProfileLookup::Missing {
                name: m.user_a,
                reason: m.reason,
            },
        })
    }

    /// Post a connection request to the match at `index`; returns the
    /// recipient's name for the confirmation alert.
    pub async fn send_connection_request(&self, index: usize) -> Result<String, ApiError> {
        let m = self
            .get(index)
            .ok_or_else(|| ApiError::Status("match no longer listed".to_string()))?;
        self.api.send_connection_request(&m.user_a).await?;
        Ok(m.user_a.clone())
    }
}
