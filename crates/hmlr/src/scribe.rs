//! Scribe
//!
//! Fire-and-forget extractor of user-profile updates: constraints,
//! preferences, and identities. Runs in the background on every user
//! message; failures are logged and dropped, never blocking the
//! conversation. The Scribe is the profile document's only writer.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use hmlr_core::profile::{ProfileConstraint, ProfileEntry, ProfileStore};

use crate::llm::{call_llm, extract::parse_lenient, LlmClient, ResponseFormat};

#[derive(Debug, Deserialize)]
struct ScribeResponse {
    #[serde(default)]
    constraints: Vec<ProfileConstraint>,
    #[serde(default)]
    preferences: Vec<ProfileEntry>,
    #[serde(default)]
    identities: Vec<ProfileEntry>,
}

/// Background profile updater
pub struct Scribe {
    profile: ProfileStore,
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl Scribe {
    pub fn new(
        profile: ProfileStore,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            profile,
            llm,
            model: model.into(),
            timeout,
        }
    }

    /// Classify one user message into profile updates and apply them
    ///
    /// Never returns an error; every failure path logs and drops.
    pub async fn observe(&self, user_text: &str) {
        let raw = match call_llm(
            self.llm.as_ref(),
            &self.prompt(user_text),
            &self.model,
            ResponseFormat::JsonObject,
            self.timeout,
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "scribe llm call failed, dropping update");
                return;
            }
        };

        let Some(response) = parse_lenient::<ScribeResponse>(&raw) else {
            warn!("scribe response did not parse, dropping update");
            return;
        };

        if response.constraints.is_empty()
            && response.preferences.is_empty()
            && response.identities.is_empty()
        {
            return;
        }

        let counts = (
            response.constraints.len(),
            response.preferences.len(),
            response.identities.len(),
        );

        let result = self.profile.update(|profile| {
            for constraint in response.constraints {
                profile.upsert_constraint(constraint);
            }
            for preference in response.preferences {
                profile.upsert_preference(preference);
            }
            for identity in response.identities {
                profile.upsert_identity(identity);
            }
        });

        match result {
            Ok(_) => debug!(
                constraints = counts.0,
                preferences = counts.1,
                identities = counts.2,
                "profile updated"
            ),
            Err(e) => warn!(error = %e, "profile write failed, update lost"),
        }
    }

    fn prompt(&self, user_text: &str) -> String {
        format!(
            r#"You maintain a user profile. Classify any lasting statements in this message into profile updates. Only include genuinely durable information about the user; transient task details do not belong in the profile.

MESSAGE:
{user_text}

Categories:
- constraints: hard rules the assistant must respect (diet, allergies, policies). Each has key, type, description, severity.
- preferences: soft likes and dislikes. Each has key, value.
- identities: who the user is (name, role, location). Each has key, value.

Return JSON:
{{"constraints": [{{"key": "diet_vegetarian", "type": "dietary", "description": "User eats no meat or fish", "severity": "high"}}], "preferences": [{{"key": "theme", "value": "dark mode"}}], "identities": []}}

Return empty arrays when nothing applies."#
        )
    }
}
