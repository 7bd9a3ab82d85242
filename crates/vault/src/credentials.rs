//! Credential payloads, shape validation and masking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use taxlink_core::{ProviderId, ValidationError};

use crate::provider::CredentialShape;

/// Characters left visible at the end of a masked secret.
pub const VISIBLE_SUFFIX: usize = 4;

/// Credentials in the shape a provider expects.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum ProviderCredentials {
    ParticipantKey {
        participant_id: String,
        api_key: String,
    },
    ApiKeySecret {
        api_key: String,
        api_secret: String,
    },
}

impl ProviderCredentials {
    /// Build credentials for `shape` from submitted form fields.
    ///
    /// Errors are keyed `credentials.<field>`.
    pub fn from_fields(
        shape: CredentialShape,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let mut errors = ValidationError::new();
        let value = |name: &str, errors: &mut ValidationError| -> String {
            let v = fields.get(name).map(|s| s.trim()).unwrap_or_default();
            if v.is_empty() {
                errors.add(format!("credentials.{name}"), format!("{name} is required"));
            }
            v.to_string()
        };

        let credentials = match shape {
            CredentialShape::ParticipantKey => ProviderCredentials::ParticipantKey {
                participant_id: value("participant_id", &mut errors),
                api_key: value("api_key", &mut errors),
            },
            CredentialShape::ApiKeySecret => ProviderCredentials::ApiKeySecret {
                api_key: value("api_key", &mut errors),
                api_secret: value("api_secret", &mut errors),
            },
        };

        for name in fields.keys() {
            if !shape.fields().contains(&name.as_str()) {
                errors.add(
                    format!("credentials.{name}"),
                    "field is not used by this provider",
                );
            }
        }

        errors.into_result()?;
        Ok(credentials)
    }

    pub fn shape(&self) -> CredentialShape {
        match self {
            ProviderCredentials::ParticipantKey { .. } => CredentialShape::ParticipantKey,
            ProviderCredentials::ApiKeySecret { .. } => CredentialShape::ApiKeySecret,
        }
    }

    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let pairs: [(&str, &str); 2] = match self {
            ProviderCredentials::ParticipantKey {
                participant_id,
                api_key,
            } => [
                ("participant_id", participant_id.as_str()),
                ("api_key", api_key.as_str()),
            ],
            ProviderCredentials::ApiKeySecret {
                api_key,
                api_secret,
            } => [("api_key", api_key.as_str()), ("api_secret", api_secret.as_str())],
        };
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl core::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("ProviderCredentials");
        for (name, value) in self.to_fields() {
            s.field(&name, &mask(&value));
        }
        s.finish()
    }
}

/// Mask all but the last [`VISIBLE_SUFFIX`] characters. Short values are
/// masked completely.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= VISIBLE_SUFFIX {
        return "*".repeat(chars.len());
    }
    let hidden = chars.len() - VISIBLE_SUFFIX;
    let mut masked = "*".repeat(hidden);
    masked.extend(&chars[hidden..]);
    masked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialView {
    Masked,
    /// Audited; needs the reveal permission.
    Unmasked,
}

/// Credentials of the active provider as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRead {
    pub provider_id: ProviderId,
    pub view: CredentialView,
    pub fields: BTreeMap<String, String>,
    /// The unmasked read failed; `fields` are blank rather than stale.
    pub unavailable: bool,
}
