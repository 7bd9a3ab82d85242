//! Access-point providers and the credential shape each one expects.

use serde::{Deserialize, Serialize};

use taxlink_core::{Entity, ProviderId, TenantId};

/// Which credential fields a provider needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialShape {
    /// `{participant_id, api_key}`
    ParticipantKey,
    /// `{api_key, api_secret}`
    ApiKeySecret,
}

impl CredentialShape {
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            CredentialShape::ParticipantKey => &["participant_id", "api_key"],
            CredentialShape::ApiKeySecret => &["api_key", "api_secret"],
        }
    }
}

/// Provider code as known to the platform. Unknown codes use the default
/// key/secret shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderCode {
    Etranzact,
    Other(String),
}

impl ProviderCode {
    pub fn parse(code: &str) -> Self {
        if code.trim().eq_ignore_ascii_case("etranzact") {
            ProviderCode::Etranzact
        } else {
            ProviderCode::Other(code.trim().to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderCode::Etranzact => "etranzact",
            ProviderCode::Other(code) => code,
        }
    }

    pub fn credential_shape(&self) -> CredentialShape {
        match self {
            ProviderCode::Etranzact => CredentialShape::ParticipantKey,
            ProviderCode::Other(_) => CredentialShape::ApiKeySecret,
        }
    }
}

impl From<String> for ProviderCode {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<ProviderCode> for String {
    fn from(code: ProviderCode) -> Self {
        code.as_str().to_string()
    }
}

impl core::fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider that relays signed invoices to FIRS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointProvider {
    pub id: ProviderId,
    pub tenant_id: TenantId,
    pub code: ProviderCode,
    pub name: String,
    pub is_active: bool,
    pub has_credentials: bool,
}

impl AccessPointProvider {
    pub fn new(tenant_id: TenantId, code: ProviderCode, name: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(),
            tenant_id,
            code,
            name: name.into(),
            is_active: false,
            has_credentials: false,
        }
    }
}

impl Entity for AccessPointProvider {
    type Id = ProviderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_selects_the_credential_shape() {
        assert_eq!(
            ProviderCode::parse("ETRANZACT").credential_shape(),
            CredentialShape::ParticipantKey
        );
        assert_eq!(
            ProviderCode::parse("interswitch").credential_shape(),
            CredentialShape::ApiKeySecret
        );
        assert_eq!(ProviderCode::parse(" Etranzact "), ProviderCode::Etranzact);
    }
}
