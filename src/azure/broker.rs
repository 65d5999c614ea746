//! Token broker
//!
//! Picks the credential a request runs with: a token delegated by the signed-in
//! user when the identity broker can produce one, the ambient identity otherwise.

use super::auth::{
    credential_error, parse_token_response, token_endpoint, AmbientSettings, Credential,
    FallbackCredentialSource, DEFAULT_AUTHORITY_HOST, MANAGEMENT_SCOPE,
};
use super::http::ArmHttpClient;
use crate::error::CredentialError;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of delegated (on-behalf-of) user tokens
#[async_trait]
pub trait IdentityBroker: Send + Sync {
    async fn delegated_token(&self, scopes: &[&str]) -> Result<String, CredentialError>;
}

/// A user token that was already exchanged for the management API
pub struct StaticTokenBroker {
    token: String,
}

impl StaticTokenBroker {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdentityBroker for StaticTokenBroker {
    async fn delegated_token(&self, _scopes: &[&str]) -> Result<String, CredentialError> {
        if self.token.trim().is_empty() {
            return Err(CredentialError::NoSession);
        }
        Ok(self.token.clone())
    }
}

/// Confidential client registration used for the on-behalf-of exchange
#[derive(Debug, Clone)]
pub struct AppRegistration {
    pub authority_host: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl AppRegistration {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    pub fn with_authority_host(mut self, authority_host: &str) -> Self {
        self.authority_host = authority_host.to_string();
        self
    }
}

/// Exchanges the user's assertion for a management token (OAuth2 on-behalf-of flow)
pub struct OnBehalfOfBroker {
    http: ArmHttpClient,
    app: Option<AppRegistration>,
    user_assertion: Option<String>,
}

impl OnBehalfOfBroker {
    /// Both the registration and the assertion are optional: a missing piece
    /// makes every request fail with [`CredentialError::NoSession`]
    pub fn new(
        http: &ArmHttpClient,
        app: Option<AppRegistration>,
        user_assertion: Option<String>,
    ) -> Self {
        Self {
            http: http.clone(),
            app,
            user_assertion: user_assertion.filter(|a| !a.trim().is_empty()),
        }
    }
}

#[async_trait]
impl IdentityBroker for OnBehalfOfBroker {
    async fn delegated_token(&self, scopes: &[&str]) -> Result<String, CredentialError> {
        let (Some(app), Some(assertion)) = (&self.app, &self.user_assertion) else {
            return Err(CredentialError::NoSession);
        };

        let url = token_endpoint(&app.authority_host, &app.tenant_id);
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
            ("assertion", assertion.as_str()),
            ("scope", scope.as_str()),
            ("requested_token_use", "on_behalf_of"),
        ];

        let response = self
            .http
            .post_form(&url, &form)
            .await
            .map_err(|e| credential_error(&e, &scope))?;

        Ok(parse_token_response(&response)?.secret().to_string())
    }
}

/// Acquires the credential for one request, falling back to the ambient identity
#[derive(Clone)]
pub struct TokenBroker {
    identity: Arc<dyn IdentityBroker>,
    http: ArmHttpClient,
    ambient: AmbientSettings,
}

impl TokenBroker {
    pub fn new(identity: Arc<dyn IdentityBroker>, http: &ArmHttpClient, ambient: AmbientSettings) -> Self {
        Self {
            identity,
            http: http.clone(),
            ambient,
        }
    }

    /// Never fails: delegation errors are logged and replaced by the ambient identity
    pub async fn acquire_credential(&self) -> Credential {
        match self.identity.delegated_token(&[MANAGEMENT_SCOPE]).await {
            Ok(token) => {
                tracing::debug!("Using delegated credential");
                Credential::delegated(token)
            }
            Err(e) => {
                tracing::warn!(
                    "Delegated token acquisition failed: {}, falling back to ambient credential",
                    e
                );
                Credential::fallback(FallbackCredentialSource::from_settings(
                    &self.http,
                    &self.ambient,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::CredentialKind;

    struct FailingBroker;

    #[async_trait]
    impl IdentityBroker for FailingBroker {
        async fn delegated_token(&self, _scopes: &[&str]) -> Result<String, CredentialError> {
            Err(CredentialError::ConsentRequired(MANAGEMENT_SCOPE.to_string()))
        }
    }

    struct ScopeCheckingBroker;

    #[async_trait]
    impl IdentityBroker for ScopeCheckingBroker {
        async fn delegated_token(&self, scopes: &[&str]) -> Result<String, CredentialError> {
            assert_eq!(scopes, &[MANAGEMENT_SCOPE]);
            Ok("delegated".to_string())
        }
    }

    fn settings() -> AmbientSettings {
        AmbientSettings {
            managed_identity: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_delegated_credential_preferred() {
        let http = ArmHttpClient::new().unwrap();
        let broker = TokenBroker::new(Arc::new(ScopeCheckingBroker), &http, settings());
        let credential = broker.acquire_credential().await;
        assert_eq!(credential.kind(), CredentialKind::Delegated);
        assert_eq!(credential.token().await.unwrap().secret(), "delegated");
    }

    #[tokio::test]
    async fn test_fallback_on_delegation_failure() {
        let http = ArmHttpClient::new().unwrap();
        let broker = TokenBroker::new(Arc::new(FailingBroker), &http, settings());
        let credential = broker.acquire_credential().await;
        assert_eq!(credential.kind(), CredentialKind::Fallback);
    }

    #[tokio::test]
    async fn test_static_broker_rejects_blank_token() {
        let broker = StaticTokenBroker::new("  ");
        assert!(matches!(
            broker.delegated_token(&[MANAGEMENT_SCOPE]).await,
            Err(CredentialError::NoSession)
        ));
        let broker = StaticTokenBroker::new("abc");
        assert_eq!(broker.delegated_token(&[MANAGEMENT_SCOPE]).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_obo_without_session() {
        let http = ArmHttpClient::new().unwrap();
        let app = AppRegistration::new("contoso.onmicrosoft.com", "client", "secret");
        let broker = OnBehalfOfBroker::new(&http, Some(app), None);
        assert!(matches!(
            broker.delegated_token(&[MANAGEMENT_SCOPE]).await,
            Err(CredentialError::NoSession)
        ));

        let broker = OnBehalfOfBroker::new(&http, None, Some("assertion".into()));
        assert!(matches!(
            broker.delegated_token(&[MANAGEMENT_SCOPE]).await,
            Err(CredentialError::NoSession)
        ));
    }
}
