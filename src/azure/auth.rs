//! Azure Authentication
//!
//! Credentials used to authenticate management API calls. A request runs with
//! exactly one of:
//!
//! - [`DelegatedCredentialSource`] - a token obtained on behalf of the signed-in user
//! - [`FallbackCredentialSource`] - the ambient identity (environment service
//!   principal, managed identity, or Azure CLI login)

use super::http::{api_error, ArmHttpClient};
use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scope granting management API impersonation of the signed-in user
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/user_impersonation";

/// Scope used by service identities for the management API
pub const MANAGEMENT_DEFAULT_SCOPE: &str = "https://management.azure.com/.default";

/// Resource identifier used by managed identity and the Azure CLI
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// Default Entra ID authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Instance metadata service token endpoint
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Validity assumed for a delegated token handed over by the identity broker
pub const DELEGATED_TOKEN_VALIDITY: Duration = Duration::hours(1);

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::seconds(60);

/// TTL used when a token response carries no expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(30);

/// Upper bound for `az account get-access-token`; the CLI may block on a prompt
const CLI_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// IMDS is only reachable on Azure hosts; give up quickly elsewhere
const IMDS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Still usable, with the refresh buffer applied
    pub fn is_valid(&self) -> bool {
        Utc::now() + TOKEN_EXPIRY_BUFFER < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Which identity a credential acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Delegated,
    Fallback,
}

/// Something able to produce bearer tokens for the management API
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn token(&self) -> Result<AccessToken, CredentialError>;

    fn kind(&self) -> CredentialKind;
}

/// A token obtained on behalf of the signed-in user
pub struct DelegatedCredentialSource {
    token: AccessToken,
}

impl DelegatedCredentialSource {
    /// Wrap a raw delegated token with the fixed validity window
    pub fn new(raw_token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(raw_token, Utc::now() + DELEGATED_TOKEN_VALIDITY),
        }
    }
}

#[async_trait]
impl CredentialSource for DelegatedCredentialSource {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        Ok(self.token.clone())
    }

    fn kind(&self) -> CredentialKind {
        CredentialKind::Delegated
    }
}

/// One way of obtaining a token for the ambient identity
#[async_trait]
pub trait AmbientTokenProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn token(&self) -> Result<AccessToken, CredentialError>;
}

/// Ambient identity: tries each provider in order, caches the first token obtained
pub struct FallbackCredentialSource {
    providers: Vec<Arc<dyn AmbientTokenProvider>>,
    token_cache: RwLock<Option<AccessToken>>,
}

impl FallbackCredentialSource {
    pub fn new(providers: Vec<Arc<dyn AmbientTokenProvider>>) -> Self {
        Self {
            providers,
            token_cache: RwLock::new(None),
        }
    }

    /// Build the provider chain from settings and the process environment.
    /// Performs no network I/O.
    pub fn from_settings(http: &ArmHttpClient, settings: &AmbientSettings) -> Self {
        let mut providers: Vec<Arc<dyn AmbientTokenProvider>> = Vec::new();

        if let Some(env) = EnvironmentCredential::from_env(http, &settings.authority_host) {
            providers.push(Arc::new(env));
        }
        if settings.managed_identity {
            providers.push(Arc::new(ManagedIdentityCredential::from_env(
                http,
                &settings.imds_endpoint,
            )));
        }
        providers.push(Arc::new(AzureCliCredential::new(settings.tenant_id.clone())));

        Self::new(providers)
    }

    /// Names of the configured providers, in the order they are tried
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl CredentialSource for FallbackCredentialSource {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        // Check cache first - but only return if token is still valid
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.clone());
                }
                tracing::debug!("Cached ambient token expired, fetching new token");
            }
        }

        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.token().await {
                Ok(token) => {
                    tracing::info!("Using ambient credential: {}", provider.name());
                    let mut cache = self.token_cache.write().await;
                    *cache = Some(token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!("Ambient credential {} unavailable: {}", provider.name(), e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no providers configured".to_string());
        }
        Err(CredentialError::Unavailable(failures.join("; ")))
    }

    fn kind(&self) -> CredentialKind {
        CredentialKind::Fallback
    }
}

/// The credential active for one request
#[derive(Clone)]
pub struct Credential(Arc<dyn CredentialSource>);

impl Credential {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self(source)
    }

    pub fn delegated(raw_token: impl Into<String>) -> Self {
        Self(Arc::new(DelegatedCredentialSource::new(raw_token)))
    }

    pub fn fallback(source: FallbackCredentialSource) -> Self {
        Self(Arc::new(source))
    }

    pub fn kind(&self) -> CredentialKind {
        self.0.kind()
    }

    pub async fn token(&self) -> Result<AccessToken, CredentialError> {
        self.0.token().await
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.kind()).finish()
    }
}

/// Settings for the ambient credential chain
#[derive(Debug, Clone)]
pub struct AmbientSettings {
    pub authority_host: String,
    pub tenant_id: Option<String>,
    pub managed_identity: bool,
    pub imds_endpoint: String,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: None,
            managed_identity: true,
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
        }
    }
}

// =========================================================================
// Ambient providers
// =========================================================================

/// Service principal from AZURE_TENANT_ID / AZURE_CLIENT_ID / AZURE_CLIENT_SECRET
pub struct EnvironmentCredential {
    http: ArmHttpClient,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl EnvironmentCredential {
    pub fn new(
        http: &ArmHttpClient,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http: http.clone(),
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    /// Only configured when all three variables are set and non-empty
    pub fn from_env(http: &ArmHttpClient, authority_host: &str) -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let tenant_id = var("AZURE_TENANT_ID")?;
        let client_id = var("AZURE_CLIENT_ID")?;
        let client_secret = var("AZURE_CLIENT_SECRET")?;

        if !validate_tenant_id(&tenant_id) {
            tracing::warn!("Invalid tenant ID format in AZURE_TENANT_ID");
            return None;
        }

        Some(Self::new(http, authority_host, &tenant_id, &client_id, &client_secret))
    }
}

#[async_trait]
impl AmbientTokenProvider for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let url = token_endpoint(&self.authority_host, &self.tenant_id);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", MANAGEMENT_DEFAULT_SCOPE),
        ];

        let response = self
            .http
            .post_form(&url, &form)
            .await
            .map_err(|e| credential_error(&e, MANAGEMENT_DEFAULT_SCOPE))?;
        parse_token_response(&response)
    }
}

/// Managed identity via App Service identity endpoint or IMDS
pub struct ManagedIdentityCredential {
    http: ArmHttpClient,
    endpoint: ManagedIdentityEndpoint,
}

enum ManagedIdentityEndpoint {
    AppService { endpoint: String, header: String },
    Imds { endpoint: String },
}

impl ManagedIdentityCredential {
    /// Uses IDENTITY_ENDPOINT / IDENTITY_HEADER when present, IMDS otherwise
    pub fn from_env(http: &ArmHttpClient, imds_endpoint: &str) -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) if !endpoint.is_empty() && !header.is_empty() => {
                Self::app_service(http, &endpoint, &header)
            }
            _ => Self::imds(http, imds_endpoint),
        }
    }

    /// App Service / Functions identity endpoint with its secret header
    pub fn app_service(http: &ArmHttpClient, endpoint: &str, header: &str) -> Self {
        Self {
            http: http.clone(),
            endpoint: ManagedIdentityEndpoint::AppService {
                endpoint: endpoint.to_string(),
                header: header.to_string(),
            },
        }
    }

    /// Always use the given IMDS endpoint
    pub fn imds(http: &ArmHttpClient, endpoint: &str) -> Self {
        Self {
            http: http.clone(),
            endpoint: ManagedIdentityEndpoint::Imds {
                endpoint: endpoint.to_string(),
            },
        }
    }
}

#[async_trait]
impl AmbientTokenProvider for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "managed-identity"
    }

    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let resource = urlencoding::encode(MANAGEMENT_RESOURCE);
        let response = match &self.endpoint {
            ManagedIdentityEndpoint::AppService { endpoint, header } => {
                let url = format!("{}?api-version=2019-08-01&resource={}", endpoint, resource);
                self.http
                    .get_with_headers(&url, &[("X-IDENTITY-HEADER", header.as_str())], IMDS_TIMEOUT)
                    .await
            }
            ManagedIdentityEndpoint::Imds { endpoint } => {
                let url = format!("{}?api-version=2018-02-01&resource={}", endpoint, resource);
                self.http
                    .get_with_headers(&url, &[("Metadata", "true")], IMDS_TIMEOUT)
                    .await
            }
        }
        .map_err(|e| credential_error(&e, MANAGEMENT_RESOURCE))?;

        parse_token_response(&response)
    }
}

/// Token from the logged-in Azure CLI
pub struct AzureCliCredential {
    tenant_id: Option<String>,
    program: PathBuf,
    timeout: std::time::Duration,
}

impl AzureCliCredential {
    pub fn new(tenant_id: Option<String>) -> Self {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        Self {
            tenant_id,
            program: PathBuf::from(program),
            timeout: CLI_TIMEOUT,
        }
    }

    /// Run a different executable instead of `az`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AmbientTokenProvider for AzureCliCredential {
    fn name(&self) -> &'static str {
        "azure-cli"
    }

    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let mut command = tokio::process::Command::new(&self.program);
        command.kill_on_drop(true);
        command.args([
            "account",
            "get-access-token",
            "--resource",
            MANAGEMENT_RESOURCE,
            "--output",
            "json",
        ]);
        if let Some(tenant) = &self.tenant_id {
            command.args(["--tenant", tenant.as_str()]);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                CredentialError::Unavailable(format!(
                    "Azure CLI timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| CredentialError::Unavailable(format!("failed to run Azure CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr.lines().next().unwrap_or("").trim().to_string();
            return Err(CredentialError::Unavailable(format!(
                "az account get-access-token failed: {}. Run 'az login'",
                first_line
            )));
        }

        let value: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            CredentialError::Unavailable(format!("unexpected Azure CLI output: {}", e))
        })?;
        parse_cli_token(&value)
    }
}

// =========================================================================
// Token responses
// =========================================================================

/// Token endpoint URL for a given tenant
pub fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// Read a number that some endpoints encode as a string (IMDS does)
fn number_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Expiry `secs` from now; out-of-range lifetimes get the default TTL
fn expires_after(secs: i64) -> DateTime<Utc> {
    let now = Utc::now();
    Duration::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or_else(|| {
            tracing::warn!("Token lifetime of {}s is out of range, using default", secs);
            now + DEFAULT_TOKEN_TTL
        })
}

/// Parse an OAuth2 / managed identity token response
pub fn parse_token_response(value: &Value) -> Result<AccessToken, CredentialError> {
    let secret = value
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CredentialError::Rejected("response has no access_token".to_string()))?;

    let expires_at = if let Some(secs) = number_field(value, "expires_in") {
        expires_after(secs)
    } else if let Some(epoch) = number_field(value, "expires_on") {
        Utc.timestamp_opt(epoch, 0)
            .single()
            .unwrap_or_else(|| Utc::now() + DEFAULT_TOKEN_TTL)
    } else {
        Utc::now() + DEFAULT_TOKEN_TTL
    };

    Ok(AccessToken::new(secret, expires_at))
}

/// Parse `az account get-access-token --output json`
fn parse_cli_token(value: &Value) -> Result<AccessToken, CredentialError> {
    let secret = value
        .get("accessToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CredentialError::Unavailable("Azure CLI returned no token".to_string()))?;

    // Newer CLI versions include a POSIX timestamp; older ones only a local time string
    let expires_at = number_field(value, "expires_on")
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .unwrap_or_else(|| Utc::now() + DEFAULT_TOKEN_TTL);

    Ok(AccessToken::new(secret, expires_at))
}

/// Classify a failed token request
pub fn credential_error(error: &anyhow::Error, scope: &str) -> CredentialError {
    match api_error(error) {
        Some(api) if api.body.contains("AADSTS65001") || api.body.contains("consent_required") => {
            CredentialError::ConsentRequired(scope.to_string())
        }
        Some(api) => CredentialError::Rejected(format!("HTTP {}", api.status)),
        None => CredentialError::Transport(format!("{:#}", error)),
    }
}

// =========================================================================
// Local Azure CLI configuration
// =========================================================================

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    // Check AZURE_CONFIG_DIR environment variable first
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Validate a tenant ID: a GUID or a verified domain name
pub fn validate_tenant_id(tenant: &str) -> bool {
    if is_guid(tenant) {
        return true;
    }

    if tenant.len() > 253 || !tenant.contains('.') {
        return false;
    }

    tenant.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn is_guid(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Read the default tenant from the environment or the Azure CLI profile
/// Security: Validates tenant ID format before returning
pub fn get_default_tenant() -> Option<String> {
    if let Ok(tenant) = std::env::var("AZURE_TENANT_ID") {
        if validate_tenant_id(&tenant) {
            return Some(tenant);
        }
        tracing::warn!("Invalid tenant ID format in AZURE_TENANT_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(profile_path).ok()?;
    default_tenant_from_profile(&content)
}

/// Tenant of the default subscription in an `azureProfile.json` document
fn default_tenant_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let profile: Value = serde_json::from_str(content.trim_start_matches('\u{feff}')).ok()?;

    profile
        .get("subscriptions")?
        .as_array()?
        .iter()
        .find(|s| s.get("isDefault").and_then(|v| v.as_bool()).unwrap_or(false))
        .and_then(|s| s.get("tenantId"))
        .and_then(|v| v.as_str())
        .filter(|t| validate_tenant_id(t))
        .map(|t| t.to_string())
}
