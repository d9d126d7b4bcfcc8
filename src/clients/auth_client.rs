use reqwest::Client;
use async_trait::async_trait;
use jsonwebtoken::{encode, Header, EncodingKey};
use serde::{Serialize, Deserialize};
use chrono::{Utc, Duration};
use tracing::{info, warn};

/// Verifies a bearer credential against the external authentication service.
///
/// Implementations must collapse every failure mode the caller does not need
/// to distinguish into [`AuthError::Unauthorized`]; the handshake leaks no
/// internal detail to the peer either way.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// The stable identity resolved from a valid credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[derive(Debug)]
pub enum AuthError {
    /// The credential was rejected (expired, malformed, revoked, unknown).
    Unauthorized,
    /// The auth service could not be reached or answered garbage.
    ServiceUnavailable(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthorized => write!(f, "Credential rejected"),
            AuthError::ServiceUnavailable(e) => write!(f, "Auth service unavailable: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug)]
pub struct HttpAuthGateway {
    client: Client,
    base_url: String,
    jwt_secret: String,
    service_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

/// Shape of the auth service's validate response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    valid: bool,
    user_id: Option<String>,
}

impl HttpAuthGateway {
    pub fn new(base_url: String, jwt_secret: String, service_name: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            jwt_secret,
            service_name,
        }
    }

    fn generate_token(&self) -> String {
        let expiration = Utc::now()
            .checked_add_signed(Duration::seconds(60)) // 1 minute expiration
            .expect("valid timestamp")
            .timestamp();

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.jwt_secret.as_bytes()))
            .expect("Failed to generate JWT")
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let service_token = self.generate_token();
        let url = format!("{}/auth/validate", self.base_url);

        let response = self.client.get(&url)
            .header("Authorization", format!("Bearer {}", service_token))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| {
                warn!("Auth service request failed: {}", e);
                AuthError::ServiceUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            warn!("Auth service answered {}", response.status());
            return Err(AuthError::Unauthorized);
        }

        let body: ValidateResponse = response.json().await.map_err(|e| {
            warn!("Auth service returned an unparseable body: {}", e);
            AuthError::ServiceUnavailable(e.to_string())
        })?;

        match (body.valid, body.user_id) {
            (true, Some(user_id)) => {
                info!("Token validated successfully for user: {}", user_id);
                Ok(AuthenticatedUser { user_id })
            }
            _ => Err(AuthError::Unauthorized),
        }
    }
}
