/// Authentication and authorization
///
/// JWT bearer tokens carry the employee id, role, and department. Extractors
/// validate the token against the configured secret and enforce the role
/// lattice Employee < Moderator < Admin.
use crate::{
    context::AppContext,
    error::{HubError, HubResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Role levels, in increasing order of privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular employee
    Employee,
    /// Can review reports, decide moderation cases, and review appeals
    Moderator,
    /// Full access, including privacy requests and audit review
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(HubError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Employee id
    pub sub: String,
    pub role: Role,
    pub department_id: Option<i64>,
    pub iat: i64,
    pub exp: i64,
}

/// Issue an access token for an employee
pub fn issue_token(
    secret: &str,
    employee_id: &str,
    role: Role,
    department_id: Option<i64>,
    ttl_secs: i64,
) -> HubResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: employee_id.to_string(),
        role,
        department_id,
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| HubError::Jwt(format!("Failed to sign token: {}", e)))
}

/// Validate a token and return its claims
pub fn validate_token(secret: &str, token: &str) -> HubResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| HubError::Authentication("Invalid or expired token".to_string()))
}

/// Extract bearer token from an Authorization header value set
pub fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Authenticated context - any valid employee token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub employee_id: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| HubError::Authentication("Missing authorization header".to_string()))?;

        let claims = validate_token(&state.config.authentication.jwt_secret, &token)?;

        Ok(AuthContext {
            employee_id: claims.sub,
            role: claims.role,
            department_id: claims.department_id,
        })
    }
}

/// Moderator context - requires the moderator role or higher
#[derive(Debug, Clone)]
pub struct ModeratorAuthContext {
    pub employee_id: String,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppContext> for ModeratorAuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !auth.role.can_act_as(Role::Moderator) {
            let _ = state
                .audit
                .log_access_denied(&auth.employee_id, "moderation", None)
                .await;
            return Err(HubError::Authorization(
                "Moderator role required".to_string(),
            ));
        }

        Ok(ModeratorAuthContext {
            employee_id: auth.employee_id,
            role: auth.role,
        })
    }
}

/// Admin context - requires the admin role
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub employee_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = HubError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !auth.role.can_act_as(Role::Admin) {
            let _ = state
                .audit
                .log_access_denied(&auth.employee_id, "admin", None)
                .await;
            return Err(HubError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminAuthContext {
            employee_id: auth.employee_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-test-secret-test-secret!";

    #[test]
    fn test_token_roundtrip() {
        let token = issue_token(SECRET, "emp-1", Role::Moderator, Some(3), 3600).unwrap();
        let claims = validate_token(SECRET, &token).unwrap();

        assert_eq!(claims.sub, "emp-1");
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.department_id, Some(3));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, "emp-1", Role::Employee, None, 3600).unwrap();
        assert!(validate_token("another-secret-another-secret-!!", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Well past the validator's default leeway
        let token = issue_token(SECRET, "emp-1", Role::Employee, None, -300).unwrap();
        assert!(validate_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_role_lattice() {
        assert!(Role::Admin.can_act_as(Role::Moderator));
        assert!(Role::Moderator.can_act_as(Role::Employee));
        assert!(!Role::Employee.can_act_as(Role::Moderator));
        assert!(!Role::Moderator.can_act_as(Role::Admin));
    }
}
