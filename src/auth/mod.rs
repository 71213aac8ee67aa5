use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::config::{AgentConfig, Role, Settings};

/// Resolved caller identity for an authenticated request.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub name: String,
    pub role: Role,
    /// Agents this caller owns; the authorization domain for every
    /// agent-scoped request.
    pub agents: Vec<AgentConfig>,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns_agent(&self, agent_id: &str) -> bool {
        self.agents.iter().any(|a| a.agent_id == agent_id)
    }

    /// Ownership check with the elevated-role bypass.
    pub fn can_access(&self, agent_id: &str) -> bool {
        self.is_admin() || self.owns_agent(agent_id)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.agent_id.clone()).collect()
    }
}

/// Authentication context extracted from request
#[derive(Debug, Clone)]
pub enum AuthContext {
    Authenticated(CallerIdentity),
    None,
}

impl AuthContext {
    pub fn require(&self) -> Result<&CallerIdentity, ApiError> {
        match self {
            AuthContext::Authenticated(caller) => Ok(caller),
            AuthContext::None => Err(ApiError::unauthorized()),
        }
    }
}

/// Bearer token authentication middleware.
pub async fn auth_middleware(
    State(settings): State<Settings>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = auth_header.and_then(|auth| auth.strip_prefix("Bearer ").map(|s| s.to_string()));

    let context = match token {
        Some(t) => match settings.user_for_token(&t) {
            Some(user) => {
                debug!(user = %user.name, "token authenticated");
                AuthContext::Authenticated(CallerIdentity {
                    name: user.name.clone(),
                    role: user.role,
                    agents: user.agents.clone(),
                })
            }
            None => {
                warn!("invalid token provided");
                AuthContext::None
            }
        },
        None => {
            debug!("no token provided");
            AuthContext::None
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
