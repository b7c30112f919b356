use serde::{Deserialize, Serialize};

/// JWT payload carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // user email
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub jti: String,    // session token recorded in user_sessions
}
