mod apikey;
mod middleware;
mod password;
mod session;

pub use apikey::{KEY_PREFIX_LENGTH, generate_api_key, key_prefix};
pub use middleware::{AuthContext, AuthError, RequireSession};
pub use password::PasswordHasher;
pub use session::{SESSION_COOKIE, SESSION_TTL_SECONDS, SessionClaims, SessionKeys};
