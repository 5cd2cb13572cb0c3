mod gateway;
mod password;
mod token;

pub use gateway::CredentialGateway;
pub use password::{hash_password, verify_password};
pub use token::{Claims, JwtKeys, SessionToken};
