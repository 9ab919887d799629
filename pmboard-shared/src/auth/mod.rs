/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and length rules
/// - [`jwt`]: access and refresh tokens
/// - [`ephemeral`]: single-use emailed tokens (generation, hashing, expiry)
/// - [`middleware`]: bearer token extraction and the `AuthContext` extractor
/// - [`authorization`]: owner / admin / member checks on projects
///
/// # Example
///
/// ```no_run
/// use pmboard_shared::auth::password::{hash_password, verify_password};
/// use pmboard_shared::auth::jwt::issue_token_pair;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("correct horse battery")?;
/// assert!(verify_password("correct horse battery", &hash)?);
///
/// let tokens = issue_token_pair(Uuid::new_v4(), "ada@example.com", "a-secret-key-that-is-long-enough!")?;
/// println!("{}", tokens.access_token);
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod ephemeral;
pub mod jwt;
pub mod middleware;
pub mod password;
