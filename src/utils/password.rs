use bcrypt::{hash, verify, DEFAULT_COST};

use crate::utils::error::AppError;

/// bcrypt is CPU-bound; run it off the async workers.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await?
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub async fn verify_password(password: String, hashed: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify(password, &hashed))
        .await?
        .map_err(|e| AppError::Internal(format!("Password verification error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash_password("hunter22".to_string()).await.unwrap();
        assert_ne!(hashed, "hunter22");
        assert!(verify_password("hunter22".to_string(), hashed.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hashed).await.unwrap());
    }
}
