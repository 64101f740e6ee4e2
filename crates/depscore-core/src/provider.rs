//! Provider trait for dependency-scoring services.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PackageRef, PackageScore};

/// Trait for remote services that score packages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Get the provider name (e.g., "socket")
    fn name(&self) -> &str;

    /// Score a batch of packages.
    ///
    /// Results follow the order in which the remote service returns them,
    /// which matches the input order for the Socket API.
    async fn score(&self, packages: &[PackageRef]) -> Result<Vec<PackageScore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider() {
        let mut provider = MockScoreProvider::new();
        provider
            .expect_score()
            .returning(|pkgs| Ok(pkgs.iter().map(|p| PackageScore::missing(p.purl())).collect()));

        let scores = provider
            .score(&[PackageRef::new("npm", "express", "unknown")])
            .await
            .unwrap();

        assert_eq!(scores, vec![PackageScore::missing("pkg:npm/express")]);
    }
}
