pub mod calendar;
pub mod dates;
pub mod embeddings;
pub mod fuzzy;
pub mod profiles;
pub mod retrieval;
pub mod scrape;
pub mod search;

use color_eyre::Result;
use std::future::Future;
use std::time::Duration;

/// Runs a collaborator call under a hard deadline.
///
/// Elapsed deadlines come back as ordinary errors so callers treat them
/// like any other recoverable failure.
pub async fn with_timeout<T, F>(label: &str, budget: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(color_eyre::eyre::eyre!(
            "{} timed out after {}s",
            label,
            budget.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout("fast", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_reports_elapsed_budget() {
        let error = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(error.to_string().contains("slow timed out"));
    }
}
