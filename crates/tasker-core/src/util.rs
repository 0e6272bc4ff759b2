//! Shared utility functions used across multiple modules.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Run `operation` with a time budget; an elapsed budget becomes [`Error::Timeout`].
pub async fn bounded<T>(limit: Duration, operation: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" libsql://db.example.com ".to_string())),
            Some("libsql://db.example.com".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_maps_elapsed_budget_to_timeout() {
        let result = bounded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn bounded_passes_through_inner_result() {
        let value = bounded(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let error = bounded::<()>(Duration::from_secs(1), async {
            Err(Error::Database("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(error.to_string().contains("boom"));
    }
}
