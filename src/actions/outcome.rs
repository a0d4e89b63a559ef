//! Run independent fallible operations and report which of them worked

use futures::future::join_all;
use std::future::Future;

/// Await every named operation concurrently.
///
/// One failure never cancels the others. Results come back in submission
/// order regardless of completion order.
pub async fn run_named<T, E, F>(ops: Vec<(String, F)>) -> Vec<(String, Result<T, E>)>
where
    F: Future<Output = Result<T, E>>,
{
    let (names, futures): (Vec<String>, Vec<F>) = ops.into_iter().unzip();
    names.into_iter().zip(join_all(futures).await).collect()
}

/// Names of the items that were created and of those that failed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tally {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl Tally {
    pub fn succeed(&mut self, name: impl Into<String>) {
        self.succeeded.push(name.into());
    }

    pub fn fail(&mut self, name: impl Into<String>) {
        self.failed.push(name.into());
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// e.g. `Store, BTC wallet created successfully.`
    pub fn success_message(&self) -> Option<String> {
        if self.succeeded.is_empty() {
            return None;
        }
        Some(format!("{} created successfully.", self.succeeded.join(", ")))
    }

    /// e.g. `USDT wallet creation failed.`
    pub fn error_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(format!("{} creation failed.", self.failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type BoxFut = std::pin::Pin<Box<dyn Future<Output = Result<u32, String>> + Send>>;

    fn op<F>(name: &str, fut: F) -> (String, BoxFut)
    where
        F: Future<Output = Result<u32, String>> + Send + 'static,
    {
        let fut: BoxFut = Box::pin(fut);
        (name.to_string(), fut)
    }

    #[tokio::test]
    async fn test_results_keep_submission_order() {
        let ops = vec![
            op("slow", async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(1)
            }),
            op("failing", async { Err("boom".to_string()) }),
            op("fast", async { Ok(3) }),
        ];

        let results = run_named(ops).await;
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["slow", "failing", "fast"]);
        assert_eq!(results[0].1, Ok(1));
        assert_eq!(results[1].1, Err("boom".to_string()));
        assert_eq!(results[2].1, Ok(3));
    }

    #[test]
    fn test_tally_messages() {
        let mut tally = Tally::default();
        tally.succeed("Store");
        tally.succeed("BTC wallet");
        tally.fail("USDT wallet");

        assert_eq!(
            tally.success_message().as_deref(),
            Some("Store, BTC wallet created successfully.")
        );
        assert_eq!(tally.error_message().as_deref(), Some("USDT wallet creation failed."));
        assert!(!tally.all_succeeded());

        assert_eq!(Tally::default().error_message(), None);
    }
}
