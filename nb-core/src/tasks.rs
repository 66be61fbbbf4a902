use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::errors::*;

/// A bounded group of spawned tasks.  Closing the group waits for every
/// task; the first task error aborts the stragglers and is returned, and so
/// is running past the close timeout.
#[derive(Debug)]
pub struct TaskGroup {
    js: JoinSet<EmptyResult>,
    close_timeout: Duration,
}

impl TaskGroup {
    pub fn new(close_timeout: Duration) -> TaskGroup {
        TaskGroup { js: JoinSet::new(), close_timeout }
    }

    pub fn spawn(&mut self, fut: impl Future<Output = EmptyResult> + Send + 'static) {
        self.js.spawn(fut);
    }

    pub fn len(&self) -> usize {
        self.js.len()
    }

    pub fn is_empty(&self) -> bool {
        self.js.is_empty()
    }

    pub async fn close(&mut self) -> EmptyResult {
        let res = timeout(self.close_timeout, async {
            while let Some(joined) = self.js.join_next().await {
                match joined {
                    Ok(Ok(())) => (),
                    Ok(Err(e)) => return Err(e),
                    Err(e) => return Err(anyhow!(e)),
                }
            }
            Ok(())
        })
        .await;

        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.js.abort_all();
                Err(e)
            },
            Err(_) => {
                self.js.abort_all();
                Err(anyhow!("task group did not close within {:?}", self.close_timeout))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;
    use tokio::time::sleep;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn test_close_empty() {
        let mut group = TaskGroup::new(Duration::from_secs(1));
        assert_is_empty!(&group);
        group.close().await.unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn test_close_waits_for_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut group = TaskGroup::new(Duration::from_secs(5));
        group.spawn(async move {
            sleep(Duration::from_millis(10)).await;
            let _ = tx.send(());
            Ok(())
        });
        group.close().await.unwrap();
        rx.await.unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn test_close_returns_first_error() {
        let mut group = TaskGroup::new(Duration::from_secs(5));
        group.spawn(async { bail!("oh no") });
        group.spawn(async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let err = group.close().await.unwrap_err();
        assert_contains!(err.to_string(), "oh no");
    }

    #[rstest]
    #[tokio::test]
    async fn test_close_times_out() {
        let mut group = TaskGroup::new(Duration::from_millis(20));
        group.spawn(async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        assert_err!(group.close().await);
    }
}
