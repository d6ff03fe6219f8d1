use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use emk::exec::{ScriptInvocation, ScriptRunner};
use emk::fs::FileSystem;
use emk::tree::BoxFuture;

/// A fake script runner that:
/// - records every invocation
/// - optionally sleeps, to make runs overlap, and tracks how many overlap
/// - optionally writes the target file (`$@`) so outputs appear "built"
/// - exits with a configurable code.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    fs: Option<Arc<dyn FileSystem>>,
    delay: Option<Duration>,
    exit_code: i32,
    invocations: Arc<Mutex<Vec<ScriptInvocation>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write each output target through `fs` after a successful run.
    pub fn writing_to(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn exiting_with(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn invocations(&self) -> Vec<ScriptInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Node ids of every invocation, in call order.
    pub fn labels(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|inv| inv.label)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    /// Highest number of scripts that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Forget recorded invocations and the overlap high-water mark, so a
    /// test can look at one phase at a time.
    pub fn clear(&self) {
        self.invocations.lock().unwrap().clear();
        self.max_in_flight
            .store(self.in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

impl ScriptRunner for FakeRunner {
    fn run(&self, invocation: ScriptInvocation) -> BoxFuture<'static, anyhow::Result<i32>> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let fs = self.fs.clone();
        let delay = self.delay;
        let code = self.exit_code;
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);

        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            // tasks are labelled `#name`; only outputs have a file to write
            if code == 0 && !invocation.label.starts_with('#') {
                if let Some(fs) = fs {
                    let target: PathBuf = invocation.cwd.join(&invocation.label);
                    fs.write(&target, format!("built by {}", invocation.label).as_bytes())?;
                }
            }
            Ok::<_, anyhow::Error>(code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(label: &str) -> ScriptInvocation {
        ScriptInvocation {
            label: format!("#{label}"),
            script: "true".into(),
            variables: Vec::new(),
            args: Vec::new(),
            cwd: PathBuf::from("/p"),
        }
    }

    #[tokio::test]
    async fn clear_starts_a_fresh_phase() {
        let runner = FakeRunner::new().with_delay(Duration::from_millis(20));
        let (a, b) = tokio::join!(runner.run(invocation("a")), runner.run(invocation("b")));
        assert_eq!((a.unwrap(), b.unwrap()), (0, 0));
        assert_eq!(runner.max_concurrent(), 2);

        runner.clear();
        assert_eq!(runner.count(), 0);
        assert_eq!(runner.max_concurrent(), 0);

        runner.run(invocation("c")).await.unwrap();
        assert_eq!(runner.max_concurrent(), 1);
        assert_eq!(runner.labels(), vec!["#c"]);
    }
}
