//! Scripted rate sources for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CurrencyCode, FetchedRates, RateError, RateSource};

pub fn code(s: &str) -> CurrencyCode {
    CurrencyCode::parse(s).unwrap()
}

/// One scripted response: how long the "request" takes and what it returns
struct Step {
    delay: Duration,
    result: Result<FetchedRates, RateError>,
}

/// Rate source that replays a script of responses in call order
///
/// Once the script runs out every call fails with a network error.
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, base: &str, pairs: &[(&str, f64)]) -> Self {
        self.then_ok_after(Duration::ZERO, base, pairs)
    }

    pub fn then_ok_after(self, delay: Duration, base: &str, pairs: &[(&str, f64)]) -> Self {
        let fetched = FetchedRates {
            base: code(base),
            date: None,
            rates: pairs.iter().map(|(c, r)| (code(c), *r)).collect(),
        };
        self.push(delay, Ok(fetched))
    }

    pub fn then_err(self, err: RateError) -> Self {
        self.push(Duration::ZERO, Err(err))
    }

    fn push(self, delay: Duration, result: Result<FetchedRates, RateError>) -> Self {
        self.steps.lock().unwrap().push_back(Step { delay, result });
        self
    }

    /// Number of fetches made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for ScriptedSource {
    async fn fetch(&self, _base: &CurrencyCode) -> Result<FetchedRates, RateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                tokio::time::sleep(step.delay).await;
                step.result
            }
            None => Err(RateError::NetworkError("script exhausted".to_string())),
        }
    }
}
