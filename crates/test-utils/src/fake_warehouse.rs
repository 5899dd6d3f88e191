// crates/test-utils/src/fake_warehouse.rs

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use etlgraph::errors::WarehouseError;
use etlgraph::warehouse::{BulkLoadRequest, RowSet, WarehouseClient, WarehouseFuture};

/// What the fake answers to a matching statement or load.
#[derive(Debug, Clone)]
pub enum Response {
    Rows(RowSet),
    Fail(WarehouseError),
    /// Never completes; for timeout tests.
    Hang,
    /// Panics inside the executor future.
    Panic,
}

#[derive(Debug)]
struct Script {
    pattern: String,
    responses: VecDeque<Response>,
}

#[derive(Debug, Default)]
struct Recorded {
    statements: Vec<String>,
    loads: Vec<BulkLoadRequest>,
}

/// In-memory [`WarehouseClient`] with scripted answers.
///
/// A statement (or a bulk load's target) is matched against the scripted
/// patterns by substring, first match wins. Each script hands out its
/// responses in order and keeps repeating the last one. Anything unscripted
/// succeeds with an empty row set.
#[derive(Debug, Default)]
pub struct FakeWarehouse {
    scripts: Mutex<Vec<Script>>,
    recorded: Mutex<Recorded>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script<I>(self, pattern: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = Response>,
    {
        self.scripts.lock().unwrap().push(Script {
            pattern: pattern.to_string(),
            responses: responses.into_iter().collect(),
        });
        self
    }

    /// Shorthand: statements containing `pattern` always fail.
    pub fn failing(self, pattern: &str) -> Self {
        let err = WarehouseError::Statement(format!("scripted failure for '{pattern}'"));
        self.script(pattern, [Response::Fail(err)])
    }

    /// Shorthand: statements containing `pattern` return `rows`.
    pub fn returning(self, pattern: &str, rows: RowSet) -> Self {
        self.script(pattern, [Response::Rows(rows)])
    }

    /// Statements executed so far, in call order.
    pub fn statements(&self) -> Vec<String> {
        self.recorded.lock().unwrap().statements.clone()
    }

    pub fn loads(&self) -> Vec<BulkLoadRequest> {
        self.recorded.lock().unwrap().loads.clone()
    }

    /// How many recorded statements contain `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.recorded
            .lock()
            .unwrap()
            .statements
            .iter()
            .filter(|s| s.contains(pattern))
            .count()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_response(&self, key: &str) -> Response {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.iter_mut().find(|s| key.contains(&s.pattern)) else {
            return Response::Rows(RowSet::empty());
        };
        if script.responses.len() > 1 {
            script.responses.pop_front().unwrap()
        } else {
            script
                .responses
                .front()
                .cloned()
                .unwrap_or(Response::Rows(RowSet::empty()))
        }
    }

    async fn answer(&self, key: &str) -> Result<RowSet, WarehouseError> {
        let response = self.next_response(key);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Response::Rows(rows) => Ok(rows),
            Response::Fail(err) => Err(err),
            Response::Hang => std::future::pending().await,
            Response::Panic => panic!("scripted panic for '{key}'"),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WarehouseClient for FakeWarehouse {
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, RowSet> {
        self.recorded.lock().unwrap().statements.push(sql.to_string());
        Box::pin(self.answer(sql))
    }

    fn bulk_load<'a>(&'a self, request: &'a BulkLoadRequest) -> WarehouseFuture<'a, ()> {
        self.recorded.lock().unwrap().loads.push(request.clone());
        Box::pin(async move {
            self.answer(&request.target).await?;
            Ok(())
        })
    }
}
