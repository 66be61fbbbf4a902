use httpmock::prelude::*;
use httpmock::{
    Mock,
    Then,
    When,
};
use serde_json::json;

/// A fake apiserver: an httpmock server plus a `kube::Client` pointed at
/// it.  Handlers register immediately; `assert` checks that every one of
/// them was hit exactly as many times as it said it would be.  Unmatched
/// requests come back as errors from the mock server, which is usually
/// exactly what the test wants the cluster to do.
pub struct MockServerBuilder {
    server: MockServer,
    mocks: Vec<(usize, usize)>,
}

fn print_req(req: &HttpMockRequest) -> bool {
    // Use println instead of info! so that this works outside of the lib crate
    println!("    Received: {} {}", req.method(), req.uri_str());
    true
}

impl MockServerBuilder {
    pub fn new() -> MockServerBuilder {
        MockServerBuilder {
            server: MockServer::start(),
            mocks: vec![],
        }
    }

    pub fn assert(&self) {
        for (id, expected_hits) in &self.mocks {
            println!("checking assertions for mock {id}");
            Mock::new(*id, &self.server).assert_hits(*expected_hits);
        }
    }

    pub fn handle<F: Fn(When, Then)>(&mut self, f: F) -> &mut Self {
        self.handle_multiple(f, 1)
    }

    pub fn handle_multiple<F: Fn(When, Then)>(&mut self, f: F, expected_hits: usize) -> &mut Self {
        let mock = self.server.mock(|w, t| {
            let w = w.matches(print_req);
            f(w, t);
        });
        self.mocks.push((mock.id, expected_hits));
        self
    }

    pub fn handle_not_found(&mut self, path: String) -> &mut Self {
        self.handle(move |when, then| {
            when.path(&path);
            then.status(404).json_body(status_not_found());
        })
    }

    pub fn url(&self) -> http::Uri {
        http::Uri::try_from(self.server.url("/")).unwrap()
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn make_fake_apiserver() -> (MockServerBuilder, kube::Client) {
    let builder = MockServerBuilder::new();
    let config = kube::Config::new(builder.url());
    let client = kube::Client::try_from(config).unwrap();
    (builder, client)
}

pub fn status_ok() -> serde_json::Value {
    json!({
      "kind": "Status",
      "apiVersion": "v1",
      "metadata": {},
      "status": "Success",
      "code": 200
    })
}

pub fn status_not_found() -> serde_json::Value {
    json!({
      "kind": "Status",
      "apiVersion": "v1",
      "metadata": {},
      "status": "Failure",
      "reason": "NotFound",
      "code": 404
    })
}

pub fn status_conflict() -> serde_json::Value {
    json!({
      "kind": "Status",
      "apiVersion": "v1",
      "metadata": {},
      "status": "Failure",
      "reason": "AlreadyExists",
      "code": 409
    })
}

/// The response body for a core/v1 list call over the given items.
pub fn list_body<T: serde::Serialize>(kind: &str, items: &[T]) -> serde_json::Value {
    json!({
        "kind": kind,
        "apiVersion": "v1",
        "metadata": {},
        "items": items,
    })
}
