//! JSON-over-HTTP client for the external syntactic analyzer.

use super::{AnalyzeRequest, Analyzer, ParsedDoc};
use crate::error::AnalyzerError;
use std::time::Duration;

pub struct HttpAnalyzer {
    endpoint: String,
    agent: ureq::Agent,
    name: String,
}

impl HttpAnalyzer {
    /// `endpoint` is the full URL of the analyze route. The transport
    /// timeout here is a backstop; the orchestrator enforces the real
    /// per-chunk deadline.
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(timeout)
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent,
            name: "http".to_string(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub(super) fn post(&self, req: &AnalyzeRequest) -> Result<ParsedDoc, AnalyzerError> {
        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(serde_json::to_value(req).map_err(|e| {
                AnalyzerError::Malformed(format!("request serialization: {}", e))
            })?)
            .map_err(|e| match e {
                ureq::Error::Status(code, r) => AnalyzerError::Status {
                    code,
                    body: r.into_string().unwrap_or_default(),
                },
                e => AnalyzerError::Network(e.to_string()),
            })?;

        response
            .into_json::<ParsedDoc>()
            .map_err(|e| AnalyzerError::Malformed(e.to_string()))
    }
}

impl Analyzer for HttpAnalyzer {
    fn analyze(&self, req: &AnalyzeRequest) -> Result<ParsedDoc, AnalyzerError> {
        self.post(req)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
