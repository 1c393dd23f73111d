//! Client for the remote code-generation service

use crate::error::{RecorderError, Result};
use crate::state::{Collection, RecorderState, TestCase, Variables};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CODEGEN_URL: &str = "http://127.0.0.1:8000";

const NO_STEPS: &str = "No steps to generate.";
const NO_LICENSE_KEY: &str = "License key not found. Please enter it in the settings.";
const SERVER_ERROR: &str = "Server error";
const CONNECT_ERROR: &str = "Could not connect to the code generation server. Make sure it is running.";

/// Which files the service should produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOptions {
    #[serde(default)]
    pub generate_pom: bool,
    #[serde(default)]
    pub generate_test: bool,
    #[serde(default)]
    pub generate_base_page: bool,
}

/// The parts of the state the service needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub collections: IndexMap<String, Collection>,
    pub active_collection_id: Option<String>,
    pub environments: IndexMap<String, Variables>,
    pub active_environment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub active_test_case: TestCase,
    /// Test cases sharing the active test case's page class
    pub all_test_cases_for_page: Vec<TestCase>,
    pub state_data: StateData,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    /// Snapshot the request body; fails when there is nothing to generate
    pub fn snapshot(state: &RecorderState, options: GenerateOptions) -> Result<Self> {
        let active = state
            .active_test_case()
            .filter(|tc| !tc.recorded_steps.is_empty())
            .ok_or_else(|| RecorderError::CodeGeneration(NO_STEPS.to_string()))?;

        Ok(Self {
            active_test_case: active.clone(),
            all_test_cases_for_page: state
                .test_cases_for_page(&active.page_class_name)
                .into_iter()
                .cloned()
                .collect(),
            state_data: StateData {
                collections: state.collections.clone(),
                active_collection_id: state.active_collection_id.clone(),
                environments: state.environments.clone(),
                active_environment: state.active_environment.clone(),
            },
            options,
        })
    }
}

/// HTTP client for `POST /api/v1/generate`
#[derive(Debug, Clone)]
pub struct CodegenClient {
    http: reqwest::Client,
    base_url: String,
    license_key: String,
}

impl CodegenClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            license_key: String::new(),
        }
    }

    pub fn with_license_key(mut self, license_key: impl Into<String>) -> Self {
        self.license_key = license_key.into();
        self
    }

    /// Ask the service for the generated code.
    ///
    /// Error messages are meant to be shown to the user as they are.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        if self.license_key.is_empty() {
            return Err(RecorderError::CodeGeneration(NO_LICENSE_KEY.to_string()));
        }

        let url = format!("{}/api/v1/generate", self.base_url);
        log::info!(
            "Requesting code for test case {} ({} step(s))",
            request.active_test_case.id,
            request.active_test_case.recorded_steps.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.license_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Code generation request to {} failed: {}", url, e);
                RecorderError::CodeGeneration(CONNECT_ERROR.to_string())
            })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            log::error!("Code generation server sent an unreadable body ({}): {}", status, e);
            RecorderError::CodeGeneration(format!("Invalid response from server: {}", e))
        })?;

        if !status.is_success() {
            let message = body
                .get("detail")
                .or_else(|| body.get("error"))
                .filter(|v| !v.is_null())
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| SERVER_ERROR.to_string());
            log::warn!("Code generation failed with {}: {}", status, message);
            return Err(RecorderError::CodeGeneration(message));
        }

        body.get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RecorderError::CodeGeneration("Invalid response from server: missing 'code'".to_string())
            })
    }
}
