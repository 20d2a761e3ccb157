//! Typed client for the score-analysis backend
//!
//! One method per endpoint. Nothing musical is validated here: the backend
//! owns analysis semantics, this layer owns transport and the error-field
//! convention.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::{decode_checked, fetch_bytes, fetch_text, fetch_value, json_request, ClientError};
use crate::models::{
    Agent, AnalysisReport, AnalysisRequest, AppSettings, ComparisonData, Instrument,
    PianoRollData, ScoreSummary,
};

#[derive(Serialize, Debug)]
struct FilePathRequest<'a> {
    file_path: &'a str,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    message: &'a str,
    agent_type: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize, Debug)]
struct AiAnalysisRequest<'a> {
    piano_roll_data: &'a [Instrument],
    prompt: &'a str,
    agent_type: &'a str,
}

#[derive(Deserialize, Debug)]
struct AiAnalysisResponse {
    analysis_result: String,
}

#[derive(Serialize, Debug)]
struct AdvancedAnalysisRequest<'a> {
    file_path: &'a str,
    analysis_type: &'a str,
}

#[derive(Serialize, Debug)]
struct InstrumentMarkupRequest<'a> {
    file_path: &'a str,
    instrument_index: usize,
    start_measure: u32,
    end_measure: u32,
}

#[derive(Serialize, Debug)]
struct CombinedMarkupRequest<'a> {
    file_path: &'a str,
    instrument_indices: &'a [usize],
    start_measure: u32,
    end_measure: u32,
}

#[derive(Deserialize, Debug)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    message: String,
}

impl StatusResponse {
    fn into_result(self) -> Result<(), ClientError> {
        if self.status == "success" {
            Ok(())
        } else if self.message.is_empty() {
            Err(ClientError::Upstream(self.status))
        } else {
            Err(ClientError::Upstream(self.message))
        }
    }
}

/// Client for the analysis backend, rooted at one base URL.
#[derive(Clone, Debug)]
pub struct BackendClient {
    base_url: String,
}

impl BackendClient {
    /// `base_url` may be empty (same-origin paths) or an absolute origin;
    /// trailing slashes are dropped either way.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_value<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, ClientError> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        fetch_value(json_request("POST", &self.url(path), Some(&body))?).await
    }

    /// `POST /upload` with the score file as multipart form data. The
    /// browser supplies the multipart boundary, so no content type is set
    /// here.
    pub async fn upload(&self, file: &web_sys::File) -> Result<ScoreSummary, ClientError> {
        let form = web_sys::FormData::new()
            .map_err(|_| ClientError::Network("could not build form data".to_string()))?;
        form.append_with_blob("file", file)
            .map_err(|_| ClientError::Network("could not attach file".to_string()))?;

        let opts = web_sys::RequestInit::new();
        opts.set_method("POST");
        opts.set_body(form.as_ref());
        let request = web_sys::Request::new_with_str_and_init(&self.url("/upload"), &opts)
            .map_err(|_| ClientError::Network("could not build upload request".to_string()))?;

        decode_checked(fetch_value(request).await?)
    }

    /// `POST /analyze`
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, ClientError> {
        decode_checked(self.post_value("/analyze", request).await?)
    }

    /// `POST /api/piano_roll`
    pub async fn piano_roll(&self, file_path: &str) -> Result<PianoRollData, ClientError> {
        let value = self
            .post_value("/api/piano_roll", &FilePathRequest { file_path })
            .await?;
        decode_checked::<PianoRollData>(value).map(PianoRollData::normalize)
    }

    /// `POST /comparison_data`
    pub async fn comparison_data(&self, file_path: &str) -> Result<ComparisonData, ClientError> {
        let value = self
            .post_value("/comparison_data", &FilePathRequest { file_path })
            .await?;
        decode_checked::<ComparisonData>(value).map(ComparisonData::normalize)
    }

    /// `POST /get_instrument_musicxml`: markup for one instrument cut to a
    /// measure range, for the high-fidelity engine.
    pub async fn instrument_markup(
        &self,
        file_path: &str,
        instrument_index: usize,
        start_measure: u32,
        end_measure: u32,
    ) -> Result<String, ClientError> {
        let body = serde_json::to_value(InstrumentMarkupRequest {
            file_path,
            instrument_index,
            start_measure,
            end_measure,
        })
        .map_err(|e| ClientError::Decode(e.to_string()))?;
        fetch_text(json_request(
            "POST",
            &self.url("/get_instrument_musicxml"),
            Some(&body),
        )?)
        .await
    }

    /// `POST /get_combined_musicxml`: one markup document combining
    /// several instruments over a measure range.
    pub async fn combined_markup(
        &self,
        file_path: &str,
        instrument_indices: &[usize],
        start_measure: u32,
        end_measure: u32,
    ) -> Result<String, ClientError> {
        let body = serde_json::to_value(CombinedMarkupRequest {
            file_path,
            instrument_indices,
            start_measure,
            end_measure,
        })
        .map_err(|e| ClientError::Decode(e.to_string()))?;
        fetch_text(json_request(
            "POST",
            &self.url("/get_combined_musicxml"),
            Some(&body),
        )?)
        .await
    }

    /// `GET /settings`
    pub async fn settings(&self) -> Result<AppSettings, ClientError> {
        decode_checked(fetch_value(json_request("GET", &self.url("/settings"), None)?).await?)
    }

    /// `POST /settings`
    pub async fn save_settings(&self, settings: &AppSettings) -> Result<(), ClientError> {
        let value = self.post_value("/settings", settings).await?;
        decode_checked::<StatusResponse>(value)?.into_result()
    }

    /// `GET /api/prompts`
    pub async fn prompts(&self) -> Result<BTreeMap<String, String>, ClientError> {
        decode_checked(fetch_value(json_request("GET", &self.url("/api/prompts"), None)?).await?)
    }

    /// `POST /api/prompts`
    pub async fn save_prompts(
        &self,
        prompts: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        let value = self.post_value("/api/prompts", prompts).await?;
        decode_checked::<StatusResponse>(value)?.into_result()
    }

    /// `POST /api/chat`: server-mediated chat turn.
    pub async fn chat(&self, message: &str, agent: Agent) -> Result<String, ClientError> {
        let value = self
            .post_value(
                "/api/chat",
                &ChatRequest {
                    message,
                    agent_type: agent.as_str(),
                },
            )
            .await?;
        decode_checked::<ChatResponse>(value).map(|r| r.response)
    }

    /// `POST /api/analyze_with_ai`: note digest plus prompt, answered by
    /// the configured agent.
    pub async fn analyze_with_ai(
        &self,
        piano_roll_data: &[Instrument],
        prompt: &str,
        agent: Agent,
    ) -> Result<String, ClientError> {
        let value = self
            .post_value(
                "/api/analyze_with_ai",
                &AiAnalysisRequest {
                    piano_roll_data,
                    prompt,
                    agent_type: agent.as_str(),
                },
            )
            .await?;
        decode_checked::<AiAnalysisResponse>(value).map(|r| r.analysis_result)
    }

    /// `POST /api/advanced-analysis`: one analysis type per call; the
    /// response shape varies by type and is passed through untyped.
    pub async fn advanced_analysis(
        &self,
        file_path: &str,
        analysis_type: &str,
    ) -> Result<serde_json::Value, ClientError> {
        let value = self
            .post_value(
                "/api/advanced-analysis",
                &AdvancedAnalysisRequest {
                    file_path,
                    analysis_type,
                },
            )
            .await?;
        if let Some(message) = crate::client::error_message(&value) {
            return Err(ClientError::Upstream(message));
        }
        Ok(value)
    }

    /// `POST /download_report`: the assembled report as a plain-text file.
    pub async fn download_report(&self, report: &AnalysisReport) -> Result<Vec<u8>, ClientError> {
        let body = serde_json::to_value(report).map_err(|e| ClientError::Decode(e.to_string()))?;
        fetch_bytes(json_request("POST", &self.url("/download_report"), Some(&body))?).await
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new("")
    }
}
