use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use studyhub_core::{MaterialId, QuizId};
use studyhub_courses::{Material, Question};

use super::ExternalError;

/// A material the generator should read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSource {
    pub material_id: MaterialId,
    pub file_name: String,
    pub file_type: String,
    pub material_file_url: String,
}

impl From<&Material> for MaterialSource {
    fn from(m: &Material) -> Self {
        Self {
            material_id: m.id,
            file_name: m.file_name.clone(),
            file_type: m.file_type.clone(),
            material_file_url: m.material_file_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub quiz_id: QuizId,
    pub quiz_title: String,
    pub number_of_questions: u32,
    pub materials: Vec<MaterialSource>,
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, ExternalError>;
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    questions: Vec<Question>,
}

/// Client for the question generation service (`POST {base}/generate`).
#[derive(Debug, Clone)]
pub struct HttpQuestionGenerator {
    http_client: Client,
    endpoint: String,
}

impl HttpQuestionGenerator {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ExternalError> {
        // Generation over a full document is slow.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ExternalError::Configuration(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/generate", base_url.as_ref().trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl QuestionGenerator for HttpQuestionGenerator {
    #[instrument(skip(self, request), fields(quiz_id = %request.quiz_id, count = request.number_of_questions), err)]
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, ExternalError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ExternalError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Parse(e.to_string()))?;
        Ok(parsed.questions)
    }
}

/// Deterministic placeholder questions, for development and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticQuestionGenerator;

#[async_trait]
impl QuestionGenerator for StaticQuestionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Question>, ExternalError> {
        let source = request
            .materials
            .first()
            .map(|m| m.file_name.as_str())
            .unwrap_or(request.quiz_title.as_str());

        Ok((1..=request.number_of_questions)
            .map(|i| Question {
                question_text: format!("Question {i} about {source}"),
                choices: vec![
                    format!("Statement {i}.A"),
                    format!("Statement {i}.B"),
                    format!("Statement {i}.C"),
                    format!("Statement {i}.D"),
                ],
                correct_choice: (i as usize) % 4,
                explanation: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(count: u32) -> GenerationRequest {
        GenerationRequest {
            quiz_id: QuizId::new(),
            quiz_title: "pregenerated-quiz-notes.pdf".into(),
            number_of_questions: count,
            materials: vec![MaterialSource {
                material_id: MaterialId::new(),
                file_name: "notes.pdf".into(),
                file_type: "application/pdf".into(),
                material_file_url: "ref".into(),
            }],
        }
    }

    #[tokio::test]
    async fn static_generator_yields_requested_count_of_valid_questions() {
        let questions = StaticQuestionGenerator.generate(&request(20)).await.unwrap();
        assert_eq!(questions.len(), 20);
        assert!(questions.iter().all(|q| q.validate().is_ok()));
        assert!(questions[0].question_text.contains("notes.pdf"));
    }

    #[test]
    fn http_generator_endpoint() {
        let generator = HttpQuestionGenerator::new("http://gen.local/").unwrap();
        assert_eq!(generator.endpoint, "http://gen.local/generate");
    }
}
