use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use studyhub_courses::Question;

use crate::external::{GenerationRequest, MaterialSource, QuestionGenerator};
use crate::jobs::{GenerateQuestionsPayload, Job, JobHandler, JobResult};
use crate::store::ResourceStore;

/// Fills a placeholder quiz with generated questions.
///
/// The quiz may have been deleted since the job was submitted; the result is
/// then dropped and the job completes. After the last allowed attempt fails,
/// the quiz is marked `failed` so it does not stay pending forever.
pub struct QuestionGenerationWorker {
    store: Arc<dyn ResourceStore>,
    generator: Arc<dyn QuestionGenerator>,
}

impl QuestionGenerationWorker {
    pub fn new(store: Arc<dyn ResourceStore>, generator: Arc<dyn QuestionGenerator>) -> Self {
        Self { store, generator }
    }

    async fn run(&self, job: &Job, payload: GenerateQuestionsPayload) -> Result<JobResult, String> {
        let Some(owned) = self.store.get_quiz(payload.quiz_id).await.map_err(|e| e.to_string())? else {
            return Ok(JobResult::Discarded(format!("quiz {} no longer exists", payload.quiz_id)));
        };
        let quiz = owned.quiz;

        let mut materials = Vec::with_capacity(quiz.material_ids.len());
        for material_id in &quiz.material_ids {
            if let Some(m) = self.store.get_material(*material_id).await.map_err(|e| e.to_string())? {
                materials.push(MaterialSource::from(&m.material));
            }
        }

        let request = GenerationRequest {
            quiz_id: quiz.id,
            quiz_title: quiz.quiz_title.clone(),
            number_of_questions: payload.number_of_questions,
            materials,
        };
        let generated = self.generator.generate(&request).await.map_err(|e| e.to_string())?;
        let questions = accept_questions(generated, payload.number_of_questions);
        if questions.is_empty() && payload.number_of_questions > 0 {
            return Err("generator returned no valid questions".to_string());
        }

        let count = questions.len();
        if self
            .store
            .store_generated_questions(quiz.id, questions)
            .await
            .map_err(|e| e.to_string())?
        {
            info!(job_id = %job.id, quiz_id = %quiz.id, count, "questions stored");
            Ok(JobResult::Success)
        } else {
            Ok(JobResult::Discarded(format!("quiz {} deleted during generation", quiz.id)))
        }
    }
}

/// Valid questions only, at most `limit`.
fn accept_questions(generated: Vec<Question>, limit: u32) -> Vec<Question> {
    let total = generated.len();
    let accepted: Vec<Question> = generated
        .into_iter()
        .filter(|q| q.validate().is_ok())
        .take(limit as usize)
        .collect();
    if accepted.len() < total.min(limit as usize) {
        warn!(accepted = accepted.len(), total, "dropped invalid generated questions");
    }
    accepted
}

#[async_trait]
impl JobHandler for QuestionGenerationWorker {
    async fn handle(&self, job: &Job) -> JobResult {
        let payload: GenerateQuestionsPayload = match job.payload_as() {
            Ok(p) => p,
            Err(e) => return JobResult::Discarded(format!("malformed payload: {e}")),
        };
        let quiz_id = payload.quiz_id;

        match self.run(job, payload).await {
            Ok(result) => result,
            Err(error) => {
                if job.is_final_attempt() {
                    warn!(job_id = %job.id, quiz_id = %quiz_id, error = %error, "question generation gave up");
                    if let Err(e) = self.store.mark_generation_failed(quiz_id, &error).await {
                        warn!(quiz_id = %quiz_id, error = %e, "could not mark quiz as failed");
                    }
                }
                JobResult::Failure(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, StaticQuestionGenerator};
    use crate::jobs::{JobKind, RetryPolicy};
    use crate::store::InMemoryResourceStore;
    use studyhub_core::{QuizId, UserId};
    use studyhub_courses::{GenerationStatus, NewCourse, NewMaterial, NewQuiz, Quiz};

    struct Unavailable;

    #[async_trait]
    impl QuestionGenerator for Unavailable {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Vec<Question>, ExternalError> {
            Err(ExternalError::Network("connection refused".into()))
        }
    }

    async fn seeded_quiz(store: &InMemoryResourceStore) -> Quiz {
        let course = store
            .create_course(UserId::new(), NewCourse::new("Test Course", "TEST", 5).unwrap())
            .await
            .unwrap();
        let material = store
            .create_material(course.id, NewMaterial::new("ref", "notes.pdf", "application/pdf", 10).unwrap())
            .await
            .unwrap();
        let quiz = store.create_quiz(NewQuiz::pregenerated(&material)).await.unwrap();
        store.attach_material(quiz.id, material.id).await.unwrap()
    }

    fn running_job(quiz_id: QuizId, policy: RetryPolicy) -> Job {
        let payload = GenerateQuestionsPayload {
            quiz_id,
            number_of_questions: 20,
        };
        let mut job = Job::new(JobKind::QuestionGeneration, serde_json::to_value(payload).unwrap())
            .with_retry_policy(policy);
        job.mark_running();
        job
    }

    #[tokio::test]
    async fn stores_generated_questions() {
        let store = Arc::new(InMemoryResourceStore::new());
        let quiz = seeded_quiz(&store).await;
        let worker = QuestionGenerationWorker::new(store.clone(), Arc::new(StaticQuestionGenerator));

        let result = worker.handle(&running_job(quiz.id, RetryPolicy::default())).await;
        assert_eq!(result, JobResult::Success);

        let quiz = store.get_quiz(quiz.id).await.unwrap().unwrap().quiz;
        assert_eq!(quiz.generation_status, GenerationStatus::Ready);
        assert_eq!(quiz.questions.len(), 20);
    }

    #[tokio::test]
    async fn deleted_quiz_is_discarded() {
        let store = Arc::new(InMemoryResourceStore::new());
        let worker = QuestionGenerationWorker::new(store, Arc::new(StaticQuestionGenerator));

        let result = worker.handle(&running_job(QuizId::new(), RetryPolicy::default())).await;
        assert!(matches!(result, JobResult::Discarded(_)));
    }

    #[tokio::test]
    async fn failure_before_last_attempt_keeps_quiz_pending() {
        let store = Arc::new(InMemoryResourceStore::new());
        let quiz = seeded_quiz(&store).await;
        let worker = QuestionGenerationWorker::new(store.clone(), Arc::new(Unavailable));

        let result = worker.handle(&running_job(quiz.id, RetryPolicy::default())).await;
        assert!(matches!(result, JobResult::Failure(_)));

        let quiz = store.get_quiz(quiz.id).await.unwrap().unwrap().quiz;
        assert_eq!(quiz.generation_status, GenerationStatus::Pending);
    }

    #[tokio::test]
    async fn final_failure_marks_quiz_failed() {
        let store = Arc::new(InMemoryResourceStore::new());
        let quiz = seeded_quiz(&store).await;
        let worker = QuestionGenerationWorker::new(store.clone(), Arc::new(Unavailable));

        let result = worker.handle(&running_job(quiz.id, RetryPolicy::no_retry())).await;
        assert!(matches!(result, JobResult::Failure(_)));

        let quiz = store.get_quiz(quiz.id).await.unwrap().unwrap().quiz;
        assert_eq!(quiz.generation_status, GenerationStatus::Failed);
        assert!(quiz.generation_error.unwrap().contains("connection refused"));
    }

    #[test]
    fn invalid_questions_are_dropped_and_count_capped() {
        let valid = Question {
            question_text: "Q".into(),
            choices: vec!["a".into(), "b".into()],
            correct_choice: 1,
            explanation: None,
        };
        let invalid = Question {
            correct_choice: 5,
            ..valid.clone()
        };

        let accepted = accept_questions(vec![invalid, valid.clone(), valid.clone(), valid], 2);
        assert_eq!(accepted.len(), 2);
    }
}
