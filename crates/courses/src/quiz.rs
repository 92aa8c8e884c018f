use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use studyhub_core::{CourseId, DomainError, DomainResult, Entity, MaterialId, QuizId, UserId};

use crate::material::Material;

/// Prefix of every quiz title created at upload time.
pub const PREGENERATED_QUIZ_PREFIX: &str = "pregenerated-quiz-";

/// Number of questions requested for a pregenerated quiz.
pub const DEFAULT_QUESTION_COUNT: u32 = 20;

/// Title of the quiz pregenerated for a material with this file name.
///
/// The format is part of the external contract and must not change.
pub fn pregenerated_quiz_title(file_name: &str) -> String {
    format!("{PREGENERATED_QUIZ_PREFIX}{file_name}")
}

/// Where question generation stands for a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Job submitted (or about to be); no questions yet.
    Pending,
    Ready,
    /// Generation gave up; `Quiz::generation_error` says why.
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Ready => "ready",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!("unknown generation status '{other}'"))),
        }
    }
}

/// A generated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_text: String,
    pub choices: Vec<String>,
    /// Index into `choices`.
    pub correct_choice: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    pub fn validate(&self) -> DomainResult<()> {
        if self.question_text.trim().is_empty() {
            return Err(DomainError::validation("question_text cannot be empty"));
        }
        if self.choices.len() < 2 {
            return Err(DomainError::validation("a question needs at least two choices"));
        }
        if self.correct_choice >= self.choices.len() {
            return Err(DomainError::validation("correct_choice is out of range"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub course_id: CourseId,
    pub quiz_title: String,
    /// Pregeneration is active for this quiz. Says nothing about whether the
    /// questions exist yet; see `generation_status`.
    pub is_generated: bool,
    pub number_of_questions: u32,
    pub material_ids: Vec<MaterialId>,
    /// Material whose upload created this quiz, if any.
    pub source_material_id: Option<MaterialId>,
    pub questions: Vec<Question>,
    pub generation_status: GenerationStatus,
    pub generation_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    pub fn create(new: NewQuiz, now: DateTime<Utc>) -> Self {
        Self {
            id: QuizId::new(),
            course_id: new.course_id,
            quiz_title: new.quiz_title,
            is_generated: new.is_generated,
            number_of_questions: new.number_of_questions,
            material_ids: Vec::new(),
            source_material_id: new.source_material_id,
            questions: Vec::new(),
            generation_status: GenerationStatus::Pending,
            generation_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn references(&self, material_id: MaterialId) -> bool {
        self.material_ids.contains(&material_id)
    }

    /// Add a material to the quiz's material set.
    ///
    /// Both records must belong to the same course. Attaching twice is a no-op.
    pub fn attach(&mut self, material: &Material, now: DateTime<Utc>) -> DomainResult<()> {
        if material.course_id != self.course_id {
            return Err(DomainError::invariant(format!(
                "material {} belongs to course {}, quiz {} to course {}",
                material.id, material.course_id, self.id, self.course_id
            )));
        }
        if !self.references(material.id) {
            self.material_ids.push(material.id);
            self.updated_at = now;
        }
        Ok(())
    }

    /// Whether deleting `material` must also delete this quiz.
    ///
    /// Quizzes carry an explicit link to the material that triggered them.
    /// Rows without that link fall back to the derived title, scoped to the
    /// material's course.
    pub fn belongs_to_material(&self, material: &Material, derived_title: &str) -> bool {
        if self.course_id != material.course_id {
            return false;
        }
        match self.source_material_id {
            Some(source) => source == material.id,
            None => self.quiz_title == derived_title,
        }
    }

    pub fn store_questions(&mut self, questions: Vec<Question>, now: DateTime<Utc>) {
        self.questions = questions;
        self.generation_status = GenerationStatus::Ready;
        self.generation_error = None;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.generation_status = GenerationStatus::Failed;
        self.generation_error = Some(error.into());
        self.updated_at = now;
    }
}

impl Entity for Quiz {
    type Id = QuizId;

    fn id(&self) -> QuizId {
        self.id
    }
}

/// A quiz together with the owner of its course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedQuiz {
    pub quiz: Quiz,
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuiz {
    pub course_id: CourseId,
    pub quiz_title: String,
    pub is_generated: bool,
    pub number_of_questions: u32,
    pub source_material_id: Option<MaterialId>,
}

impl NewQuiz {
    /// Placeholder quiz for a freshly uploaded material.
    pub fn pregenerated(material: &Material) -> Self {
        Self {
            course_id: material.course_id,
            quiz_title: pregenerated_quiz_title(&material.file_name),
            is_generated: true,
            number_of_questions: DEFAULT_QUESTION_COUNT,
            source_material_id: Some(material.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::NewMaterial;
    use proptest::prelude::*;

    fn material_in(course_id: CourseId, file_name: &str) -> Material {
        let new = NewMaterial::new("2025-06-05T08:55:05_Concurrency", file_name, "application/pdf", 1024)
            .unwrap();
        Material::create(course_id, new, Utc::now())
    }

    #[test]
    fn title_matches_naming_convention() {
        assert_eq!(
            pregenerated_quiz_title("test_material.pdf"),
            "pregenerated-quiz-test_material.pdf"
        );
    }

    #[test]
    fn pregenerated_quiz_defaults() {
        let material = material_in(CourseId::new(), "test_material.pdf");
        let quiz = Quiz::create(NewQuiz::pregenerated(&material), Utc::now());

        assert_eq!(quiz.quiz_title, "pregenerated-quiz-test_material.pdf");
        assert!(quiz.is_generated);
        assert_eq!(quiz.number_of_questions, 20);
        assert_eq!(quiz.source_material_id, Some(material.id));
        assert_eq!(quiz.generation_status, GenerationStatus::Pending);
        assert!(quiz.material_ids.is_empty());
    }

    #[test]
    fn attach_rejects_material_from_other_course() {
        let material = material_in(CourseId::new(), "a.pdf");
        let mut quiz = Quiz::create(NewQuiz::pregenerated(&material), Utc::now());

        let foreign = material_in(CourseId::new(), "b.pdf");
        let err = quiz.attach(&foreign, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(quiz.material_ids.is_empty());
    }

    #[test]
    fn attach_is_idempotent() {
        let material = material_in(CourseId::new(), "a.pdf");
        let mut quiz = Quiz::create(NewQuiz::pregenerated(&material), Utc::now());

        quiz.attach(&material, Utc::now()).unwrap();
        quiz.attach(&material, Utc::now()).unwrap();
        assert_eq!(quiz.material_ids, vec![material.id]);
    }

    #[test]
    fn linked_quiz_is_matched_by_source_not_title() {
        let course = CourseId::new();
        let first = material_in(course, "notes.pdf");
        let second = material_in(course, "notes.pdf");
        let quiz = Quiz::create(NewQuiz::pregenerated(&first), Utc::now());
        let title = pregenerated_quiz_title("notes.pdf");

        assert!(quiz.belongs_to_material(&first, &title));
        // Same file name, different upload.
        assert!(!quiz.belongs_to_material(&second, &title));
    }

    #[test]
    fn unlinked_quiz_falls_back_to_title_within_course() {
        let course = CourseId::new();
        let material = material_in(course, "notes.pdf");
        let title = pregenerated_quiz_title("notes.pdf");
        let legacy = Quiz::create(
            NewQuiz {
                course_id: course,
                quiz_title: title.clone(),
                is_generated: true,
                number_of_questions: DEFAULT_QUESTION_COUNT,
                source_material_id: None,
            },
            Utc::now(),
        );
        assert!(legacy.belongs_to_material(&material, &title));

        let elsewhere = material_in(CourseId::new(), "notes.pdf");
        assert!(!legacy.belongs_to_material(&elsewhere, &title));
    }

    #[test]
    fn question_validation() {
        let mut q = Question {
            question_text: "What is a mutex?".into(),
            choices: vec!["A lock".into(), "A queue".into()],
            correct_choice: 0,
            explanation: None,
        };
        assert!(q.validate().is_ok());

        q.correct_choice = 2;
        assert!(q.validate().is_err());

        q.correct_choice = 0;
        q.choices.truncate(1);
        assert!(q.validate().is_err());
    }

    #[test]
    fn storing_questions_clears_failure() {
        let material = material_in(CourseId::new(), "a.pdf");
        let mut quiz = Quiz::create(NewQuiz::pregenerated(&material), Utc::now());

        quiz.mark_failed("generator unavailable", Utc::now());
        assert_eq!(quiz.generation_status, GenerationStatus::Failed);

        quiz.store_questions(Vec::new(), Utc::now());
        assert_eq!(quiz.generation_status, GenerationStatus::Ready);
        assert!(quiz.generation_error.is_none());
    }

    #[test]
    fn generation_status_parses_its_own_names() {
        for status in [GenerationStatus::Pending, GenerationStatus::Ready, GenerationStatus::Failed] {
            assert_eq!(GenerationStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(GenerationStatus::parse("done").is_err());
    }

    proptest! {
        #[test]
        fn title_is_prefix_plus_file_name(name in ".{1,64}") {
            let title = pregenerated_quiz_title(&name);
            prop_assert!(title.starts_with(PREGENERATED_QUIZ_PREFIX));
            prop_assert_eq!(&title[PREGENERATED_QUIZ_PREFIX.len()..], name.as_str());
        }
    }
}
