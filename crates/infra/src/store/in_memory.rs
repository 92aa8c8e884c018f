use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use studyhub_core::{CourseId, Entity, MaterialId, QuizId, UserId};
use studyhub_courses::{
    Course, CoursePatch, Material, MaterialPatch, NewCourse, NewMaterial, NewQuiz, OwnedMaterial,
    OwnedQuiz, Question, Quiz,
};

use super::{DeletedMaterial, ResourceStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    // Insertion-ordered; lists are returned oldest first.
    courses: Vec<Course>,
    materials: Vec<Material>,
    quizzes: Vec<Quiz>,
}

impl Tables {
    fn course(&self, id: CourseId) -> Option<&Course> {
        find(&self.courses, id)
    }

    fn owner_of(&self, course_id: CourseId) -> StoreResult<UserId> {
        self.course(course_id)
            .map(|c| c.owner_id)
            .ok_or_else(|| StoreError::Invariant(format!("course {course_id} is missing")))
    }

    fn material(&self, id: MaterialId) -> Option<&Material> {
        find(&self.materials, id)
    }

    fn quiz_mut(&mut self, id: QuizId) -> Option<&mut Quiz> {
        find_mut(&mut self.quizzes, id)
    }
}

fn find<E: Entity>(rows: &[E], id: E::Id) -> Option<&E> {
    rows.iter().find(|row| row.id() == id)
}

fn find_mut<E: Entity>(rows: &mut [E], id: E::Id) -> Option<&mut E> {
    rows.iter_mut().find(|row| row.id() == id)
}

/// Store backed by process memory.
///
/// Intended for tests/dev. One lock over all tables, so every operation is
/// atomic with respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    tables: RwLock<Tables>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn create_course(&self, owner_id: UserId, new: NewCourse) -> StoreResult<Course> {
        let course = Course::create(owner_id, new, Utc::now());
        self.write()?.courses.push(course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        Ok(self.read()?.course(id).cloned())
    }

    async fn list_courses(&self, owner_id: UserId) -> StoreResult<Vec<Course>> {
        Ok(self
            .read()?
            .courses
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_course(&self, id: CourseId, patch: CoursePatch) -> StoreResult<Option<Course>> {
        let mut tables = self.write()?;
        Ok(find_mut(&mut tables.courses, id).map(|course| {
            course.apply_patch(patch, Utc::now());
            course.clone()
        }))
    }

    async fn create_material(&self, course_id: CourseId, new: NewMaterial) -> StoreResult<Material> {
        let mut tables = self.write()?;
        if tables.course(course_id).is_none() {
            return Err(StoreError::NotFound);
        }
        let material = Material::create(course_id, new, Utc::now());
        tables.materials.push(material.clone());
        Ok(material)
    }

    async fn get_material(&self, id: MaterialId) -> StoreResult<Option<OwnedMaterial>> {
        let tables = self.read()?;
        match tables.material(id) {
            Some(material) => Ok(Some(OwnedMaterial {
                owner_id: tables.owner_of(material.course_id)?,
                material: material.clone(),
            })),
            None => Ok(None),
        }
    }

    async fn list_materials(&self, course_id: CourseId) -> StoreResult<Vec<Material>> {
        Ok(self
            .read()?
            .materials
            .iter()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn update_material(&self, id: MaterialId, patch: MaterialPatch) -> StoreResult<Option<Material>> {
        let mut tables = self.write()?;
        Ok(find_mut(&mut tables.materials, id).map(|material| {
            material.apply_patch(patch);
            material.clone()
        }))
    }

    async fn create_quiz(&self, new: NewQuiz) -> StoreResult<Quiz> {
        let mut tables = self.write()?;
        if tables.course(new.course_id).is_none() {
            return Err(StoreError::NotFound);
        }
        let quiz = Quiz::create(new, Utc::now());
        tables.quizzes.push(quiz.clone());
        Ok(quiz)
    }

    async fn attach_material(&self, quiz_id: QuizId, material_id: MaterialId) -> StoreResult<Quiz> {
        let mut tables = self.write()?;
        let material = tables.material(material_id).cloned().ok_or(StoreError::NotFound)?;
        let quiz = tables.quiz_mut(quiz_id).ok_or(StoreError::NotFound)?;
        quiz.attach(&material, Utc::now())?;
        Ok(quiz.clone())
    }

    async fn get_quiz(&self, id: QuizId) -> StoreResult<Option<OwnedQuiz>> {
        let tables = self.read()?;
        match find(&tables.quizzes, id) {
            Some(quiz) => Ok(Some(OwnedQuiz {
                owner_id: tables.owner_of(quiz.course_id)?,
                quiz: quiz.clone(),
            })),
            None => Ok(None),
        }
    }

    async fn list_quizzes(&self, course_id: CourseId) -> StoreResult<Vec<Quiz>> {
        Ok(self
            .read()?
            .quizzes
            .iter()
            .filter(|q| q.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn delete_material_cascade(
        &self,
        id: MaterialId,
        derived_title: &str,
    ) -> StoreResult<Option<DeletedMaterial>> {
        let mut tables = self.write()?;
        let Some(pos) = tables.materials.iter().position(|m| m.id == id) else {
            return Ok(None);
        };
        let owner_id = tables.owner_of(tables.materials[pos].course_id)?;
        let material = tables.materials.remove(pos);

        let mut deleted_quiz_ids = Vec::new();
        tables.quizzes.retain(|quiz| {
            if quiz.belongs_to_material(&material, derived_title) {
                deleted_quiz_ids.push(quiz.id);
                false
            } else {
                true
            }
        });

        // Surviving quizzes stop referencing the material.
        let now = Utc::now();
        for quiz in tables.quizzes.iter_mut().filter(|q| q.references(id)) {
            quiz.material_ids.retain(|m| *m != id);
            quiz.updated_at = now;
        }

        Ok(Some(DeletedMaterial {
            material,
            owner_id,
            deleted_quiz_ids,
        }))
    }

    async fn delete_quizzes_by_title(&self, course_id: CourseId, title: &str) -> StoreResult<Vec<QuizId>> {
        let mut tables = self.write()?;
        let mut deleted = Vec::new();
        tables.quizzes.retain(|quiz| {
            let orphan =
                quiz.course_id == course_id && quiz.quiz_title == title && quiz.material_ids.is_empty();
            if orphan {
                deleted.push(quiz.id);
            }
            !orphan
        });
        Ok(deleted)
    }

    async fn store_generated_questions(&self, quiz_id: QuizId, questions: Vec<Question>) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.quiz_mut(quiz_id) {
            Some(quiz) => {
                quiz.store_questions(questions, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_generation_failed(&self, quiz_id: QuizId, error: &str) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.quiz_mut(quiz_id) {
            Some(quiz) => {
                quiz.mark_failed(error, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
