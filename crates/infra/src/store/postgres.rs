//! Postgres-backed resource store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (foreign key violation) | `23503` | `NotFound` (missing parent row) |
//! | Database (check constraint violation) | `23514` | `Invariant` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Other | N/A | `Backend` |
//!
//! The material cascade runs in one transaction: quizzes linked to the
//! material and the material row are deleted together or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use studyhub_core::{CourseId, MaterialId, QuizId, UserId};
use studyhub_courses::{
    Course, CoursePatch, CourseUnits, GenerationStatus, Material, MaterialPatch, NewCourse, NewMaterial,
    NewQuiz, OwnedMaterial, OwnedQuiz, Question, Quiz,
};

use super::{DeletedMaterial, ResourceStore, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const COURSE_COLUMNS: &str =
    "id, owner_id, course_name, course_code, course_units, created_at, updated_at";
const MATERIAL_COLUMNS: &str =
    "m.id, m.course_id, m.material_file_url, m.file_name, m.file_type, m.file_size, m.uploaded_at";
const QUIZ_COLUMNS: &str = "q.id, q.course_id, q.quiz_title, q.is_generated, q.number_of_questions, \
     q.source_material_id, q.questions, q.generation_status, q.generation_error, q.created_at, q.updated_at";

#[derive(Debug, Clone)]
pub struct PostgresResourceStore {
    pool: Arc<PgPool>,
}

impl PostgresResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the idempotent schema script.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl ResourceStore for PostgresResourceStore {
    #[instrument(skip(self, new), fields(owner_id = %owner_id), err)]
    async fn create_course(&self, owner_id: UserId, new: NewCourse) -> StoreResult<Course> {
        let course = Course::create(owner_id, new, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO courses (id, owner_id, course_name, course_code, course_units, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(course.owner_id.as_uuid())
        .bind(&course.course_name)
        .bind(&course.course_code)
        .bind(i32::from(course.course_units.get()))
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_course", e))?;

        Ok(course)
    }

    #[instrument(skip(self), fields(course_id = %id), err)]
    async fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_course", e))?;

        row.as_ref().map(course_from_row).transpose()
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn list_courses(&self, owner_id: UserId) -> StoreResult<Vec<Course>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE owner_id = $1 ORDER BY created_at, id"
        ))
        .bind(owner_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_courses", e))?;

        rows.iter().map(course_from_row).collect()
    }

    #[instrument(skip(self, patch), fields(course_id = %id), err)]
    async fn update_course(&self, id: CourseId, patch: CoursePatch) -> StoreResult<Option<Course>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE courses SET
                course_name = COALESCE($2, course_name),
                course_code = COALESCE($3, course_code),
                course_units = COALESCE($4, course_units),
                updated_at = $5
            WHERE id = $1
            RETURNING {COURSE_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.course_name)
        .bind(patch.course_code)
        .bind(patch.course_units.map(|u| i32::from(u.get())))
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_course", e))?;

        row.as_ref().map(course_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(course_id = %course_id), err)]
    async fn create_material(&self, course_id: CourseId, new: NewMaterial) -> StoreResult<Material> {
        let material = Material::create(course_id, new, Utc::now());

        // A missing course surfaces as a foreign key violation -> NotFound.
        sqlx::query(
            r#"
            INSERT INTO materials (id, course_id, material_file_url, file_name, file_type, file_size, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(material.id.as_uuid())
        .bind(material.course_id.as_uuid())
        .bind(&material.material_file_url)
        .bind(&material.file_name)
        .bind(&material.file_type)
        .bind(to_i64(material.file_size, "file_size")?)
        .bind(material.uploaded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_material", e))?;

        Ok(material)
    }

    #[instrument(skip(self), fields(material_id = %id), err)]
    async fn get_material(&self, id: MaterialId) -> StoreResult<Option<OwnedMaterial>> {
        let mut conn = self.conn().await?;
        fetch_owned_material(&mut conn, id, false).await
    }

    #[instrument(skip(self), fields(course_id = %course_id), err)]
    async fn list_materials(&self, course_id: CourseId) -> StoreResult<Vec<Material>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials m WHERE m.course_id = $1 ORDER BY m.uploaded_at, m.id"
        ))
        .bind(course_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_materials", e))?;

        rows.iter().map(material_from_row).collect()
    }

    #[instrument(skip(self, patch), fields(material_id = %id), err)]
    async fn update_material(&self, id: MaterialId, patch: MaterialPatch) -> StoreResult<Option<Material>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE materials m SET
                file_name = COALESCE($2, m.file_name),
                file_type = COALESCE($3, m.file_type)
            WHERE m.id = $1
            RETURNING {MATERIAL_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.file_name)
        .bind(patch.file_type)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_material", e))?;

        row.as_ref().map(material_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(course_id = %new.course_id, quiz_title = %new.quiz_title), err)]
    async fn create_quiz(&self, new: NewQuiz) -> StoreResult<Quiz> {
        let quiz = Quiz::create(new, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO quizzes (
                id, course_id, quiz_title, is_generated, number_of_questions, source_material_id,
                questions, generation_status, generation_error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(quiz.id.as_uuid())
        .bind(quiz.course_id.as_uuid())
        .bind(&quiz.quiz_title)
        .bind(quiz.is_generated)
        .bind(to_i32(quiz.number_of_questions)?)
        .bind(quiz.source_material_id.map(|m| *m.as_uuid()))
        .bind(questions_to_json(&quiz.questions)?)
        .bind(quiz.generation_status.as_str())
        .bind(quiz.generation_error.as_deref())
        .bind(quiz.created_at)
        .bind(quiz.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_quiz", e))?;

        Ok(quiz)
    }

    #[instrument(skip(self), fields(quiz_id = %quiz_id, material_id = %material_id), err)]
    async fn attach_material(&self, quiz_id: QuizId, material_id: MaterialId) -> StoreResult<Quiz> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut quiz = fetch_quiz(&mut tx, quiz_id, true).await?.ok_or(StoreError::NotFound)?.quiz;
        let material = fetch_owned_material(&mut tx, material_id, false)
            .await?
            .ok_or(StoreError::NotFound)?
            .material;

        let already = quiz.references(material_id);
        quiz.attach(&material, Utc::now())?;

        if !already {
            sqlx::query("INSERT INTO quiz_materials (quiz_id, material_id) VALUES ($1, $2)")
                .bind(quiz_id.as_uuid())
                .bind(material_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("attach_material", e))?;

            sqlx::query("UPDATE quizzes SET updated_at = $2 WHERE id = $1")
                .bind(quiz_id.as_uuid())
                .bind(quiz.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("attach_material", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(quiz)
    }

    #[instrument(skip(self), fields(quiz_id = %id), err)]
    async fn get_quiz(&self, id: QuizId) -> StoreResult<Option<OwnedQuiz>> {
        let mut conn = self.conn().await?;
        fetch_quiz(&mut conn, id, false).await
    }

    #[instrument(skip(self), fields(course_id = %course_id), err)]
    async fn list_quizzes(&self, course_id: CourseId) -> StoreResult<Vec<Quiz>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes q WHERE q.course_id = $1 ORDER BY q.created_at, q.id"
        ))
        .bind(course_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_quizzes", e))?;

        let links = sqlx::query(
            r#"
            SELECT qm.quiz_id, qm.material_id
            FROM quiz_materials qm
            JOIN quizzes q ON q.id = qm.quiz_id
            WHERE q.course_id = $1
            ORDER BY qm.position
            "#,
        )
        .bind(course_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_quizzes", e))?;

        let mut materials: HashMap<Uuid, Vec<MaterialId>> = HashMap::new();
        for link in &links {
            let quiz_id: Uuid = link.try_get("quiz_id").map_err(decode_error)?;
            let material_id: Uuid = link.try_get("material_id").map_err(decode_error)?;
            materials.entry(quiz_id).or_default().push(MaterialId::from_uuid(material_id));
        }

        rows.iter()
            .map(|row| {
                let mut quiz = quiz_from_row(row)?;
                quiz.material_ids = materials.remove(quiz.id.as_uuid()).unwrap_or_default();
                Ok(quiz)
            })
            .collect()
    }

    #[instrument(skip(self), fields(material_id = %id), err)]
    async fn delete_material_cascade(
        &self,
        id: MaterialId,
        derived_title: &str,
    ) -> StoreResult<Option<DeletedMaterial>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(OwnedMaterial { material, owner_id }) = fetch_owned_material(&mut tx, id, true).await? else {
            return Ok(None);
        };

        let deleted = sqlx::query(
            r#"
            DELETE FROM quizzes
            WHERE course_id = $1
              AND (source_material_id = $2 OR (source_material_id IS NULL AND quiz_title = $3))
            RETURNING id
            "#,
        )
        .bind(material.course_id.as_uuid())
        .bind(material.id.as_uuid())
        .bind(derived_title)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_material_cascade", e))?;

        sqlx::query(
            "UPDATE quizzes SET updated_at = $2 WHERE id IN (SELECT quiz_id FROM quiz_materials WHERE material_id = $1)",
        )
        .bind(material.id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_material_cascade", e))?;

        // quiz_materials rows go with the material (ON DELETE CASCADE).
        sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(material.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_material_cascade", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        let deleted_quiz_ids = deleted
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id").map(QuizId::from_uuid).map_err(decode_error))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(DeletedMaterial {
            material,
            owner_id,
            deleted_quiz_ids,
        }))
    }

    #[instrument(skip(self), fields(course_id = %course_id, quiz_title = %title), err)]
    async fn delete_quizzes_by_title(&self, course_id: CourseId, title: &str) -> StoreResult<Vec<QuizId>> {
        let rows = sqlx::query(
            r#"
            DELETE FROM quizzes q
            WHERE q.course_id = $1
              AND q.quiz_title = $2
              AND NOT EXISTS (SELECT 1 FROM quiz_materials qm WHERE qm.quiz_id = q.id)
            RETURNING q.id
            "#,
        )
        .bind(course_id.as_uuid())
        .bind(title)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_quizzes_by_title", e))?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("id").map(QuizId::from_uuid).map_err(decode_error))
            .collect()
    }

    #[instrument(skip(self, questions), fields(quiz_id = %quiz_id, count = questions.len()), err)]
    async fn store_generated_questions(&self, quiz_id: QuizId, questions: Vec<Question>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE quizzes
            SET questions = $2, generation_status = 'ready', generation_error = NULL, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(quiz_id.as_uuid())
        .bind(questions_to_json(&questions)?)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store_generated_questions", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(quiz_id = %quiz_id), err)]
    async fn mark_generation_failed(&self, quiz_id: QuizId, error: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE quizzes SET generation_status = 'failed', generation_error = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(quiz_id.as_uuid())
        .bind(error)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_generation_failed", e))?;

        Ok(result.rows_affected() > 0)
    }
}

async fn fetch_owned_material(
    conn: &mut PgConnection,
    id: MaterialId,
    lock: bool,
) -> StoreResult<Option<OwnedMaterial>> {
    let sql = format!(
        "SELECT {MATERIAL_COLUMNS}, c.owner_id FROM materials m JOIN courses c ON c.id = m.course_id WHERE m.id = $1{}",
        if lock { " FOR UPDATE OF m" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_material", e))?;

    match row {
        Some(row) => Ok(Some(OwnedMaterial {
            material: material_from_row(&row)?,
            owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(decode_error)?),
        })),
        None => Ok(None),
    }
}

async fn fetch_quiz(conn: &mut PgConnection, id: QuizId, lock: bool) -> StoreResult<Option<OwnedQuiz>> {
    let sql = format!(
        "SELECT {QUIZ_COLUMNS}, c.owner_id FROM quizzes q JOIN courses c ON c.id = q.course_id WHERE q.id = $1{}",
        if lock { " FOR UPDATE OF q" } else { "" }
    );
    let Some(row) = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_quiz", e))?
    else {
        return Ok(None);
    };

    let mut quiz = quiz_from_row(&row)?;
    let owner_id = UserId::from_uuid(row.try_get("owner_id").map_err(decode_error)?);

    let links = sqlx::query("SELECT material_id FROM quiz_materials WHERE quiz_id = $1 ORDER BY position")
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_quiz", e))?;
    quiz.material_ids = links
        .iter()
        .map(|r| r.try_get::<Uuid, _>("material_id").map(MaterialId::from_uuid).map_err(decode_error))
        .collect::<StoreResult<_>>()?;

    Ok(Some(OwnedQuiz { quiz, owner_id }))
}

fn course_from_row(row: &PgRow) -> StoreResult<Course> {
    let units: i32 = row.try_get("course_units").map_err(decode_error)?;
    Ok(Course {
        id: CourseId::from_uuid(row.try_get("id").map_err(decode_error)?),
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(decode_error)?),
        course_name: row.try_get("course_name").map_err(decode_error)?,
        course_code: row.try_get("course_code").map_err(decode_error)?,
        course_units: CourseUnits::new(i64::from(units))?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn material_from_row(row: &PgRow) -> StoreResult<Material> {
    let file_size: i64 = row.try_get("file_size").map_err(decode_error)?;
    Ok(Material {
        id: MaterialId::from_uuid(row.try_get("id").map_err(decode_error)?),
        course_id: CourseId::from_uuid(row.try_get("course_id").map_err(decode_error)?),
        material_file_url: row.try_get("material_file_url").map_err(decode_error)?,
        file_name: row.try_get("file_name").map_err(decode_error)?,
        file_type: row.try_get("file_type").map_err(decode_error)?,
        file_size: u64::try_from(file_size)
            .map_err(|_| StoreError::Backend(format!("negative file_size {file_size}")))?,
        uploaded_at: row.try_get::<DateTime<Utc>, _>("uploaded_at").map_err(decode_error)?,
    })
}

/// Decodes everything but `material_ids`, which live in `quiz_materials`.
fn quiz_from_row(row: &PgRow) -> StoreResult<Quiz> {
    let count: i32 = row.try_get("number_of_questions").map_err(decode_error)?;
    let questions: serde_json::Value = row.try_get("questions").map_err(decode_error)?;
    let status: String = row.try_get("generation_status").map_err(decode_error)?;
    let source: Option<Uuid> = row.try_get("source_material_id").map_err(decode_error)?;

    Ok(Quiz {
        id: QuizId::from_uuid(row.try_get("id").map_err(decode_error)?),
        course_id: CourseId::from_uuid(row.try_get("course_id").map_err(decode_error)?),
        quiz_title: row.try_get("quiz_title").map_err(decode_error)?,
        is_generated: row.try_get("is_generated").map_err(decode_error)?,
        number_of_questions: u32::try_from(count)
            .map_err(|_| StoreError::Backend(format!("negative number_of_questions {count}")))?,
        material_ids: Vec::new(),
        source_material_id: source.map(MaterialId::from_uuid),
        questions: serde_json::from_value(questions)
            .map_err(|e| StoreError::Backend(format!("failed to decode questions: {e}")))?,
        generation_status: GenerationStatus::parse(&status)?,
        generation_error: row.try_get("generation_error").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn questions_to_json(questions: &[Question]) -> StoreResult<serde_json::Value> {
    serde_json::to_value(questions).map_err(|e| StoreError::Backend(format!("failed to encode questions: {e}")))
}

fn to_i64(value: u64, field: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Invariant(format!("{field} out of range")))
}

fn to_i32(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Invariant("number_of_questions out of range".to_string()))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23503") => StoreError::NotFound,
                Some("23514") => StoreError::Invariant(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
