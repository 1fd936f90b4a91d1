//! Vocabulary repository
//!
//! Every query is filtered by owner; word lists of other users are invisible.

use async_trait::async_trait;
use quizgen_core::{ServiceError, Word, WordSource};
use sqlx::{QueryBuilder, Sqlite};

use super::connection::DatabasePool;
use super::error::DbResult;

#[derive(Clone)]
pub struct WordRepository {
    pool: DatabasePool,
}

impl WordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Create a word list and return its id
    pub async fn create_list(&self, owner_id: &str, name: &str, language: Option<&str>) -> DbResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO word_lists (owner_id, name, language) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(owner_id)
        .bind(name)
        .bind(language)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Add a word to a list and return its id
    pub async fn add_word(&self, word_list_id: i64, term: &str, translation: Option<&str>) -> DbResult<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO words (word_list_id, term, translation) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(word_list_id)
        .bind(term)
        .bind(translation)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn find_words(
        &self,
        owner_id: &str,
        word_list_ids: &[i64],
        language: Option<&str>,
    ) -> DbResult<Vec<Word>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT w.id, w.term, w.translation
             FROM words w JOIN word_lists l ON l.id = w.word_list_id
             WHERE l.owner_id = ",
        );
        query.push_bind(owner_id);

        if !word_list_ids.is_empty() {
            query.push(" AND l.id IN (");
            let mut ids = query.separated(", ");
            for id in word_list_ids {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
        }
        if let Some(language) = language {
            query.push(" AND l.language = ").push_bind(language);
        }
        query.push(" ORDER BY w.id");

        let rows: Vec<(i64, String, Option<String>)> =
            query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, term, translation)| Word { id, term, translation })
            .collect())
    }
}

#[async_trait]
impl WordSource for WordRepository {
    async fn words(
        &self,
        owner_id: &str,
        word_list_ids: &[i64],
        language: Option<&str>,
    ) -> Result<Vec<Word>, ServiceError> {
        Ok(self.find_words(owner_id, word_list_ids, language).await?)
    }
}
