use async_trait::async_trait;
use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CategoriesRepo, RepoError, UpsertCategoryParams};
use crate::domain::entities::CategoryRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    slug: String,
    name: String,
    date_created: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            date_created: row.date_created,
        }
    }
}

// Posts embed `{slug, name}` pairs; renames and deletes are mirrored there.
const RENAME_EMBEDDED: &str = "UPDATE posts SET categories = (\
        SELECT COALESCE(jsonb_agg(CASE WHEN elem->>'slug' = $1 \
            THEN jsonb_build_object('slug', $1::text, 'name', $2::text) ELSE elem END), '[]'::jsonb) \
        FROM jsonb_array_elements(categories) AS elem) \
    WHERE categories @> jsonb_build_array(jsonb_build_object('slug', $1::text))";

const DROP_EMBEDDED: &str = "UPDATE posts SET categories = (\
        SELECT COALESCE(jsonb_agg(elem), '[]'::jsonb) \
        FROM jsonb_array_elements(categories) AS elem WHERE elem->>'slug' <> $1) \
    WHERE categories @> jsonb_build_array(jsonb_build_object('slug', $1::text))";

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let rows = query_as::<_, CategoryRow>(
            "SELECT id, slug, name, date_created FROM categories ORDER BY name ASC, slug ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn upsert_category(
        &self,
        params: UpsertCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = query_as::<_, CategoryRow>(
            "INSERT INTO categories (id, slug, name) VALUES ($1, $2, $3) \
             ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, slug, name, date_created",
        )
        .bind(Uuid::new_v4())
        .bind(&params.slug)
        .bind(&params.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(RENAME_EMBEDDED)
            .bind(&params.slug)
            .bind(&params.name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn delete_category(&self, slug: &str) -> Result<bool, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let deleted = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if deleted > 0 {
            sqlx::query(DROP_EMBEDDED)
                .bind(slug)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(deleted > 0)
    }
}
