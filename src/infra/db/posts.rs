use async_trait::async_trait;
use serde_json::json;
use sqlx::{Postgres, QueryBuilder, types::Json};
use time::OffsetDateTime;

use crate::application::repos::{PostProjection, PostQuery, PostsRepo, RepoError, SortOrder};
use crate::domain::entities::{CategoryRef, PostId, PostRecord};
use crate::domain::types::{PostKind, PostStatus};

use super::PostgresRepositories;
use super::util::{map_sqlx_error, to_bigint};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    slug: String,
    title: String,
    status: PostStatus,
    kind: PostKind,
    body_html: Option<String>,
    summary_html: Option<String>,
    categories: Json<Vec<CategoryRef>>,
    date_created: OffsetDateTime,
    date_modified: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: PostId(row.id),
            slug: row.slug,
            title: row.title,
            status: row.status,
            kind: row.kind,
            body_html: row.body_html,
            summary_html: row.summary_html,
            categories: row.categories.0,
            date_created: row.date_created,
            date_modified: row.date_modified,
        }
    }
}

fn projection_columns(projection: PostProjection) -> &'static str {
    match projection {
        PostProjection::Display => "p.body_html, p.summary_html",
        PostProjection::Summary => "NULL::text AS body_html, p.summary_html",
        PostProjection::Listing => "NULL::text AS body_html, NULL::text AS summary_html",
    }
}

fn build_post_query(query: &PostQuery) -> Result<QueryBuilder<'static, Postgres>, RepoError> {
    let mut qb = QueryBuilder::new("SELECT p.id, p.slug, p.title, p.status, p.kind, ");
    qb.push(projection_columns(query.projection));
    qb.push(", p.categories, p.date_created, p.date_modified FROM posts p WHERE TRUE");

    let filter = &query.filter;
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ");
        qb.push_bind(status);
    }
    if let Some(kind) = filter.kind {
        qb.push(" AND p.kind = ");
        qb.push_bind(kind);
    }
    if let Some(slug) = filter.slug.as_ref() {
        qb.push(" AND p.slug = ");
        qb.push_bind(slug.clone());
    }
    if let Some(category) = filter.category.as_ref() {
        qb.push(" AND p.categories @> ");
        qb.push_bind(Json(json!([{ "slug": category }])));
    }
    if let Some(PostId(before)) = filter.id_before {
        qb.push(" AND p.id < ");
        qb.push_bind(before);
    }
    if let Some(PostId(after)) = filter.id_after {
        qb.push(" AND p.id > ");
        qb.push_bind(after);
    }

    qb.push(match query.sort {
        SortOrder::IdDesc => " ORDER BY p.id DESC",
        SortOrder::IdAsc => " ORDER BY p.id ASC",
    });

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(to_bigint(limit, "limit")?);
    }
    if query.skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(to_bigint(query.skip, "skip")?);
    }

    Ok(qb)
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = build_post_query(query)?;
        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_post(&self, query: &PostQuery) -> Result<Option<PostRecord>, RepoError> {
        let single = query.clone().limit(1);
        let mut qb = build_post_query(&single)?;
        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}
