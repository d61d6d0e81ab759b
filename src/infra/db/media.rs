use async_trait::async_trait;
use bytes::Bytes;
use sqlx::query_as;
use time::OffsetDateTime;

use crate::application::repos::{MediaRepo, RepoError};
use crate::domain::entities::MediaRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct MediaRow {
    url: String,
    content_type: String,
    content: Vec<u8>,
    date_modified: OffsetDateTime,
}

impl From<MediaRow> for MediaRecord {
    fn from(row: MediaRow) -> Self {
        Self {
            url: row.url,
            content_type: row.content_type,
            content: Bytes::from(row.content),
            date_modified: row.date_modified,
        }
    }
}

#[async_trait]
impl MediaRepo for PostgresRepositories {
    async fn find_media(&self, url: &str) -> Result<Option<MediaRecord>, RepoError> {
        let row = query_as::<_, MediaRow>(
            "SELECT url, content_type, content, date_modified FROM media WHERE url = $1",
        )
        .bind(url)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MediaRecord::from))
    }
}
