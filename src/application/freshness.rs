//! Modification watermark and validator comparison.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::domain::entities::{CategoryRecord, PostRecord};

/// IMF-fixdate, the preferred HTTP-date form.
const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Latest moment any record in a response was created or changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(OffsetDateTime);

impl Watermark {
    /// Maximum over post creation and modification times and category
    /// creation times. `None` when both sets are empty.
    pub fn compute(content: &[PostRecord], categories: &[CategoryRecord]) -> Option<Self> {
        let from_content = content.iter().map(PostRecord::last_touched);
        let from_categories = categories.iter().map(|category| category.date_created);
        from_content.chain(from_categories).max().map(Self)
    }

    pub fn at(moment: OffsetDateTime) -> Self {
        Self(moment)
    }

    pub fn moment(&self) -> OffsetDateTime {
        self.0
    }

    pub fn to_http_date(&self) -> String {
        http_date(self.0)
    }
}

pub fn http_date(moment: OffsetDateTime) -> String {
    let utc = moment.to_offset(UtcOffset::UTC);
    utc.format(HTTP_DATE)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}

/// Validator material for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Freshness {
    pub watermark: Watermark,
    /// HTTP-date rendering of the watermark; sent as `Last-Modified` and,
    /// quoted, as `ETag`.
    pub validator: String,
}

impl Freshness {
    pub fn new(watermark: Watermark) -> Self {
        Self {
            validator: watermark.to_http_date(),
            watermark,
        }
    }

    pub fn etag(&self) -> String {
        format!("\"{}\"", self.validator)
    }

    /// The client copy is current when its `If-None-Match` value contains
    /// the validator.
    pub fn is_not_modified(&self, if_none_match: Option<&str>) -> bool {
        if_none_match.is_some_and(|presented| presented.contains(self.validator.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::domain::entities::PostId;
    use crate::domain::types::{PostKind, PostStatus};

    fn post(created: OffsetDateTime, modified: OffsetDateTime) -> PostRecord {
        PostRecord {
            id: PostId(1),
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            status: PostStatus::Publish,
            kind: PostKind::Post,
            body_html: None,
            summary_html: None,
            categories: Vec::new(),
            date_created: created,
            date_modified: modified,
        }
    }

    fn category(created: OffsetDateTime) -> CategoryRecord {
        CategoryRecord {
            id: Uuid::new_v4(),
            slug: "tech".to_string(),
            name: "Tech".to_string(),
            date_created: created,
        }
    }

    #[test]
    fn watermark_is_none_for_empty_sets() {
        assert_eq!(Watermark::compute(&[], &[]), None);
    }

    #[test]
    fn watermark_takes_maximum_over_both_sets() {
        let t1 = datetime!(2024-01-01 00:00 UTC);
        let t2 = datetime!(2024-02-01 00:00 UTC);
        let t3 = datetime!(2024-03-01 00:00 UTC);

        let watermark = Watermark::compute(&[post(t2, t3)], &[category(t1)]).expect("watermark");
        assert_eq!(watermark.moment(), t3);

        let later_category = datetime!(2024-04-01 00:00 UTC);
        let watermark = Watermark::compute(&[post(t2, t3)], &[category(later_category)])
            .expect("watermark");
        assert_eq!(watermark.moment(), later_category);
    }

    #[test]
    fn categories_alone_produce_a_watermark() {
        let t1 = datetime!(2024-01-01 00:00 UTC);
        let watermark = Watermark::compute(&[], &[category(t1)]).expect("watermark");
        assert_eq!(watermark.moment(), t1);
    }

    #[test]
    fn raising_modification_never_lowers_watermark() {
        let created = datetime!(2024-01-01 00:00 UTC);
        let before = Watermark::compute(&[post(created, created)], &[]).expect("before");
        let after = Watermark::compute(&[post(created, datetime!(2024-01-02 00:00 UTC))], &[])
            .expect("after");
        assert!(after >= before);
    }

    #[test]
    fn http_date_uses_imf_fixdate() {
        let moment = datetime!(2015-10-21 07:28:00 UTC);
        assert_eq!(http_date(moment), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn http_date_normalizes_offsets() {
        let moment = datetime!(2015-10-21 09:28:00 +02:00);
        assert_eq!(http_date(moment), "Wed, 21 Oct 2015 07:28:00 GMT");
    }

    #[test]
    fn validator_matches_by_containment() {
        let freshness = Freshness::new(Watermark::at(datetime!(2015-10-21 07:28:00 UTC)));
        assert_eq!(freshness.etag(), "\"Wed, 21 Oct 2015 07:28:00 GMT\"");

        assert!(freshness.is_not_modified(Some("Wed, 21 Oct 2015 07:28:00 GMT")));
        assert!(freshness.is_not_modified(Some("\"Wed, 21 Oct 2015 07:28:00 GMT\"")));
        assert!(!freshness.is_not_modified(Some("Tue, 20 Oct 2015 07:28:00 GMT")));
        assert!(!freshness.is_not_modified(None));
    }
}
