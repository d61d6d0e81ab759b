//! Atom 1.0 serialization for site and category feeds.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml; charset=UTF-8";

const GENERATOR_NAME: &str = "Quire";

pub struct AtomAuthor {
    pub name: String,
    pub email: Option<String>,
}

pub struct AtomEntry {
    pub title: String,
    pub url: String,
    pub content_html: String,
    pub summary_html: Option<String>,
    pub published: OffsetDateTime,
    pub updated: OffsetDateTime,
}

pub struct AtomFeed {
    pub title: String,
    pub feed_url: String,
    pub site_url: String,
    pub author: AtomAuthor,
    pub updated: OffsetDateTime,
    pub entries: Vec<AtomEntry>,
}

impl AtomFeed {
    pub fn render(&self) -> String {
        let mut entries = String::new();
        for entry in &self.entries {
            let summary = entry
                .summary_html
                .as_deref()
                .map(|summary| {
                    format!(
                        "    <summary type=\"html\">{}</summary>\n",
                        xml_escape(summary)
                    )
                })
                .unwrap_or_default();
            entries.push_str(&format!(
                "  <entry>\n    <title>{}</title>\n    <id>{}</id>\n    <link href=\"{}\"/>\n    <published>{}</published>\n    <updated>{}</updated>\n{}    <author>\n{}    </author>\n    <content type=\"html\">{}</content>\n  </entry>\n",
                xml_escape(&entry.title),
                xml_escape(&entry.url),
                xml_escape(&entry.url),
                rfc3339(entry.published),
                rfc3339(entry.updated),
                summary,
                self.author_elements(),
                xml_escape(&entry.content_html),
            ));
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n  <title>{}</title>\n  <id>{}</id>\n  <updated>{}</updated>\n  <link href=\"{}\" rel=\"self\"/>\n  <link href=\"{}\"/>\n  <author>\n{}  </author>\n  <generator version=\"{}\">{}</generator>\n{}</feed>\n",
            xml_escape(&self.title),
            xml_escape(&self.feed_url),
            rfc3339(self.updated),
            xml_escape(&self.feed_url),
            xml_escape(&self.site_url),
            self.author_elements(),
            env!("CARGO_PKG_VERSION"),
            GENERATOR_NAME,
            entries,
        )
    }

    fn author_elements(&self) -> String {
        let mut elements = format!("    <name>{}</name>\n", xml_escape(&self.author.name));
        if let Some(email) = self.author.email.as_deref() {
            elements.push_str(&format!("    <email>{}</email>\n", xml_escape(email)));
        }
        elements
    }
}

fn rfc3339(moment: OffsetDateTime) -> String {
    moment
        .format(&Rfc3339)
        .unwrap_or_else(|_| moment.unix_timestamp().to_string())
}

fn xml_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
