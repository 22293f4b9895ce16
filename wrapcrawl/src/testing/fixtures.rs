//! Canned pages and scripts for crawl tests.

/// One row of a listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingRow {
    /// Title cell.
    pub title: String,
    /// Authors cell, `;`-separated.
    pub authors: String,
    /// Year cell.
    pub year: String,
    /// Detail token carried in the row's link.
    pub token: Option<String>,
}

impl ListingRow {
    /// Creates a row.
    #[must_use]
    pub fn new(title: &str, authors: &str, year: &str) -> Self {
        Self {
            title: title.to_string(),
            authors: authors.to_string(),
            year: year.to_string(),
            token: None,
        }
    }

    /// Sets the detail token.
    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Renders a listing page in the shape [`LISTING_SCRIPT`] understands.
#[must_use]
pub fn listing_page(rows: &[ListingRow], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><table class=\"hits\">");
    for row in rows {
        let link = row
            .token
            .as_deref()
            .map(|token| format!("<a class=\"detail\" href=\"details?id={token}\">more</a>"))
            .unwrap_or_default();
        html.push_str(&format!(
            "<tr><td class=\"title\">{}</td><td class=\"authors\">{}</td><td class=\"year\">{}</td><td>{link}</td></tr>",
            row.title, row.authors, row.year
        ));
    }
    html.push_str("</table>");
    if let Some(next) = next {
        html.push_str(&format!("<a class=\"next\" href=\"{next}\">next</a>"));
    }
    html.push_str("</body></html>");
    html
}

/// Fetches `$url` with the query, parses rows and the next-page link.
pub const LISTING_SCRIPT: &str = r#"
<script>
  <usecookies/>
  <fetch url="$url">
    <param name="q" value="$query"/>
  </fetch>
  <clean/>
  <parse>
    <property>
      <url name="nextpage" xpath="//a[@class='next']/@href"/>
    </property>
    <iterate xpath="//table[@class='hits']//tr">
      <extract>
        <text key="title" xpath="td[@class='title']"/>
        <text key="authors" xpath="td[@class='authors']"><split delimiter=";"/></text>
        <text key="year" xpath="td[@class='year']"/>
        <text key="details" xpath="substring-after(.//a[@class='detail']/@href, 'id=')"/>
      </extract>
    </iterate>
  </parse>
</script>
"#;

/// Posts the harvested `ids` and parses `<record>` elements.
pub const EXPORT_SCRIPT: &str = r#"
<script>
  <fetch url="export" method="POST">
    <form name="ids" value="$ids"/>
  </fetch>
  <cleanXML/>
  <parse>
    <iterate xpath="//record">
      <extract>
        <text key="title" xpath="title"/>
        <iterate key="authors" xpath="author"><concat/></iterate>
        <text key="year" xpath="year"/>
        <text key="details" xpath="@id"/>
      </extract>
    </iterate>
  </parse>
</script>
"#;

/// Fetches `$url` and extracts abstract and publisher.
pub const DETAIL_SCRIPT: &str = r#"
<script>
  <fetch url="$url"/>
  <clean/>
  <parse>
    <extract>
      <text key="abstract" xpath="//div[@class='abstract']"/>
      <text key="publisher" xpath="//span[@class='publisher']"/>
    </extract>
  </parse>
</script>
"#;
