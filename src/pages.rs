use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;

use crate::report::StepOutcome;
use crate::wp;

/// First PDF hyperlink in a page: href plus anchor text.
static PDF_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]*href=["'](https?://[^\s"']+\.pdf)["'][^>]*>(.*?)</a>"#)
        .expect("pdf anchor regex")
});

/// First `<ul>` block, captured as open tag / inner markup / close tag.
static LIST_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(<ul[^>]*>)(.*?)(</ul>)").expect("list block regex"));

/// The previously featured PDF, as linked from the viewer page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OldPdfRef {
    pub url: String,
    pub name: String,
}

pub fn old_pdf_ref(content: &str) -> Option<OldPdfRef> {
    let caps = PDF_ANCHOR.captures(content)?;
    Some(OldPdfRef {
        url: caps[1].to_owned(),
        name: caps[2].trim().to_owned(),
    })
}

/// Splice a new `<li>` entry as the first child of the first `<ul>` block.
/// Content without a `<ul>` comes back unchanged.
pub fn insert_archive_entry(content: &str, url: &str, title: &str) -> String {
    let entry = format!(r#"<li><a href="{url}">{title}</a></li>"#);
    LIST_BLOCK
        .replace(content, |caps: &regex::Captures<'_>| {
            format!("{}{entry}{}{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned()
}

/// The viewer page's entire content: two shortcode directives the rendering
/// plugin expands at view time. The exact bracket syntax is a contract.
pub fn viewer_content(pdf_url: &str, flipbook_id: u64) -> String {
    format!("[pdf-embedder url=\"{pdf_url}\"]\n[real3dflipbook id=\"{flipbook_id}\"]\n")
}

/// Add the previous issue to the archive page's list, unless it is already
/// listed. Content is refetched here so the check is never stale.
pub async fn update_archive(
    client: &wp::Client,
    page_id: u64,
    old: &OldPdfRef,
) -> anyhow::Result<StepOutcome> {
    let content = client
        .page_content(page_id)
        .await
        .context("fetch archive page")?;

    if content.contains(&old.name) {
        tracing::info!(page_id, title = %old.name, "archive page already lists this issue");
        return Ok(StepOutcome::AlreadyExists);
    }

    let updated = insert_archive_entry(&content, &old.url, &old.name);
    if updated == content {
        tracing::warn!(page_id, "archive page has no list block; leaving it untouched");
        return Ok(StepOutcome::AlreadyExists);
    }

    client
        .update_page(page_id, &updated)
        .await
        .context("write archive page")?;
    Ok(StepOutcome::Performed)
}

/// Replace the viewer page wholesale with the shortcode template. This step
/// is deliberately unconditional; the output is deterministic for the same
/// inputs, so rewriting on every run is harmless.
pub async fn overwrite_viewer(
    client: &wp::Client,
    page_id: u64,
    pdf_url: &str,
    flipbook_id: u64,
) -> anyhow::Result<()> {
    client
        .update_page(page_id, &viewer_content(pdf_url, flipbook_id))
        .await
        .context("write viewer page")
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWER_PAGE: &str = concat!(
        r#"<p>Read this week's issue:</p>"#,
        "\n",
        r#"<a class="issue" href="https://cdn.example.com/uploads/2024/11/147.pdf">Issue 147</a>"#,
    );

    #[test]
    fn old_pdf_ref_takes_first_pdf_anchor() {
        let content = format!(
            "{VIEWER_PAGE}\n<a href=\"https://cdn.example.com/uploads/146.pdf\">Issue 146</a>"
        );
        let old = old_pdf_ref(&content).expect("anchor found");
        assert_eq!(old.url, "https://cdn.example.com/uploads/2024/11/147.pdf");
        assert_eq!(old.name, "Issue 147");
    }

    #[test]
    fn old_pdf_ref_trims_anchor_text_and_accepts_single_quotes() {
        let content = "<a href='https://h.example/a.pdf'>  Issue 9  </a>";
        let old = old_pdf_ref(content).expect("anchor found");
        assert_eq!(old.name, "Issue 9");
    }

    #[test]
    fn old_pdf_ref_ignores_non_pdf_links() {
        let content = r#"<a href="https://h.example/about.html">About</a>"#;
        assert_eq!(old_pdf_ref(content), None);
    }

    #[test]
    fn archive_entry_becomes_first_list_child() {
        let content = "<h2>Archive</h2><ul class=\"issues\"><li>old</li></ul>";
        let updated = insert_archive_entry(content, "https://h.example/146.pdf", "Issue 146");
        assert_eq!(
            updated,
            "<h2>Archive</h2><ul class=\"issues\">\
             <li><a href=\"https://h.example/146.pdf\">Issue 146</a></li><li>old</li></ul>"
        );
    }

    #[test]
    fn archive_entry_spans_multiline_list_blocks() {
        let content = "<ul>\n<li>old</li>\n</ul>";
        let updated = insert_archive_entry(content, "https://h.example/1.pdf", "One");
        assert!(updated.starts_with("<ul><li><a href=\"https://h.example/1.pdf\">One</a></li>\n"));
        assert!(updated.ends_with("</ul>"));
    }

    #[test]
    fn archive_entry_without_list_block_is_a_noop() {
        let content = "<p>No archive list on this page.</p>";
        let updated = insert_archive_entry(content, "https://h.example/1.pdf", "One");
        assert_eq!(updated, content);
    }

    #[test]
    fn archive_entry_only_touches_the_first_list() {
        let content = "<ul><li>a</li></ul><ul><li>b</li></ul>";
        let updated = insert_archive_entry(content, "https://h.example/1.pdf", "One");
        assert_eq!(
            updated,
            "<ul><li><a href=\"https://h.example/1.pdf\">One</a></li><li>a</li></ul>\
             <ul><li>b</li></ul>"
        );
    }

    #[test]
    fn viewer_content_is_exactly_two_shortcodes() {
        assert_eq!(
            viewer_content("https://cdn.example.com/148.pdf", 67),
            "[pdf-embedder url=\"https://cdn.example.com/148.pdf\"]\n[real3dflipbook id=\"67\"]\n"
        );
    }

    #[test]
    fn viewer_content_reflects_only_the_last_write() {
        let a = viewer_content("https://h.example/a.pdf", 1);
        let b = viewer_content("https://h.example/b.pdf", 2);
        assert_ne!(a, b);
        assert!(!b.contains("a.pdf"));
        assert!(b.contains("b.pdf"));
    }
}
