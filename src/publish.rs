use anyhow::Context as _;

use crate::cli::PublishArgs;
use crate::config::{Config, SiteConfig};
use crate::flipbook::{CdpBrowser, FlipbookRegistrar, Registrar};
use crate::pages;
use crate::report::{PublishReport, StepFlags, StepOutcome};
use crate::wp;

/// Publishes are serialized within this process: two overlapping runs could
/// both pass an existence check and both mutate. Separate processes can
/// still race; acceptable under the single-operator usage model.
static PUBLISH_GUARD: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Run the whole publish pipeline for one PDF. Steps run in a fixed order
/// because later ones depend on earlier results; each idempotent step skips
/// itself when its target state already exists, so re-running after a
/// partial failure is safe.
pub async fn run(
    site: &SiteConfig,
    client: &wp::Client,
    registrar: &dyn Registrar,
    pdf: Vec<u8>,
    filename: &str,
) -> anyhow::Result<PublishReport> {
    let _guard = PUBLISH_GUARD.lock().await;

    // Step 1: resolve-or-upload. The existence check runs immediately
    // before the mutation it guards, never from a cache.
    let (upload, pdf_url) = if client
        .media_exists(filename)
        .await
        .context("check media library")?
    {
        tracing::info!(filename, "file already uploaded; skipping upload");
        let url = client
            .media_url(filename)
            .await
            .context("resolve media url")?
            .ok_or_else(|| anyhow::anyhow!("media for {filename} vanished after the check"))?;
        (StepOutcome::AlreadyExists, url)
    } else {
        let item = client
            .upload_media(pdf, filename)
            .await
            .context("upload media")?;
        tracing::info!(filename, url = %item.source_url, "file uploaded");
        (StepOutcome::Performed, item.source_url)
    };

    // Step 2: the currently featured PDF, soon to be the previous one.
    let viewer_markup = client
        .page_content(site.viewer_page_id)
        .await
        .context("read viewer page")?;
    let old_pdf = pages::old_pdf_ref(&viewer_markup);

    // Step 3: the archive page gains the previous issue.
    let archive = match &old_pdf {
        Some(old) => pages::update_archive(client, site.archive_page_id, old)
            .await
            .context("update archive page")?,
        None => {
            tracing::warn!("viewer page has no PDF link; nothing to archive yet");
            StepOutcome::AlreadyExists
        }
    };

    // Step 4: flipbook registration (browser automation, retried internally).
    let registration = registrar
        .register(filename, &pdf_url)
        .await
        .context("register flipbook")?;
    let flipbook_id = registration
        .flipbook_id
        .unwrap_or(site.fallback_flipbook_id);

    // Step 5: the viewer page is rewritten wholesale on every publish.
    pages::overwrite_viewer(client, site.viewer_page_id, &pdf_url, flipbook_id)
        .await
        .context("update viewer page")?;

    let flags = StepFlags {
        file_upload: upload.did_work(),
        page_update: archive.did_work(),
        flipbook_creation: registration.outcome.did_work(),
        page_two_update: true,
    };

    Ok(PublishReport {
        success: true,
        message: summary(&flags),
        data: flags,
    })
}

/// CLI entry: read the PDF, wire the production registrar, print the report.
pub async fn command(args: PublishArgs, config: Config) -> anyhow::Result<()> {
    let filename = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("--file has no usable file name"))?,
    };

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("read {}", args.file.display()))?;

    let client = wp::Client::new(&config.site)?;
    let registrar = FlipbookRegistrar::new(
        Box::new(CdpBrowser::new(
            config.site.base_url.clone(),
            config.browser.clone(),
        )),
        config.site.api_user.clone(),
        config.site.login_password.clone(),
        config.browser.attempts,
    );

    let report = run(&config.site, &client, &registrar, bytes, &filename).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize report")?
    );
    Ok(())
}

fn summary(flags: &StepFlags) -> String {
    let describe = |did_work: bool, done: &str| {
        if did_work {
            done.to_owned()
        } else {
            "Skipped (already exists)".to_owned()
        }
    };
    format!(
        "File processed. Upload: {}. Page update: {}. Flipbook: {}.",
        describe(flags.file_upload, "Uploaded"),
        describe(flags.page_update, "Updated"),
        describe(flags.flipbook_creation, "Created"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reads_like_a_status_line() {
        let flags = StepFlags {
            file_upload: true,
            page_update: false,
            flipbook_creation: true,
            page_two_update: true,
        };
        assert_eq!(
            summary(&flags),
            "File processed. Upload: Uploaded. Page update: Skipped (already exists). \
             Flipbook: Created."
        );
    }
}
