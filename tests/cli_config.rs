use predicates::prelude::*;

const SITE_VARS: &[&str] = &[
    "PRESSFLIP_SITE_URL",
    "PRESSFLIP_API_USER",
    "PRESSFLIP_API_PASSWORD",
    "PRESSFLIP_LOGIN_PASSWORD",
    "PRESSFLIP_ARCHIVE_PAGE_ID",
    "PRESSFLIP_VIEWER_PAGE_ID",
    "PRESSFLIP_FALLBACK_FLIPBOOK_ID",
];

#[test]
fn help_works_without_configuration() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pressflip");
    for var in SITE_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--help").assert().success();
}

#[test]
fn publish_fails_fast_when_site_url_is_missing() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pressflip");
    for var in SITE_VARS {
        cmd.env_remove(var);
    }
    cmd.args(["publish", "--file", "missing.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PRESSFLIP_SITE_URL is not set"));
}

#[test]
fn numeric_page_ids_are_validated() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pressflip");
    for var in SITE_VARS {
        cmd.env_remove(var);
    }
    cmd.env("PRESSFLIP_SITE_URL", "https://example.com")
        .env("PRESSFLIP_API_USER", "svc")
        .env("PRESSFLIP_API_PASSWORD", "app-password")
        .env("PRESSFLIP_LOGIN_PASSWORD", "login-password")
        .env("PRESSFLIP_ARCHIVE_PAGE_ID", "not-a-number")
        .env("PRESSFLIP_VIEWER_PAGE_ID", "1262")
        .env("PRESSFLIP_FALLBACK_FLIPBOOK_ID", "20")
        .args(["publish", "--file", "missing.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PRESSFLIP_ARCHIVE_PAGE_ID"));
}
