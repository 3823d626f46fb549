#![allow(dead_code)]

pub mod site_server;

use site_server::{Route, SiteServer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const LOGIN_PATH: &str = "/smf/index.php?action=login2";
pub const SEARCH_PATH: &str = "/ajax/search_serije.php";
pub const SEARCH_KEY: &str = "a1b2c3";
pub const SHOW_PATH: &str = "/serije/55/example-show";
pub const EPISODE_PATH: &str = "/prijevodi/1000/example-show-1x01";
pub const ZIP_LINK: &str = "/preuzmi-prijevod/1/example-show-1x01-hr";
pub const RAR_LINK: &str = "/preuzmi-prijevod/2/example-show-1x01-en";
pub const SUBTITLE_TEXT: &str = "1\n00:00:01,000 --> 00:00:03,000\nDobro jutro.\n";

pub const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Prijevodi online</title>
<script type="text/javascript">
var po_search = {};
po_search.url = 'ajax/search_serije.php';
po_search.key = 'a1b2c3';
</script></head>
<body><div id="content">Dobrodošli</div></body></html>"#;

pub const LOGIN_OK: &str = r#"<html><body><p>Prijava uspješna</p></body></html>"#;

pub const LOGIN_REJECTED: &str =
    r#"<html><body><div class="windowbg"><p class="error">Pogrešna lozinka.</p></div></body></html>"#;

pub const SEARCH_RESULT: &str = r#"<ul class="rezultati">
<li><a href="/serije/55/example-show"><b>2019</b>Example Show</a></li>
<li><a href="/serije/56/example-show-reboot"><b>2023</b>Example Show Reboot</a></li>
</ul>"#;

pub const SHOW_PAGE: &str = "<html><body><div id=\"sezone\">\r\n\
<h3>Sezona 1</h3>\r\n\
<ul>\r\n\
<li class=\"broj\">1.</li>\r\n\
<li class=\"naziv\"><a class=\"open\" rel=\"/prijevodi/1000/example-show-1x01\" href=\"#\">Pilot</a></li>\r\n\
<li class=\"broj\">2.</li>\r\n\
<li class=\"naziv\"><a class=\"open\" rel=\"/prijevodi/1001/example-show-1x02\" href=\"#\">Second</a></li>\r\n\
</ul>\r\n\
</div></body></html>";

pub const EPISODE_PAGE: &str = r#"<table class="prijevodi">
<tr><th>Prijevod</th><th>Odgovara</th></tr>
<tr>
  <td><a href="/preuzmi-prijevod/1/example-show-1x01-hr">Example Show 1x01 Hrvatski</a></td>
  <td>HDTV.x264-LOL</td>
</tr>
<tr>
  <td><a href="/preuzmi-prijevod/2/example-show-1x01-en">Example Show 1x01 English</a></td>
  <td>WEB-DL 720p</td>
</tr>
<tr>
  <td><a href="/preuzmi-prijevod/3/example-show-1x01-de">Example Show 1x01 Deutsch</a></td>
  <td>WEB-DL 1080p</td>
</tr>
</table>"#;

/// Builds a ZIP archive in memory
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// RAR5 signature, enough for the fake unrar which never looks inside
pub fn rar_bytes() -> Vec<u8> {
    b"Rar!\x1a\x07\x01\x00fake".to_vec()
}

/// The routes of a complete, well-behaved site
pub fn site_routes() -> Vec<(&'static str, &'static str, Route)> {
    vec![
        ("GET", "/", Route::html(HOME_PAGE)),
        (
            "POST",
            LOGIN_PATH,
            Route::html(LOGIN_OK).with_header("Set-Cookie", "PHPSESSID=sesija42; Path=/"),
        ),
        ("POST", SEARCH_PATH, Route::html(SEARCH_RESULT)),
        ("GET", SHOW_PATH, Route::html(SHOW_PAGE)),
        (
            "POST",
            "/prijevodi/1000/example-show-1x01/",
            Route::html(EPISODE_PAGE),
        ),
        ("GET", ZIP_LINK, Route::redirect("/files/1")),
        (
            "GET",
            "/files/1",
            Route::attachment(
                "Example_Show  S01E01.zip",
                zip_bytes(&[("Example.Show.S01E01.HDTV.srt", SUBTITLE_TEXT)]),
            ),
        ),
        (
            "GET",
            RAR_LINK,
            Route::attachment("Example Show S01E01.rar", rar_bytes()),
        ),
    ]
}

/// Starts a server with the standard site, replacing routes by `overrides`
pub fn start_site(overrides: Vec<(&'static str, &'static str, Route)>) -> SiteServer {
    let mut routes = site_routes();
    routes.retain(|(method, path, _)| {
        !overrides
            .iter()
            .any(|(m, p, _)| *m == *method && *p == *path)
    });
    routes.extend(overrides);
    site_server::start(routes)
}

/// Writes a shell script behaving like `unrar lb` and `unrar x` for one member
#[cfg(unix)]
pub fn fake_unrar(dir: &Path, member: &str, content: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
case "$1" in
  lb) echo '{member}' ;;
  x) mkdir -p "$7" && printf '%s' '{content}' > "$7$6" ;;
  *) exit 2 ;;
esac
"#,
        member = member,
        content = content.replace('\'', ""),
    );

    fs::create_dir_all(dir).unwrap();
    let path = dir.join("fake-unrar");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
