//! Static HTML pieces. Placeholders in `{UPPER}` form are filled with
//! `str::replace` by the assembler.

pub const STYLE_CSS_NAME: &str = "style.css";

pub const STYLE_CSS: &str = r#"body {
    font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif;
    margin: 1.5em;
    color: #222;
    background: #fafafa;
}
h1 { margin-bottom: 0.2em; }
h2 { border-bottom: 2px solid #446; padding-bottom: 0.2em; margin-top: 1.6em; }
a { color: #2850a0; }
table.results { border-collapse: collapse; width: 100%; table-layout: fixed; }
table.results th { background: #446; color: #fff; text-align: left; padding: 0.4em; }
table.results td { border: 1px solid #ccc; vertical-align: top; padding: 0.5em; word-wrap: break-word; }
table.results td.info { width: 40%; }
table.summary td, table.summary th { padding: 0.15em 0.8em; text-align: left; }
table.summary td.count { text-align: right; }
.generated { color: #777; font-size: 0.9em; }
.creds { color: #a01010; font-weight: bold; }
.cert { color: #b06000; }
.headers { font-family: monospace; font-size: 0.85em; }
.chain { font-size: 0.85em; color: #555; }
img.shot { max-width: 100%; border: 1px solid #999; }
.placard {
    border: 2px dashed #b44;
    color: #822;
    background: #fff3f3;
    padding: 2em 1em;
    text-align: center;
    font-weight: bold;
}
.placard.capture { border-color: #b90; color: #750; background: #fffbe8; }
.nav { text-align: center; margin: 1em 0; }
.nav a { margin: 0 0.3em; }
.nav .current { font-weight: bold; margin: 0 0.3em; }
ul.toc li { margin: 0.15em 0; }
"#;

pub const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
<link rel="stylesheet" href="style.css">
</head>
<body>
<h1>{TITLE}</h1>
<div class="generated">Generated {GENERATED}</div>
"#;

pub const PAGE_FOOT: &str = "</body>\n</html>\n";

pub const TABLE_HEAD: &str = r#"<table class="results">
<tr><th>Web Request Info</th><th>Web Screenshot</th></tr>
"#;

pub const TABLE_FOOT: &str = "</table>\n";

pub fn page_head(title: &str, generated: &str) -> String {
    PAGE_HEAD
        .replace("{TITLE}", title)
        .replace("{GENERATED}", generated)
}
