use std::{fs, io, path::Path};

/// Render an HTML index of the immediate children of `dir`.
///
/// Hidden entries, those starting with a `.`, are skipped. Links are relative to `request_path`.
pub fn render(dir: &Path, request_path: &str) -> io::Result<String> {
    let mut names = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;

        let mut name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let base = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{}/", request_path)
    };

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html>\n<head><title>Index of ");
    page.push_str(&escape(&base));
    page.push_str("</title></head>\n<body>\n<h1>Index of ");
    page.push_str(&escape(&base));
    page.push_str("</h1>\n<ul>\n");
    for name in &names {
        let href = escape(&format!("{}{}", base, name));
        page.push_str(&format!("<li><a href=\"{}\">{}</a></li>\n", href, escape(name)));
    }
    page.push_str("</ul>\n</body>\n</html>\n");

    Ok(page)
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }

    escaped
}
