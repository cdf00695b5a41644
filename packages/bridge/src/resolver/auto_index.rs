// packages/bridge/src/resolver/auto_index.rs
//! Generated listing page served when the project has no default document

use crate::vfs::VirtualFile;

/// Media type of the generated listing
pub const AUTO_INDEX_MEDIA_TYPE: &str = "text/html";

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Project Preview</title>
    <style>
        body { font-family: Arial, sans-serif; padding: 20px; color: #333; line-height: 1.6; }
        .container { max-width: 800px; margin: 0 auto; }
        .file-list { list-style: none; padding: 0; }
        .file-list li { margin: 5px 0; padding: 8px; background: #f5f5f5; border-radius: 4px; }
        .file-list a { color: #0066cc; text-decoration: none; font-family: monospace; }
        .file-list a:hover { text-decoration: underline; }
        .folder { color: #666; font-weight: bold; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Project Files</h1>
        <p>Select a file to view:</p>
        <ul class="file-list">
"#;

const PAGE_TAIL: &str = r#"        </ul>
    </div>
</body>
</html>
"#;

/// Render a listing with a link per file and a marker per folder
pub fn render(root: &VirtualFile) -> String {
    let mut page = String::from(PAGE_HEAD);

    for entry in root.entries() {
        let path = escape_html(&entry.path);
        let item = if entry.node.is_folder() {
            format!("            <li class=\"folder\">&#128193; {}/</li>\n", path)
        } else {
            format!("            <li><a href=\"/{0}\">{0}</a></li>\n", path)
        };
        page.push_str(&item);
    }

    page.push_str(PAGE_TAIL);
    page
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_file_and_folder() {
        let tree = VirtualFile::folder(
            "project",
            vec![
                VirtualFile::file("app.js", ""),
                VirtualFile::folder(
                    "styles",
                    vec![
                        VirtualFile::file("style.css", ""),
                        VirtualFile::folder("themes", vec![VirtualFile::file("dark.css", "")]),
                    ],
                ),
            ],
        );

        let page = render(&tree);

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"<a href="/app.js">app.js</a>"#));
        assert!(page.contains(r#"<a href="/styles/style.css">styles/style.css</a>"#));
        assert!(page.contains(r#"<a href="/styles/themes/dark.css">styles/themes/dark.css</a>"#));
        assert!(page.contains(r#"<li class="folder">&#128193; styles/</li>"#));
        assert!(page.contains(r#"<li class="folder">&#128193; styles/themes/</li>"#));
        assert_eq!(page.matches("<a href=").count(), 3);
    }

    #[test]
    fn test_names_are_escaped() {
        let tree = VirtualFile::folder("p", vec![VirtualFile::file("<x>.html", "")]);
        let page = render(&tree);
        assert!(page.contains("&lt;x&gt;.html"));
        assert!(!page.contains("<x>.html"));
    }

    #[test]
    fn test_empty_tree_still_renders() {
        let page = render(&VirtualFile::folder("empty", vec![]));
        assert!(page.contains("<ul class=\"file-list\">"));
        assert!(page.trim_end().ends_with("</html>"));
    }
}
