//! Server-rendered HTML: the chat page and bubble fragments.
//!
//! The page carries the three elements a chat controller binds to: the form
//! `chat-form`, the text field `query` and the log `chat-box`. The browser
//! side of the controller is `static/app.js`. Fragments are served to htmx
//! clients that post to `/chat` or `/upload` with an `HX-Request` header.

use crate::bubble::Bubble;

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one bubble as a `div`.
pub fn bubble_html(bubble: &Bubble) -> String {
    format!(
        r#"<div class="{}">{}</div>"#,
        bubble.css_class(),
        escape_html(&bubble.text)
    )
}

/// Status line shown after an upload.
pub fn upload_status_html(filename: &str, message: &str) -> String {
    format!(
        r#"<p class="upload-status" data-filename="{}">{}</p>"#,
        escape_html(filename),
        escape_html(message)
    )
}

/// Generate the HTML shell for the application.
fn html_shell(title: &str, content: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <meta name="description" content="Chat with your documents">
    <title>{title} - DocChat</title>

    <!-- Local assets only (no CDN) -->
    <link rel="stylesheet" href="/static/app.css">
    <script src="/static/app.js" defer></script>
</head>
<body>
    <main id="app" class="container">
        {content}
    </main>
</body>
</html>"#
    )
}

/// Chat page content.
fn chat_content() -> &'static str {
    r##"
        <h1>DocChat</h1>
        <form id="upload-form" class="upload-form" action="/upload" method="post" enctype="multipart/form-data">
            <input id="file" name="file" type="file" accept=".txt,.md,.markdown" required>
            <button type="submit">Upload</button>
        </form>
        <div id="upload-status" class="upload-status" aria-live="polite"></div>
        <div id="chat-box" class="chat-box" aria-live="polite" aria-label="Chat messages"></div>
        <form id="chat-form" class="chat-form" action="/chat" method="post">
            <input
                id="query"
                name="query"
                type="text"
                placeholder="Ask a question about your documents..."
                autocomplete="off"
                required
            >
            <button type="submit">Send</button>
        </form>
    "##
}

/// The full chat page.
pub fn chat_page() -> String {
    html_shell("Chat", chat_content())
}
