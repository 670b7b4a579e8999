//! Index page and image listing.

use crate::{errors::AppError, models::object::filter_jpeg_names, state::AppState};
use axum::{Json, extract::State, response::Html};

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Image Upload</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        .image-list { list-style-type: none; padding: 0; }
        .image-list li { margin-bottom: 10px; }
    </style>
</head>
<body>
    <h1>Image Upload</h1>
    <form method="post" enctype="multipart/form-data" action="/upload">
        <div>
            <label for="file">Choose file to upload</label>
            <input type="file" id="file" name="form_file" accept="image/jpeg"/>
        </div>
        <div>
            <button type="submit">Upload Image</button>
        </div>
    </form>
    <h2>Uploaded Images</h2>
    <ul class="image-list">
"#;

const PAGE_TAIL: &str = "    </ul>\n</body>\n</html>\n";

/// `GET /` — upload form plus a link per stored image.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let names = filter_jpeg_names(state.store.list_names().await?);
    Ok(Html(render_index(&names)))
}

/// `GET /files` — JSON array of image names in bucket listing order.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let names = filter_jpeg_names(state.store.list_names().await?);
    Ok(Json(names))
}

fn render_index(names: &[String]) -> String {
    let mut html = String::from(PAGE_HEAD);
    for name in names {
        html.push_str(&format!(
            "        <li><a href=\"/files/{}\" target=\"_blank\">{}</a></li>\n",
            encode_path_segment(name),
            html_escape(name)
        ));
    }
    html.push_str(PAGE_TAIL);
    html
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
