//! Message body decoding
//!
//! Gmail delivers message bodies as a tree of MIME parts whose payload data
//! is base64url encoded. Decoding reduces that tree to the plain text the
//! pipeline stores on tickets and comments.

use base64::prelude::*;

use crate::gmail::api::{GmailMessage, MessagePart, MessagePayload};

/// A MIME part reduced to what decoding cares about: either a leaf carrying
/// encoded data, or a container of nested parts.
#[derive(Debug, Clone)]
pub enum BodyNode {
    Leaf {
        mime_type: String,
        data: Option<String>,
    },
    Container(Vec<BodyNode>),
}

impl BodyNode {
    /// Build the node for one MIME part. A part with nested parts is a
    /// container; its own body data, if any, is not content.
    fn from_part(part: &MessagePart) -> BodyNode {
        match &part.parts {
            Some(parts) if !parts.is_empty() => {
                BodyNode::Container(parts.iter().map(BodyNode::from_part).collect())
            }
            _ => BodyNode::Leaf {
                mime_type: part.mime_type.clone().unwrap_or_default(),
                data: part.body.as_ref().and_then(|b| b.data.clone()),
            },
        }
    }
}

/// Extract the plain text body of a message.
///
/// Multipart bodies are flattened in part order: every `text/plain` leaf is
/// appended (newline-separated). Only when the whole tree holds no plain
/// text does the first `text/html` leaf, stripped of tags, stand in. Other
/// leaf types (attachments, images) contribute nothing. A message with no
/// parts has its top-level body decoded directly. Returns an empty string
/// when nothing decodable is present.
pub fn extract_plain_text(message: &GmailMessage) -> String {
    match &message.payload {
        Some(payload) => flatten_payload(payload),
        None => String::new(),
    }
}

/// Flatten a payload into text
pub fn flatten_payload(payload: &MessagePayload) -> String {
    match &payload.parts {
        Some(parts) if !parts.is_empty() => {
            let mut plain = String::new();
            let mut html = String::new();
            for node in parts.iter().map(BodyNode::from_part) {
                collect_text(&node, &mut plain, &mut html);
            }
            if plain.is_empty() { html } else { plain }
        }
        // No parts: the top-level body is the whole message
        _ => payload
            .body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .and_then(decode_base64)
            .unwrap_or_default(),
    }
}

/// Fold one node into the plain-text accumulator, or the html fallback
fn collect_text(node: &BodyNode, plain: &mut String, html: &mut String) {
    match node {
        BodyNode::Leaf { mime_type, data } => {
            let Some(data) = data else { return };
            if mime_type.starts_with("text/plain") {
                if let Some(decoded) = decode_base64(data) {
                    plain.push_str(&decoded);
                    plain.push('\n');
                }
            } else if mime_type.starts_with("text/html")
                && html.is_empty()
                && let Some(decoded) = decode_base64(data)
            {
                html.push_str(&strip_html_tags(&decoded));
            }
        }
        BodyNode::Container(children) => {
            for child in children {
                collect_text(child, plain, html);
            }
        }
    }
}

/// Extract a header value by name (case-insensitive)
pub fn header_value(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Decode base64-encoded text
///
/// Gmail uses URL-safe base64 but padding can vary (and push envelopes use
/// the standard alphabet), so we try multiple decoders.
pub fn decode_base64(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            if let Ok(s) = String::from_utf8(decoded) {
                return Some(s);
            }
        }
    }

    None
}

/// Remove HTML tags, keeping text content.
///
/// A deliberately simple scanner: everything between `<` and `>` is dropped.
pub fn strip_html_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    text
}
