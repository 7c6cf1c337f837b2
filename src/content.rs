//! Article HTML rewriting for the Kobo renderer.
//!
//! The device cannot load remote images from article bodies. Each `<img>` is
//! replaced by an `<!--IMG_n-->` comment and its source is returned in a side
//! table; the device fetches the images separately and splices them back in
//! by ordinal.

use html5ever::serialize::{SerializeOpts, serialize};
use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub ordinal: usize,
    pub source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenArticle {
    pub html: String,
    pub images: Vec<ImageRef>,
}

pub fn marker(ordinal: usize) -> String {
    format!("IMG_{}", ordinal)
}

/// Replaces every image element with an ordinal marker comment.
///
/// Running this on its own output finds no images and returns the document
/// unchanged with an empty table.
pub fn rewrite_images(html: &str) -> RewrittenArticle {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);

    let mut images = Vec::new();
    replace_images(&dom.document, &mut images);

    RewrittenArticle {
        html: render(&dom.document),
        images,
    }
}

fn image_source(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, attrs, .. } if &*name.local == "img" => Some(
            attrs
                .borrow()
                .iter()
                .find(|attr| &*attr.name.local == "src")
                .map(|attr| attr.value.to_string())
                .unwrap_or_default(),
        ),
        _ => None,
    }
}

// Pre-order, so ordinals follow document order.
fn replace_images(node: &Handle, images: &mut Vec<ImageRef>) {
    let mut children = node.children.borrow_mut();
    for child in children.iter_mut() {
        match image_source(child) {
            Some(source_url) => {
                let ordinal = images.len();
                images.push(ImageRef {
                    ordinal,
                    source_url,
                });

                let comment = Node::new(NodeData::Comment {
                    contents: marker(ordinal).into(),
                });
                comment.parent.set(Some(Rc::downgrade(node)));
                *child = comment;
            }
            None => replace_images(child, images),
        }
    }
}

fn render(document: &Handle) -> String {
    let mut out = Vec::new();
    let handle: SerializableHandle = document.clone().into();
    if let Err(e) = serialize(&mut out, &handle, SerializeOpts::default()) {
        // Writing into a Vec cannot fail; keep whatever was produced.
        tracing::warn!(error = %e, "failed to serialize article html");
    }
    String::from_utf8_lossy(&out).into_owned()
}
