//! Outbound link instrumentation.

/// File extensions treated as downloads.
pub const DEFAULT_DOWNLOAD_EXTENSIONS: [&str; 11] = [
    "doc", "pdf", "png", "gif", "jpg", "bmp", "exe", "zip", "msi", "mp3", "wmv",
];

/// Longest link text sent as an event description.
pub const MAX_LINK_TEXT: usize = 255;

/// An anchor on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    /// Visible text
    pub text: String,
    /// The page already handles mousedown on this link
    pub has_handler: bool,
}

impl Link {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
            has_handler: false,
        }
    }
}

/// A loaded page as the sensor sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub title: String,
    /// URL of the page that linked here
    pub referrer: String,
    pub links: Vec<Link>,
}

/// What pressing a link does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Send a `file` event for the download
    Download { href: String, text: String },
    /// Remember the link's 1-based position for the next page's event
    Attribute { refer_id: i64 },
    /// The page handles this link itself
    Untouched,
}

/// Per-link actions for one instrumented document, by link position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkWatch {
    actions: Vec<LinkAction>,
}

impl LinkWatch {
    pub fn action(&self, index: usize) -> Option<&LinkAction> {
        self.actions.get(index)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Lowercased extension of the last path segment, ignoring query and
/// fragment.
pub fn link_extension(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let path = match path.find("://") {
        Some(pos) => {
            let after_scheme = &path[pos + 3..];
            after_scheme.find('/').map(|p| &after_scheme[p..]).unwrap_or("")
        }
        None => path,
    };
    let segment = path.rsplit('/').next().unwrap_or_default();
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

pub fn is_download(href: &str, extensions: &[String]) -> bool {
    link_extension(href).is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
}

/// Link text trimmed to [`MAX_LINK_TEXT`] characters.
pub fn link_text(text: &str) -> String {
    text.chars().take(MAX_LINK_TEXT).collect()
}

/// Decide the action of every link in the document.
pub fn watch_links(document: &Document, extensions: &[String]) -> LinkWatch {
    let actions = document
        .links
        .iter()
        .enumerate()
        .map(|(index, link)| {
            if link.has_handler {
                LinkAction::Untouched
            } else if is_download(&link.href, extensions) {
                LinkAction::Download {
                    href: link.href.clone(),
                    text: link_text(&link.text),
                }
            } else {
                LinkAction::Attribute {
                    refer_id: index as i64 + 1,
                }
            }
        })
        .collect();

    LinkWatch { actions }
}
