//! Registration config blob parser.
//!
//! A simulator's HELLO carries one frame of hierarchical key-value text.
//! Nesting is expressed by indentation, four spaces per level:
//!
//! ```text
//! name = simA
//! time_delta = 1s
//! values
//!     hv_load
//!         topic = feeder7/hv_load
//!         default = 0
//! ```
//!
//! Leaves are `name = value` (quotes around the value are stripped); a bare
//! `name` opens a section. Lines whose first non-space character is `#` are
//! comments. The broker consumes `/time_delta` and the children of `/values`.

use thiserror::Error;

/// Errors from config blob parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config blob is not valid UTF-8")]
    NotUtf8,

    #[error("line {0}: indentation is not a multiple of four spaces")]
    BadIndent(usize),

    #[error("line {0}: indented deeper than any open section")]
    OrphanIndent(usize),

    #[error("line {0}: tab characters are not allowed in indentation")]
    TabIndent(usize),

    #[error("line {0}: entry has no name")]
    MissingName(usize),
}

/// One named entry: an optional value plus nested children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNode {
    name: String,
    value: Option<String>,
    children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Value of the first child with the given name.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.value())
    }
}

/// A parsed config blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    roots: Vec<ConfigNode>,
}

impl ConfigTree {
    /// Parse a config blob from raw frame bytes.
    pub fn parse(bytes: &[u8]) -> Result<ConfigTree, ConfigError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?;
        let mut roots: Vec<ConfigNode> = Vec::new();
        // Indices into the tree of the currently open node per level.
        let mut open: Vec<usize> = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = raw.trim_start_matches(' ');
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if trimmed.starts_with('\t') {
                return Err(ConfigError::TabIndent(line_no));
            }

            let indent = raw.len() - trimmed.len();
            if indent % 4 != 0 {
                return Err(ConfigError::BadIndent(line_no));
            }
            let level = indent / 4;
            if level > open.len() {
                return Err(ConfigError::OrphanIndent(line_no));
            }

            let node = parse_entry(trimmed, line_no)?;

            open.truncate(level);
            let siblings = open
                .iter()
                .fold(&mut roots, |nodes, &idx| &mut nodes[idx].children);
            siblings.push(node);
            let idx = siblings.len() - 1;
            open.push(idx);
        }

        Ok(ConfigTree { roots })
    }

    /// Top-level entries in document order.
    pub fn roots(&self) -> &[ConfigNode] {
        &self.roots
    }

    /// Resolve a `/`-separated path to a node.
    pub fn section(&self, path: &str) -> Option<&ConfigNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.roots.iter().find(|n| n.name == first)?;
        for segment in segments {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Resolve a `/`-separated path to a leaf value.
    pub fn value(&self, path: &str) -> Option<&str> {
        self.section(path).and_then(|n| n.value())
    }
}

fn parse_entry(trimmed: &str, line_no: usize) -> Result<ConfigNode, ConfigError> {
    let (name, value) = match trimmed.split_once('=') {
        Some((name, value)) => (name.trim(), Some(unquote(value.trim()).to_string())),
        None => (trimmed.trim_end(), None),
    };
    if name.is_empty() {
        return Err(ConfigError::MissingName(line_no));
    }
    Ok(ConfigNode {
        name: name.to_string(),
        value,
        children: Vec::new(),
    })
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOB: &str = "\
# simulator registration
name = simA
time_delta = 500ms
values
    hv_load
        topic = feeder7/hv_load
        default = 0
    price = market/price
";

    #[test]
    fn test_top_level_values() {
        let tree = ConfigTree::parse(BLOB.as_bytes()).unwrap();
        assert_eq!(tree.value("/time_delta"), Some("500ms"));
        assert_eq!(tree.value("/name"), Some("simA"));
    }

    #[test]
    fn test_nested_sections() {
        let tree = ConfigTree::parse(BLOB.as_bytes()).unwrap();
        let values = tree.section("/values").unwrap();
        assert_eq!(values.children().len(), 2);
        assert_eq!(
            values.child("hv_load").unwrap().value_of("topic"),
            Some("feeder7/hv_load")
        );
        assert_eq!(values.child("price").unwrap().value(), Some("market/price"));
    }

    #[test]
    fn test_deep_path_resolution() {
        let tree = ConfigTree::parse(BLOB.as_bytes()).unwrap();
        assert_eq!(tree.value("/values/hv_load/topic"), Some("feeder7/hv_load"));
        assert_eq!(tree.value("/values/hv_load/default"), Some("0"));
    }

    #[test]
    fn test_missing_keys() {
        let tree = ConfigTree::parse(BLOB.as_bytes()).unwrap();
        assert_eq!(tree.value("/absent"), None);
        assert!(tree.section("/values/absent").is_none());
    }

    #[test]
    fn test_quoted_values() {
        let tree = ConfigTree::parse(b"greeting = \"hello world\"").unwrap();
        assert_eq!(tree.value("/greeting"), Some("hello world"));
    }

    #[test]
    fn test_empty_blob() {
        let tree = ConfigTree::parse(b"").unwrap();
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let tree = ConfigTree::parse(b"# header\n\na = 1\n  # note\n").unwrap();
        // The indented comment line is skipped before indentation checks.
        assert_eq!(tree.value("/a"), Some("1"));
    }

    #[test]
    fn test_bad_indent_rejected() {
        let err = ConfigTree::parse(b"a\n   b = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadIndent(2)));
    }

    #[test]
    fn test_orphan_indent_rejected() {
        let err = ConfigTree::parse(b"a = 1\n        b = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::OrphanIndent(2)));
    }

    #[test]
    fn test_tab_indent_rejected() {
        let err = ConfigTree::parse(b"a\n\tb = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::TabIndent(2)));
    }

    #[test]
    fn test_not_utf8() {
        assert!(matches!(
            ConfigTree::parse(&[0xff, 0xfe]),
            Err(ConfigError::NotUtf8)
        ));
    }
}
