//! Minimal XML element-tree scanner, sized for the VAST subset the harness
//! consumes. Handles attributes, self-closing tags, CDATA sections,
//! comments, and the basic character entities; namespaces, DTD internals,
//! and processing-instruction content are skipped, not interpreted.

/// A parsed element: tag name, attributes, child elements, and the
/// concatenated character data directly inside the element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Character data with surrounding whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Parses a document and returns its root element, or `None` when the input
/// is not well-formed enough to walk.
pub fn parse(input: &str) -> Option<Element> {
    let bytes = input.as_bytes();
    let mut pos = 0;
    skip_misc(bytes, &mut pos);
    if pos >= bytes.len() || bytes[pos] != b'<' {
        return None;
    }
    parse_element(bytes, &mut pos)
}

/// Skips whitespace, the XML declaration, comments, and DOCTYPE-style
/// directives before or between elements.
fn skip_misc(bytes: &[u8], pos: &mut usize) {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if starts_with(bytes, *pos, b"<?") {
            skip_until(bytes, pos, b"?>");
        } else if starts_with(bytes, *pos, b"<!--") {
            skip_until(bytes, pos, b"-->");
        } else if starts_with(bytes, *pos, b"<!") {
            skip_until(bytes, pos, b">");
        } else {
            return;
        }
    }
}

fn parse_element(bytes: &[u8], pos: &mut usize) -> Option<Element> {
    // Opening tag.
    if bytes.get(*pos) != Some(&b'<') {
        return None;
    }
    *pos += 1;
    let name = read_name(bytes, pos)?;
    let mut element = Element {
        name,
        ..Element::default()
    };

    loop {
        skip_whitespace(bytes, pos);
        match bytes.get(*pos) {
            Some(b'/') => {
                // Self-closing.
                *pos += 1;
                if bytes.get(*pos) != Some(&b'>') {
                    return None;
                }
                *pos += 1;
                return Some(element);
            }
            Some(b'>') => {
                *pos += 1;
                break;
            }
            Some(_) => {
                let (key, value) = read_attribute(bytes, pos)?;
                element.attributes.push((key, value));
            }
            None => return None,
        }
    }

    // Content until the matching close tag.
    loop {
        if *pos >= bytes.len() {
            return None;
        }
        if starts_with(bytes, *pos, b"<![CDATA[") {
            *pos += b"<![CDATA[".len();
            let start = *pos;
            let end = find(bytes, *pos, b"]]>")?;
            element
                .text
                .push_str(&String::from_utf8_lossy(&bytes[start..end]));
            *pos = end + b"]]>".len();
        } else if starts_with(bytes, *pos, b"<!--") {
            skip_until(bytes, pos, b"-->");
        } else if starts_with(bytes, *pos, b"</") {
            *pos += 2;
            let close = read_name(bytes, pos)?;
            skip_whitespace(bytes, pos);
            if bytes.get(*pos) != Some(&b'>') || close != element.name {
                return None;
            }
            *pos += 1;
            return Some(element);
        } else if bytes.get(*pos) == Some(&b'<') {
            let child = parse_element(bytes, pos)?;
            element.children.push(child);
        } else {
            let start = *pos;
            while *pos < bytes.len() && bytes[*pos] != b'<' {
                *pos += 1;
            }
            let raw = String::from_utf8_lossy(&bytes[start..*pos]);
            element.text.push_str(&decode_entities(&raw));
        }
    }
}

fn read_name(bytes: &[u8], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while *pos < bytes.len()
        && (bytes[*pos].is_ascii_alphanumeric() || matches!(bytes[*pos], b'_' | b'-' | b':' | b'.'))
    {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[start..*pos]).into_owned())
}

fn read_attribute(bytes: &[u8], pos: &mut usize) -> Option<(String, String)> {
    let key = read_name(bytes, pos)?;
    skip_whitespace(bytes, pos);
    if bytes.get(*pos) != Some(&b'=') {
        // Bare attribute with no value.
        return Some((key, String::new()));
    }
    *pos += 1;
    skip_whitespace(bytes, pos);
    let quote = match bytes.get(*pos) {
        Some(&q @ (b'"' | b'\'')) => q,
        _ => return None,
    };
    *pos += 1;
    let start = *pos;
    while *pos < bytes.len() && bytes[*pos] != quote {
        *pos += 1;
    }
    if *pos >= bytes.len() {
        return None;
    }
    let value = decode_entities(&String::from_utf8_lossy(&bytes[start..*pos]));
    *pos += 1;
    Some((key, value))
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn skip_whitespace(bytes: &[u8], pos: &mut usize) {
    while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

fn starts_with(bytes: &[u8], pos: usize, prefix: &[u8]) -> bool {
    bytes.len() >= pos + prefix.len() && &bytes[pos..pos + prefix.len()] == prefix
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    (from..=bytes.len().saturating_sub(needle.len())).find(|&i| starts_with(bytes, i, needle))
}

fn skip_until(bytes: &[u8], pos: &mut usize, needle: &[u8]) {
    match find(bytes, *pos, needle) {
        Some(at) => *pos = at + needle.len(),
        None => *pos = bytes.len(),
    }
}
