//! Selector lists understood by the host page model.
//! Supports comma-separated compounds of `tag` (or `*`), `#id` and `.class`;
//! combinators and attribute selectors are rejected at parse time.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn matches(&self, tag: &str, id: Option<&str>, classes: &[String]) -> bool {
        if let Some(ref want) = self.tag {
            if !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(ref want) = self.id {
            if id != Some(want.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| classes.iter().any(|have| have == c))
    }
}

/// A parsed selector list. Matches an element if any alternative matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Compound>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    Empty { selector: String },
    MissingName { selector: String },
    Unsupported { selector: String, found: char },
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Empty { selector } => {
                write!(f, "empty selector in list {selector:?}")
            }
            SelectorError::MissingName { selector } => {
                write!(f, "'.' or '#' without a name in {selector:?}")
            }
            SelectorError::Unsupported { selector, found } => {
                write!(f, "unsupported character {found:?} in selector {selector:?}")
            }
        }
    }
}

impl std::error::Error for SelectorError {}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut alternatives = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorError::Empty {
                    selector: input.to_string(),
                });
            }
            alternatives.push(parse_compound(part)?);
        }
        Ok(Self {
            source: input.trim().to_string(),
            alternatives,
        })
    }

    /// Test an element's tag, id and class list against this selector.
    pub fn matches(&self, tag: &str, id: Option<&str>, classes: &[String]) -> bool {
        self.alternatives
            .iter()
            .any(|alt| alt.matches(tag, id, classes))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn name_len(s: &str) -> usize {
    s.find(|c: char| !is_name_char(c)).unwrap_or(s.len())
}

fn parse_compound(part: &str) -> Result<Compound, SelectorError> {
    let mut compound = Compound {
        tag: None,
        id: None,
        classes: Vec::new(),
    };

    let mut rest = part;
    if let Some(stripped) = rest.strip_prefix('*') {
        rest = stripped;
    } else {
        let end = name_len(rest);
        if end > 0 {
            compound.tag = Some(rest[..end].to_ascii_lowercase());
            rest = &rest[end..];
        }
    }

    while let Some(c) = rest.chars().next() {
        if c != '.' && c != '#' {
            return Err(SelectorError::Unsupported {
                selector: part.to_string(),
                found: c,
            });
        }
        let tail = &rest[c.len_utf8()..];
        let end = name_len(tail);
        if end == 0 {
            return Err(SelectorError::MissingName {
                selector: part.to_string(),
            });
        }
        let name = tail[..end].to_string();
        if c == '.' {
            compound.classes.push(name);
        } else {
            compound.id = Some(name);
        }
        rest = &tail[end..];
    }

    Ok(compound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_any_alternative_in_list() {
        let sel = Selector::parse(".video-chat__message, .chat-line__message").unwrap();
        assert!(sel.matches("div", None, &classes(&["chat-line__message"])));
        assert!(sel.matches("div", None, &classes(&["x", "video-chat__message"])));
        assert!(!sel.matches("div", None, &classes(&["chat-line__username"])));
    }

    #[test]
    fn compound_requires_every_part() {
        let sel = Selector::parse("span.text-fragment.bold#first").unwrap();
        let cls = classes(&["bold", "text-fragment"]);
        assert!(sel.matches("SPAN", Some("first"), &cls));
        assert!(!sel.matches("div", Some("first"), &cls));
        assert!(!sel.matches("span", Some("second"), &cls));
        assert!(!sel.matches("span", Some("first"), &classes(&["bold"])));
    }

    #[test]
    fn universal_and_bare_tag() {
        assert!(Selector::parse("*").unwrap().matches("img", None, &[]));
        assert!(Selector::parse("body").unwrap().matches("body", None, &[]));
    }

    #[test]
    fn rejects_combinators_and_empty_parts() {
        assert!(matches!(
            Selector::parse("div .a"),
            Err(SelectorError::Unsupported { found: ' ', .. })
        ));
        assert!(matches!(
            Selector::parse("div > .a"),
            Err(SelectorError::Unsupported { .. })
        ));
        assert!(matches!(Selector::parse(".a,"), Err(SelectorError::Empty { .. })));
        assert!(matches!(Selector::parse(""), Err(SelectorError::Empty { .. })));
        assert!(matches!(Selector::parse("div."), Err(SelectorError::MissingName { .. })));
    }

    #[test]
    fn display_keeps_source() {
        let sel = Selector::parse(" .a, .b ").unwrap();
        assert_eq!(sel.to_string(), ".a, .b");
    }
}
