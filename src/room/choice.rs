//! Multiple-choice prompts embedded in narrator messages.
//!
//! A narrator message such as
//!
//! ```text
//! @Alice the bridge creaks under you.
//! A) Run across
//! B) Climb down
//! C) Turn back
//! ```
//!
//! yields a [`ChoiceSet`] for Alice only. Other participants see the raw text.

use std::fmt;

use super::event::RoomEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceKey {
    A,
    B,
    C,
}

impl ChoiceKey {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(ChoiceKey::A),
            'B' => Some(ChoiceKey::B),
            'C' => Some(ChoiceKey::C),
            _ => None,
        }
    }

    /// Case-insensitive parse of user input such as `b` or ` C `.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.trim().chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Self::from_char(c.to_ascii_uppercase())
    }

    pub fn as_char(&self) -> char {
        match self {
            ChoiceKey::A => 'A',
            ChoiceKey::B => 'B',
            ChoiceKey::C => 'C',
        }
    }
}

impl fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub key: ChoiceKey,
    pub text: String,
}

impl ChoiceOption {
    /// The chat line submitted when this option is picked.
    pub fn canonical_phrase(&self) -> String {
        format!("I choose {}: {}", self.key, self.text)
    }
}

/// Options presented to one participant. Selecting any option disables the
/// whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSet {
    pub addressed: String,
    pub options: Vec<ChoiceOption>,
    selected: Option<ChoiceKey>,
}

impl ChoiceSet {
    pub fn is_open(&self) -> bool {
        self.selected.is_none()
    }

    pub fn selected(&self) -> Option<ChoiceKey> {
        self.selected
    }

    pub fn option(&self, key: ChoiceKey) -> Option<&ChoiceOption> {
        self.options.iter().find(|o| o.key == key)
    }

    /// Mark `key` as chosen. Fails when the set is already used or the key is
    /// not offered.
    pub fn claim(&mut self, key: ChoiceKey) -> Option<ChoiceOption> {
        if self.selected.is_some() {
            return None;
        }
        let option = self.option(key)?.clone();
        self.selected = Some(key);
        Some(option)
    }

    /// Re-open the set after a submission that never reached the server.
    pub fn release(&mut self) {
        self.selected = None;
    }
}

/// The first `@name` token in `content`, if any.
pub fn addressed_identity(content: &str) -> Option<&str> {
    let mut rest = content;
    while let Some(pos) = rest.find('@') {
        let after = &rest[pos + 1..];
        let end = after
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        if end > 0 {
            return Some(&after[..end]);
        }
        rest = after;
    }
    None
}

fn parse_option_line(line: &str) -> Option<ChoiceOption> {
    let line = line.trim();
    let mut chars = line.chars();
    let key = ChoiceKey::from_char(chars.next()?)?;
    if chars.next()? != ')' {
        return None;
    }
    let text = chars.as_str().trim();
    if text.is_empty() {
        return None;
    }
    Some(ChoiceOption {
        key,
        text: text.to_string(),
    })
}

/// Build the choice set `identity` should see for `event`, if any.
pub fn extract(event: &RoomEvent, narrator: &str, identity: &str) -> Option<ChoiceSet> {
    if event.sender != narrator {
        return None;
    }
    let addressed = addressed_identity(&event.content)?;
    if addressed.to_lowercase() != identity.to_lowercase() {
        return None;
    }
    let options: Vec<ChoiceOption> = event.content.lines().filter_map(parse_option_line).collect();
    if options.is_empty() {
        return None;
    }
    Some(ChoiceSet {
        addressed: addressed.to_string(),
        options,
        selected: None,
    })
}
