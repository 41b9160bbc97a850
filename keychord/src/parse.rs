//! Key-expression parser.
//!
//! Grammar: `EXPR := CHORD ("," CHORD)*`, `CHORD := TOKEN ("+" TOKEN)*`.
//! A token resolves, in order, against the modifier aliases, the named
//! special keys (including runtime-registered ones), and finally single
//! alphanumerics mapped to their code-point VK.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::keycodes::{modifier_group, special_key, vk_to_key_name};

/// One chord step: ordered key groups plus the union of every accepted code.
///
/// A group is a set of interchangeable VK codes; the chord matches a pressed
/// set iff every group intersects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordSpec {
    groups: Vec<BTreeSet<u16>>,
    allowed: BTreeSet<u16>,
}

impl ChordSpec {
    pub fn groups(&self) -> &[BTreeSet<u16>] {
        &self.groups
    }

    /// Union of all group codes (the "allowed set").
    pub fn allowed(&self) -> &BTreeSet<u16> {
        &self.allowed
    }

    pub fn contains(&self, code: u16) -> bool {
        self.allowed.contains(&code)
    }

    /// Index of the group accepting `code`, if any.
    pub fn group_index(&self, code: u16) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(&code))
    }
}

/// A parsed expression: one chord, or an ordered sequence of chords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpr {
    steps: Vec<ChordSpec>,
}

impl KeyExpr {
    pub fn steps(&self) -> &[ChordSpec] {
        &self.steps
    }

    pub fn is_sequence(&self) -> bool {
        self.steps.len() > 1
    }

    /// Render the normalized form of this expression. Parsing the result
    /// reproduces the same structure.
    pub fn canonical(&self) -> String {
        let chords: Vec<String> = self
            .steps
            .iter()
            .map(|chord| {
                let tokens: Vec<String> = chord.groups.iter().map(group_token).collect();
                tokens.join("+")
            })
            .collect();
        chords.join(",")
    }
}

fn group_token(group: &BTreeSet<u16>) -> String {
    if group.len() > 1 {
        for alias in ["shift", "ctrl", "alt", "win"] {
            if modifier_group(alias).as_ref() == Some(group) {
                return alias.to_string();
            }
        }
    }
    // Parser-produced groups are either a modifier alias or a single code.
    group
        .iter()
        .next()
        .map(|code| vk_to_key_name(*code))
        .unwrap_or_default()
}

fn token_to_group(token: &str) -> Result<BTreeSet<u16>> {
    let t = token.trim().to_ascii_lowercase();
    if t.is_empty() {
        return Err(Error::EmptyChord);
    }

    if let Some(group) = modifier_group(&t) {
        return Ok(group);
    }

    if let Some(code) = special_key(&t) {
        return Ok([code].into_iter().collect());
    }

    if t.len() == 1 {
        let c = t.chars().next().unwrap().to_ascii_uppercase();
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            return Ok([c as u16].into_iter().collect());
        }
    }

    Err(Error::UnknownToken(token.trim().to_string()))
}

/// Parse a single chord like `ctrl+shift+x`.
pub fn parse_chord(expr: &str) -> Result<ChordSpec> {
    let parts: Vec<&str> = expr
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(Error::EmptyChord);
    }

    let mut groups = Vec::with_capacity(parts.len());
    let mut allowed = BTreeSet::new();
    for part in parts {
        let group = token_to_group(part)?;
        allowed.extend(group.iter().copied());
        groups.push(group);
    }
    Ok(ChordSpec { groups, allowed })
}

/// Parse a full expression like `ctrl+k,ctrl+d` (sequence of chords).
pub fn parse_key_expr(expr: &str) -> Result<KeyExpr> {
    let steps: Vec<&str> = expr
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(Error::EmptyExpression);
    }

    let steps = steps
        .into_iter()
        .map(parse_chord)
        .collect::<Result<Vec<_>>>()?;
    Ok(KeyExpr { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::vk;

    #[test]
    fn parse_single_key() {
        let expr = parse_key_expr("e").expect("expression expected");
        assert!(!expr.is_sequence());
        assert_eq!(expr.steps().len(), 1);
        assert!(expr.steps()[0].contains(0x45));
    }

    #[test]
    fn parse_modifier_chord() {
        let expr = parse_key_expr("ctrl + e").expect("expression expected");
        let chord = &expr.steps()[0];
        assert_eq!(chord.groups().len(), 2);
        assert!(chord.groups()[0].contains(&vk::LCONTROL));
        assert!(chord.groups()[0].contains(&vk::RCONTROL));
        assert!(chord.contains(0x45));
        assert_eq!(chord.group_index(vk::CONTROL), Some(0));
        assert_eq!(chord.group_index(0x45), Some(1));
        assert_eq!(chord.group_index(vk::LSHIFT), None);
    }

    #[test]
    fn parse_sequence() {
        let expr = parse_key_expr("g,k,i").expect("expression expected");
        assert!(expr.is_sequence());
        assert_eq!(expr.steps().len(), 3);
    }

    #[test]
    fn parse_named_and_punctuation() {
        let expr = parse_key_expr("ctrl+`").expect("expression expected");
        assert!(expr.steps()[0].contains(vk::OEM_3));
        let expr = parse_key_expr("shift+f7").expect("expression expected");
        assert!(expr.steps()[0].contains(vk::F1 + 6));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse_key_expr(""), Err(Error::EmptyExpression)));
        assert!(matches!(parse_key_expr("  ,  "), Err(Error::EmptyExpression)));
        assert!(matches!(
            parse_key_expr("ctrl+bogus"),
            Err(Error::UnknownToken(t)) if t == "bogus"
        ));
    }

    #[test]
    fn canonical_round_trip() {
        for source in ["ctrl+shift+x", "g,k,i", "alt + f4", "win+`", "ctrl+e,ctrl+d"] {
            let parsed = parse_key_expr(source).expect("expression expected");
            let rendered = parsed.canonical();
            let reparsed = parse_key_expr(&rendered).expect("canonical reparse");
            assert_eq!(parsed, reparsed, "canonical form {:?}", rendered);
        }
    }
}
