//! Flat-file move list.
//!
//! Not a gcode interpreter (see SPEC_FULL.md §1): each non-blank,
//! non-comment line is one absolute `x y z e [feedrate]` move target,
//! whitespace-separated. A missing feedrate falls back to the
//! configured planner speed.

use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy)]
pub struct MoveTarget {
    pub pos: [f64; 4],
    pub feedrate: Option<f64>,
}

pub fn load_moves(path: &Path) -> Result<Vec<MoveTarget>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read moves file: {:?}", path))?;
    parse_moves(&text)
}

fn parse_moves(text: &str) -> Result<Vec<MoveTarget>> {
    let mut moves = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 5 {
            anyhow::bail!("line {}: expected 4 or 5 fields (x y z e [feedrate]), found {}", line_no + 1, fields.len());
        }
        let mut pos = [0.0; 4];
        for (i, field) in fields[..4].iter().enumerate() {
            pos[i] = field.parse::<f64>().with_context(|| format!("line {}: invalid number {:?}", line_no + 1, field))?;
        }
        let feedrate = match fields.get(4) {
            Some(field) => Some(field.parse::<f64>().with_context(|| format!("line {}: invalid feedrate {:?}", line_no + 1, field))?),
            None => None,
        };
        moves.push(MoveTarget { pos, feedrate });
    }
    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moves_skipping_blank_lines_and_comments() {
        let text = "\n# comment\n10 0 0 0\n20 5 0 1.5 50\n";
        let moves = parse_moves(text).unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].pos, [10.0, 0.0, 0.0, 0.0]);
        assert_eq!(moves[0].feedrate, None);
        assert_eq!(moves[1].feedrate, Some(50.0));
    }

    #[test]
    fn rejects_a_line_with_the_wrong_field_count() {
        let err = parse_moves("1 2 3\n").unwrap_err();
        assert!(err.to_string().contains("expected 4 or 5 fields"));
    }
}
