//! SVG-style path data parsing.
//!
//! Supports the absolute commands `M`, `L`, `Q`, `C` and `Z`/`z`. Coordinates
//! after a command repeat it (after `M` they become implicit `L`), matching
//! SVG path grammar.

use glam::Vec2;

use crate::error::{Error, Result};
use crate::path::Path;
use crate::segment::Segment;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Command(char),
    Number(f32),
}

fn tokenize(data: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = data.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ',' {
            i += 1;
        } else if c.is_ascii_alphabetic() && c != 'e' && c != 'E' {
            tokens.push(Token::Command(c));
            i += 1;
        } else if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' {
            let start = i;
            i += 1;
            while i < chars.len() {
                let n = chars[i];
                let after_exponent = matches!(chars[i - 1], 'e' | 'E');
                if n.is_ascii_digit() || n == '.' || n == 'e' || n == 'E' {
                    i += 1;
                } else if (n == '-' || n == '+') && after_exponent {
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f32>().map_err(|_| Error::Malformed {
                position: tokens.len(),
                reason: format!("invalid number '{}'", text),
            })?;
            tokens.push(Token::Number(value));
        } else {
            return Err(Error::Malformed {
                position: tokens.len(),
                reason: format!("unexpected character '{}'", c),
            });
        }
    }

    Ok(tokens)
}

fn take_point(tokens: &[Token], i: &mut usize) -> Result<Vec2> {
    match (tokens.get(*i), tokens.get(*i + 1)) {
        (Some(Token::Number(x)), Some(Token::Number(y))) => {
            *i += 2;
            Ok(Vec2::new(*x, *y))
        }
        _ => Err(Error::Malformed {
            position: *i,
            reason: "expected coordinate pair".to_string(),
        }),
    }
}

pub(crate) fn parse_path(data: &str) -> Result<Path> {
    let tokens = tokenize(data)?;
    let mut segments = Vec::new();
    let mut command: Option<char> = None;
    let mut cursor: Option<Vec2> = None;
    let mut subpath_start = Vec2::ZERO;
    let mut i = 0;

    while i < tokens.len() {
        if let Token::Command(c) = tokens[i] {
            i += 1;
            if c == 'Z' || c == 'z' {
                let current = cursor.ok_or_else(|| Error::Malformed {
                    position: i - 1,
                    reason: "close before moveto".to_string(),
                })?;
                if current != subpath_start {
                    segments.push(Segment::Line {
                        from: current,
                        to: subpath_start,
                    });
                }
                cursor = Some(subpath_start);
                command = Some(c);
                continue;
            }
            command = Some(c);
        }

        let c = command.ok_or_else(|| Error::Malformed {
            position: i,
            reason: "coordinates before any command".to_string(),
        })?;

        if c == 'M' {
            let p = take_point(&tokens, &mut i)?;
            cursor = Some(p);
            subpath_start = p;
            command = Some('L');
            continue;
        }

        let from = cursor.ok_or_else(|| Error::Malformed {
            position: i,
            reason: "drawing before moveto".to_string(),
        })?;

        let segment = match c {
            'L' => Segment::Line {
                from,
                to: take_point(&tokens, &mut i)?,
            },
            'Q' => {
                let ctrl = take_point(&tokens, &mut i)?;
                let to = take_point(&tokens, &mut i)?;
                Segment::Quadratic { from, ctrl, to }
            }
            'C' => {
                let ctrl1 = take_point(&tokens, &mut i)?;
                let ctrl2 = take_point(&tokens, &mut i)?;
                let to = take_point(&tokens, &mut i)?;
                Segment::Cubic {
                    from,
                    ctrl1,
                    ctrl2,
                    to,
                }
            }
            'Z' | 'z' => {
                return Err(Error::Malformed {
                    position: i,
                    reason: "coordinates after close".to_string(),
                })
            }
            other => return Err(Error::UnsupportedCommand(other)),
        };
        cursor = Some(segment.end());
        segments.push(segment);
    }

    Path::new(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line() {
        let path = parse_path("M 0 0 L 30 40").unwrap();
        assert_eq!(path.segments().len(), 1);
        assert_eq!(path.length(), 50.0);
    }

    #[test]
    fn parses_compact_numbers() {
        let path = parse_path("M0,0L10-5L1e1,5").unwrap();
        assert_eq!(path.end(), Vec2::new(10.0, 5.0));
        assert_eq!(path.segments().len(), 2);
    }

    #[test]
    fn implicit_lineto_after_moveto() {
        let path = parse_path("M 0 0 10 0 10 10").unwrap();
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.length(), 20.0);
    }

    #[test]
    fn parses_curves() {
        let path = parse_path("M 400 250 Q 300 180 160 120 C 100 100 60 80 40 40").unwrap();
        assert!(matches!(path.segments()[0], Segment::Quadratic { .. }));
        assert!(matches!(path.segments()[1], Segment::Cubic { .. }));
        assert_eq!(path.end(), Vec2::new(40.0, 40.0));
    }

    #[test]
    fn close_returns_to_start() {
        let path = parse_path("M 0 0 L 10 0 L 10 10 Z").unwrap();
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.end(), Vec2::new(0.0, 0.0));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_path(""), Err(Error::EmptyPath));
        assert_eq!(parse_path("M 0 0"), Err(Error::EmptyPath));
        assert_eq!(parse_path("M 0 0 A 5 5 0 0 1 10 10"), Err(Error::UnsupportedCommand('A')));
        assert!(matches!(parse_path("L 10 10"), Err(Error::Malformed { .. })));
        assert!(matches!(parse_path("M 0 0 L 10"), Err(Error::Malformed { .. })));
        assert!(matches!(parse_path("M 0 0 L 1.2.3 4"), Err(Error::Malformed { .. })));
        assert!(matches!(parse_path("M 0 0 # 1 1"), Err(Error::Malformed { .. })));
    }
}
