//! Line commands for the terminal client.
//!
//! ```text
//! move X Y              publish a cursor position
//! say TEXT              send a chat line
//! where LOCATION [FLAG] update location (and flag)
//! hover WHO             pointer enters a remote cursor (name or id prefix)
//! leave WHO             pointer leaves it
//! quit                  disconnect
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Move { x: f32, y: f32 },
    Say(String),
    Where { location: String, flag: Option<String> },
    Hover(String),
    Leave(String),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

impl Input {
    /// Parse one line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Input>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let input = match command.to_ascii_lowercase().as_str() {
            "move" | "m" => {
                let mut coords = rest.split_whitespace().map(str::parse::<f32>);
                match (coords.next(), coords.next(), coords.next()) {
                    (Some(Ok(x)), Some(Ok(y)), None) => Input::Move { x, y },
                    _ => return Err(ParseError("usage: move X Y".into())),
                }
            }
            "say" | "s" => {
                if rest.is_empty() {
                    return Err(ParseError("usage: say TEXT".into()));
                }
                Input::Say(rest.to_string())
            }
            "where" | "w" => {
                let mut parts = rest.split_whitespace();
                let Some(location) = parts.next() else {
                    return Err(ParseError("usage: where LOCATION [FLAG]".into()));
                };
                Input::Where {
                    location: location.to_string(),
                    flag: parts.next().map(str::to_string),
                }
            }
            "hover" => Input::Hover(required(rest, "hover WHO")?),
            "leave" => Input::Leave(required(rest, "leave WHO")?),
            "quit" | "exit" | "q" => Input::Quit,
            other => return Err(ParseError(format!("unknown command: {other}"))),
        };
        Ok(Some(input))
    }
}

fn required(rest: &str, usage: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError(format!("usage: {usage}")))
    } else {
        Ok(rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        assert_eq!(
            Input::parse("move 100 200").unwrap(),
            Some(Input::Move { x: 100.0, y: 200.0 })
        );
        assert_eq!(
            Input::parse("  M -1.5 2 ").unwrap(),
            Some(Input::Move { x: -1.5, y: 2.0 })
        );
        assert!(Input::parse("move 1").is_err());
        assert!(Input::parse("move a b").is_err());
        assert!(Input::parse("move 1 2 3").is_err());
    }

    #[test]
    fn test_parse_say_keeps_spacing() {
        assert_eq!(
            Input::parse("say hello   there").unwrap(),
            Some(Input::Say("hello   there".into()))
        );
        assert!(Input::parse("say").is_err());
    }

    #[test]
    fn test_parse_where() {
        assert_eq!(
            Input::parse("where /pricing FR").unwrap(),
            Some(Input::Where {
                location: "/pricing".into(),
                flag: Some("FR".into()),
            })
        );
        assert_eq!(
            Input::parse("w /home").unwrap(),
            Some(Input::Where {
                location: "/home".into(),
                flag: None,
            })
        );
        assert!(Input::parse("where").is_err());
    }

    #[test]
    fn test_parse_hover_leave_quit() {
        assert_eq!(Input::parse("hover Ann").unwrap(), Some(Input::Hover("Ann".into())));
        assert_eq!(Input::parse("leave Ann").unwrap(), Some(Input::Leave("Ann".into())));
        assert_eq!(Input::parse("quit").unwrap(), Some(Input::Quit));
        assert!(Input::parse("hover").is_err());
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(Input::parse("   ").unwrap(), None);
        assert_eq!(
            Input::parse("dance").unwrap_err(),
            ParseError("unknown command: dance".into())
        );
    }
}
