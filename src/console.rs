//! Operator commands typed on the kiosk's terminal.

use crate::positions::{ElementPosition, FaceElement};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Simulated positive sensor reading.
    Pulse,
    /// Debug override: force presence on.
    Test,
    Status,
    Place(FaceElement, ElementPosition),
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err("empty command".to_string());
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "pulse" => ConsoleCommand::Pulse,
            "test" => ConsoleCommand::Test,
            "status" => ConsoleCommand::Status,
            "quit" | "exit" => ConsoleCommand::Quit,
            "place" => {
                let element: FaceElement = parts
                    .next()
                    .ok_or("usage: place <eyes|mouth> <x> <y>")?
                    .parse()?;
                let x = parse_coord(parts.next())?;
                let y = parse_coord(parts.next())?;
                ConsoleCommand::Place(element, ElementPosition::new(x, y))
            }
            other => return Err(format!("unknown command '{}'", other)),
        };
        if parts.next().is_some() {
            return Err(format!("too many arguments for '{}'", verb));
        }
        Ok(command)
    }
}

fn parse_coord(raw: Option<&str>) -> Result<f32, String> {
    let raw = raw.ok_or("usage: place <eyes|mouth> <x> <y>")?;
    raw.parse::<f32>()
        .map_err(|_| format!("'{}' is not a number", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!("pulse".parse(), Ok(ConsoleCommand::Pulse));
        assert_eq!("  TEST ".parse(), Ok(ConsoleCommand::Test));
        assert_eq!("status".parse(), Ok(ConsoleCommand::Status));
        assert_eq!("exit".parse(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_place_clamps() {
        assert_eq!(
            "place mouth 0.25 1.5".parse(),
            Ok(ConsoleCommand::Place(
                FaceElement::Mouth,
                ElementPosition::new(0.25, 1.0)
            ))
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("dance".parse::<ConsoleCommand>().is_err());
        assert!("place".parse::<ConsoleCommand>().is_err());
        assert!("place nose 0.1 0.1".parse::<ConsoleCommand>().is_err());
        assert!("place eyes x 0.1".parse::<ConsoleCommand>().is_err());
        assert!("pulse twice".parse::<ConsoleCommand>().is_err());
    }
}
