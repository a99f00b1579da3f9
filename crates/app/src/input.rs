use thiserror::Error;

/// One line typed during `take`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Next,
    Previous,
    /// Zero-based question index.
    GoTo(usize),
    Choose(u64),
    Write(String),
    Submit,
    Quit,
    Help,
    /// Blank line: just redraw.
    Redraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown command `{0}`; type `h` for help")]
    UnknownCommand(String),

    #[error("`{command}` needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },

    #[error("`{0}` is not a valid number")]
    InvalidNumber(String),

    #[error("question numbers start at 1")]
    ZeroQuestion,
}

impl Input {
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => Ok(Input::Redraw),
            "n" | "next" => Ok(Input::Next),
            "p" | "prev" | "previous" => Ok(Input::Previous),
            "s" | "submit" => Ok(Input::Submit),
            "q" | "quit" => Ok(Input::Quit),
            "h" | "help" | "?" => Ok(Input::Help),
            "g" | "goto" => {
                let number = number(rest, "g", "a question number")?;
                let index = usize::try_from(number)
                    .map_err(|_| InputError::InvalidNumber(rest.to_owned()))?
                    .checked_sub(1)
                    .ok_or(InputError::ZeroQuestion)?;
                Ok(Input::GoTo(index))
            }
            "a" | "answer" => Ok(Input::Choose(number(rest, "a", "an option id")?)),
            "w" | "write" => {
                if rest.is_empty() {
                    return Err(InputError::MissingArgument {
                        command: "w",
                        what: "some text",
                    });
                }
                Ok(Input::Write(rest.to_owned()))
            }
            other => Err(InputError::UnknownCommand(other.to_owned())),
        }
    }
}

fn number(raw: &str, command: &'static str, what: &'static str) -> Result<u64, InputError> {
    if raw.is_empty() {
        return Err(InputError::MissingArgument { command, what });
    }
    raw.parse()
        .map_err(|_| InputError::InvalidNumber(raw.to_owned()))
}

pub const HELP: &str = "\
commands:
  n, next          next question
  p, prev          previous question
  g <n>            go to question n
  a <option>       choose an option (multiple choice)
  w <text>         write your answer (essay)
  s, submit        submit the exam
  q, quit          leave without submitting";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation() {
        assert_eq!(Input::parse("n"), Ok(Input::Next));
        assert_eq!(Input::parse("  prev "), Ok(Input::Previous));
        assert_eq!(Input::parse("g 3"), Ok(Input::GoTo(2)));
        assert_eq!(Input::parse(""), Ok(Input::Redraw));
    }

    #[test]
    fn question_numbers_are_one_based() {
        assert_eq!(Input::parse("g 0"), Err(InputError::ZeroQuestion));
        assert_eq!(
            Input::parse("g x"),
            Err(InputError::InvalidNumber("x".into()))
        );
    }

    #[test]
    fn essay_text_keeps_inner_spacing() {
        assert_eq!(
            Input::parse("w  shift()  removes the first element "),
            Ok(Input::Write("shift()  removes the first element".into()))
        );
    }

    #[test]
    fn answer_needs_an_option() {
        assert!(matches!(
            Input::parse("a"),
            Err(InputError::MissingArgument { command: "a", .. })
        ));
        assert_eq!(Input::parse("a 2"), Ok(Input::Choose(2)));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(
            Input::parse("jump"),
            Err(InputError::UnknownCommand("jump".into()))
        );
    }
}
