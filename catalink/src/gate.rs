use crate::errors::Result;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// A blocking yes/no checkpoint between pipeline stages.
pub trait ConfirmationGate {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Prompts on a terminal. An empty answer means yes; unrecognised answers
/// are asked again. End of input declines.
pub struct StdinGate<R, W> {
    input: R,
    output: W,
}

impl StdinGate<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn new() -> Self {
        Self {
            input: std::io::stdin().lock(),
            output: std::io::stdout(),
        }
    }
}

impl<R: BufRead, W: Write> StdinGate<R, W> {
    pub fn with_io(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConfirmationGate for StdinGate<R, W> {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        loop {
            write!(self.output, "{message} (Y/n): ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(false);
            }
            match line.trim().to_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(self.output, "Invalid input. Please enter 'Y' or 'n'.")?,
            }
        }
    }
}

/// Approves every stage without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl ConfirmationGate for AutoApprove {
    fn confirm(&mut self, _message: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Replays fixed answers, then approves. Records the prompts it was shown.
#[derive(Debug, Default)]
pub struct ScriptedGate {
    answers: VecDeque<bool>,
    pub prompts: Vec<String>,
}

impl ScriptedGate {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            prompts: Vec::new(),
        }
    }
}

impl ConfirmationGate for ScriptedGate {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        self.prompts.push(message.to_string());
        Ok(self.answers.pop_front().unwrap_or(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let answer = StdinGate::with_io(input.as_bytes(), &mut output)
            .confirm("Proceed?")
            .unwrap();
        (answer, String::from_utf8(output).unwrap())
    }

    #[test]
    fn empty_answer_defaults_to_yes() {
        assert!(ask("\n").0);
        assert!(ask("YES\n").0);
    }

    #[test]
    fn invalid_answer_reprompts() {
        let (answer, output) = ask("maybe\nn\n");
        assert!(!answer);
        assert_eq!(output.matches("Proceed? (Y/n): ").count(), 2);
        assert!(output.contains("Invalid input"));
    }

    #[test]
    fn closed_input_declines() {
        assert!(!ask("").0);
    }

    #[test]
    fn scripted_gate_records_prompts() {
        let mut gate = ScriptedGate::new([true, false]);
        assert!(gate.confirm("one").unwrap());
        assert!(!gate.confirm("two").unwrap());
        assert!(gate.confirm("three").unwrap());
        assert_eq!(gate.prompts, vec!["one", "two", "three"]);
    }
}
