//! Line-oriented operator prompts.
//!
//! The harvest binaries fill in whatever was not passed on the command line
//! by asking here. Each answer is validated on the spot and asked again until
//! it passes, so the pipelines only ever see complete configurations.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `question` and returns the trimmed answer, or `None` once the
    /// input is exhausted.
    pub fn ask(&mut self, question: &str) -> Result<Option<String>> {
        write!(self.output, "{question}").context("writing prompt")?;
        self.output.flush().context("flushing prompt")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("reading operator input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    /// Asks until `validate` accepts the answer, printing its message after
    /// every rejection.
    pub fn ask_valid(
        &mut self,
        question: &str,
        validate: impl Fn(&str) -> Result<()>,
    ) -> Result<String> {
        loop {
            let Some(answer) = self.ask(question)? else {
                bail!("input closed before a valid answer was given");
            };
            match validate(&answer) {
                Ok(()) => return Ok(answer),
                Err(err) => self.say(&err.to_string())?,
            }
        }
    }

    /// Only an explicit `yes` (any case) counts as agreement.
    pub fn ask_yes_no(&mut self, question: &str) -> Result<bool> {
        Ok(self
            .ask(question)?
            .is_some_and(|answer| answer.eq_ignore_ascii_case("yes")))
    }

    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}").context("writing to operator")
    }
}
