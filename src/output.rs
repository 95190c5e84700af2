use std::io::{self, Write};

use serde::Serialize;

use crate::app::StoreOutcome;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_outcome(outcome: &StoreOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_outcomes(outcomes: &[StoreOutcome]) -> io::Result<()> {
        Self::print_json(&outcomes)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
