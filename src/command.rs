use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Previous,
    Next,
    Refresh,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "prev" | "-" => Ok(Command::Previous),
            "n" | "next" | "+" => Ok(Command::Next),
            "" | "r" | "refresh" => Ok(Command::Refresh),
            "q" | "quit" | "exit" => Ok(Command::Quit),
            other => Err(anyhow::anyhow!(
                "Unknown command {other:?}: expected p, n, r or q"
            )),
        }
    }
}
