use std::fmt;
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationChoice {
    Yes,
    No,
}

#[derive(Debug, Clone)]
pub struct UiError {
    message: String,
}

impl UiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UiError {}

impl From<io::Error> for UiError {
    fn from(err: io::Error) -> Self {
        UiError::new(err.to_string())
    }
}

/// Prompts for an API key on `output` and reads one line from `input`.
pub fn prompt_api_key<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    already_configured: bool,
) -> Result<String, UiError> {
    writeln!(output, "🔐 Gemini API key setup")?;
    writeln!(output, "━━━━━━━━━━━━━━━━━━━━━━━━")?;
    if already_configured {
        writeln!(output, "A key is already stored; entering a new one replaces it.")?;
    }
    writeln!(
        output,
        "Create a key at https://aistudio.google.com/app/apikey"
    )?;
    write!(output, "Enter your Gemini API key: ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(UiError::new("No API key entered"));
    }

    let key = line.trim();
    if key.is_empty() {
        return Err(UiError::new("Please enter a valid API key"));
    }
    Ok(key.to_string())
}

pub fn prompt_confirmation<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<ConfirmationChoice, UiError> {
    write!(output, "{question} (y/N): ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(parse_confirmation(&line))
}

fn parse_confirmation(input: &str) -> ConfirmationChoice {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ConfirmationChoice::Yes,
        _ => ConfirmationChoice::No,
    }
}
