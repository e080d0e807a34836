//! Single-shot "say" command: one exchange, reply on stdout.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use crate::core::request::ImageInput;
use crate::core::session::ChatSession;

pub async fn run_say(
    session: &ChatSession,
    prompt: &str,
    image: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    say(session, prompt, image, &mut stdout).await
}

pub async fn say<W: Write>(
    session: &ChatSession,
    prompt: &str,
    image: Option<&Path>,
    output: &mut W,
) -> Result<(), Box<dyn Error>> {
    let image = match image {
        Some(path) => Some(ImageInput::from_path(path).await?),
        None => None,
    };

    if prompt.trim().is_empty() && image.is_none() {
        return Err("Usage: gemchat say [--image <path>] <prompt>".into());
    }

    match session.send(Some(prompt), image.as_ref()).await? {
        Some(exchange) => writeln!(output, "{}", exchange.model.text())?,
        None => return Err("Nothing to send".into()),
    }
    Ok(())
}
