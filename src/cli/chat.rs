//! Line-oriented chat loop.
//!
//! Reads one line at a time; lines starting with `/` are commands, anything
//! else is sent as a message together with the attached image, if any.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::auth::CredentialStore;
use crate::core::request::ImageInput;
use crate::core::session::{ChatSession, SessionError};
use crate::utils::logging::TranscriptLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Message(String),
    AttachImage(PathBuf),
    ClearImage,
    SendImage,
    Auth,
    History,
    Log(Option<PathBuf>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parses one input line. A leading `//` escapes a message that starts
/// with a slash.
pub fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    if let Some(escaped) = trimmed.strip_prefix("//") {
        return ChatInput::Message(format!("/{escaped}"));
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|arg| !arg.is_empty())),
        None => (command, None),
    };

    match (name, arg) {
        ("image", Some(path)) => ChatInput::AttachImage(PathBuf::from(path)),
        ("clear-image", None) => ChatInput::ClearImage,
        ("send", None) => ChatInput::SendImage,
        ("auth", None) => ChatInput::Auth,
        ("history", None) => ChatInput::History,
        ("log", path) => ChatInput::Log(path.map(PathBuf::from)),
        ("help", _) => ChatInput::Help,
        ("quit" | "exit", _) => ChatInput::Quit,
        _ => ChatInput::Unknown(trimmed.to_string()),
    }
}

pub async fn run_chat(session: &ChatSession, log: TranscriptLog) -> Result<(), Box<dyn Error>> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    ChatLoop::new(session, log)
        .with_pending_indicator(true)
        .run(stdin, &mut stdout)
        .await
}

/// State owned by one run of the loop: the transcript and the image waiting
/// to go out with the next message.
pub struct ChatLoop<'a> {
    session: &'a ChatSession,
    log: TranscriptLog,
    pending_image: Option<ImageInput>,
    show_pending: bool,
}

impl<'a> ChatLoop<'a> {
    pub fn new(session: &'a ChatSession, log: TranscriptLog) -> Self {
        Self {
            session,
            log,
            pending_image: None,
            show_pending: false,
        }
    }

    /// Print a "waiting" line on stderr while a request is in flight.
    pub fn with_pending_indicator(mut self, enabled: bool) -> Self {
        self.show_pending = enabled;
        self
    }

    pub fn pending_image(&self) -> Option<&ImageInput> {
        self.pending_image.as_ref()
    }

    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<(), Box<dyn Error>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        writeln!(output, "💬 gemchat. Type /help for commands, /quit to leave.")?;
        if self.session.credentials().resolve().is_none() {
            writeln!(output, "🔑 No API key configured. Type /auth to enter one.")?;
        }
        if self.log.is_active() {
            writeln!(output, "📝 Transcript log {}", self.log.get_status_string())?;
        }

        loop {
            write!(output, "> ")?;
            output.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(output)?;
                break;
            };

            match parse_input(&line) {
                ChatInput::Empty => {}
                ChatInput::Quit => break,
                ChatInput::Help => print_help(output)?,
                ChatInput::History => {
                    writeln!(output, "{} turns in this conversation", self.session.turn_count())?;
                }
                ChatInput::Unknown(command) => {
                    writeln!(output, "Unknown command: {command} (type /help)")?;
                }
                ChatInput::AttachImage(path) => self.attach_image(path, output).await?,
                ChatInput::ClearImage => match self.pending_image.take() {
                    Some(image) => writeln!(output, "Removed {}", image.display_name())?,
                    None => writeln!(output, "No image attached")?,
                },
                ChatInput::Log(path) => {
                    let result = match path {
                        Some(path) => self.log.set_log_file(path),
                        None => self.log.toggle_logging(),
                    };
                    match result {
                        Ok(message) => writeln!(output, "{message}")?,
                        Err(err) => writeln!(output, "⚠️  {err}")?,
                    }
                }
                ChatInput::Auth => {
                    write!(output, "Enter your Gemini API key: ")?;
                    output.flush()?;
                    let Some(key) = lines.next_line().await? else {
                        writeln!(output)?;
                        break;
                    };
                    self.store_key(key.trim(), output)?;
                }
                ChatInput::SendImage => {
                    if self.pending_image.is_none() {
                        writeln!(output, "No image attached. Use /image <path> first.")?;
                    } else {
                        self.send(None, output).await?;
                    }
                }
                ChatInput::Message(text) => self.send(Some(&text), output).await?,
            }
        }

        Ok(())
    }

    async fn attach_image<W: Write>(&mut self, path: PathBuf, output: &mut W) -> io::Result<()> {
        let image = match ImageInput::from_path(&path).await {
            Ok(image) => image,
            Err(err) => return writeln!(output, "⚠️  {err}"),
        };
        if let Err(err) = image.validate() {
            return writeln!(output, "⚠️  {err}");
        }
        writeln!(
            output,
            "📎 Attached {} ({}, {} bytes)",
            image.display_name(),
            image.effective_mime_type(),
            image.data.len()
        )?;
        self.pending_image = Some(image);
        Ok(())
    }

    fn store_key<W: Write>(&self, key: &str, output: &mut W) -> io::Result<()> {
        if key.is_empty() {
            return writeln!(output, "No key entered.");
        }
        if !CredentialStore::validate_format(key) {
            writeln!(
                output,
                "⚠️  This does not look like a Gemini API key. Storing it anyway."
            )?;
        }
        match self.session.credentials().set(key) {
            Ok(()) => writeln!(output, "✓ API key stored"),
            Err(err) => {
                writeln!(output, "⚠️  Could not store the API key: {err}")?;
                writeln!(output, "💡 {}", err.hint())
            }
        }
    }

    async fn send<W: Write>(&mut self, text: Option<&str>, output: &mut W) -> io::Result<()> {
        if self.session.credentials().resolve().is_none() {
            return writeln!(output, "🔑 No API key configured. Type /auth to enter one.");
        }

        if self.show_pending {
            eprint!("⏳ Waiting for Gemini...");
        }
        let result = self.session.send(text, self.pending_image.as_ref()).await;
        if self.show_pending {
            eprint!("\r\x1b[2K");
        }

        match result {
            Ok(Some(exchange)) => {
                self.pending_image = None;
                for turn in [&exchange.user, &exchange.model] {
                    if let Err(err) = self.log.log_turn(turn) {
                        warn!(error = %err, "failed to write transcript");
                    }
                }
                writeln!(output, "{}", exchange.model.text())?;
                writeln!(output)
            }
            Ok(None) => Ok(()),
            Err(SessionError::Transport(err)) => {
                self.pending_image = None;
                writeln!(output, "❌ {err}")
            }
            Err(err) => writeln!(output, "❌ {err}"),
        }
    }
}

fn print_help<W: Write>(output: &mut W) -> io::Result<()> {
    writeln!(output, "Commands:")?;
    writeln!(output, "  /image <path>     Attach an image to the next message")?;
    writeln!(output, "  /clear-image      Drop the attached image")?;
    writeln!(output, "  /send             Send the attached image without text")?;
    writeln!(output, "  /auth             Enter an API key")?;
    writeln!(output, "  /history          Show the number of turns so far")?;
    writeln!(output, "  /log [filename]   Enable or toggle the transcript log")?;
    writeln!(output, "  /quit             Leave the chat")?;
    writeln!(output, "Start a message with // to send a leading slash.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GenerateContentRequest;
    use crate::core::message::Role;
    use crate::core::transport::{ChatTransport, TransportError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct EchoTransport {
        requests: Mutex<Vec<GenerateContentRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn send(
            &self,
            payload: &GenerateContentRequest,
            _credential: &str,
        ) -> Result<String, TransportError> {
            self.requests.lock().unwrap().push(payload.clone());
            if self.fail {
                let message = "Resource has been exhausted (e.g. check quota).";
                return Err(TransportError::classify(message));
            }
            Ok(format!("reply #{}", self.requests.lock().unwrap().len()))
        }
    }

    fn session_with(transport: Arc<EchoTransport>, key: Option<&str>) -> ChatSession {
        let store = CredentialStore::in_memory();
        if let Some(key) = key {
            store.set(key).expect("store key");
        }
        ChatSession::new(store, transport)
    }

    async fn run_script(session: &ChatSession, script: &str) -> String {
        let mut output = Vec::new();
        ChatLoop::new(session, TranscriptLog::disabled())
            .run(script.as_bytes(), &mut output)
            .await
            .expect("loop runs");
        String::from_utf8(output).expect("utf8 output")
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(parse_input("   "), ChatInput::Empty);
        assert_eq!(parse_input(" hello "), ChatInput::Message("hello".into()));
        assert_eq!(parse_input("//etc/hosts"), ChatInput::Message("/etc/hosts".into()));
        assert_eq!(
            parse_input("/image ./cat photo.png"),
            ChatInput::AttachImage(PathBuf::from("./cat photo.png"))
        );
        assert_eq!(parse_input("/image"), ChatInput::Unknown("/image".into()));
        assert_eq!(parse_input("/clear-image"), ChatInput::ClearImage);
        assert_eq!(parse_input("/log"), ChatInput::Log(None));
        assert_eq!(
            parse_input("/log chat.txt"),
            ChatInput::Log(Some(PathBuf::from("chat.txt")))
        );
        assert_eq!(parse_input("/exit"), ChatInput::Quit);
        assert_eq!(parse_input("/frobnicate"), ChatInput::Unknown("/frobnicate".into()));
    }

    #[tokio::test]
    async fn messages_build_on_previous_turns() {
        let transport = Arc::new(EchoTransport::default());
        let session = session_with(transport.clone(), Some("AIzaSyExampleExampleExample"));

        let output = run_script(&session, "first\nsecond\n/history\n/quit\n").await;

        assert!(output.contains("reply #1"));
        assert!(output.contains("reply #2"));
        assert!(output.contains("4 turns in this conversation"));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[1].role, Role::Model.as_str());
    }

    #[tokio::test]
    async fn missing_key_blocks_send_until_auth() {
        let transport = Arc::new(EchoTransport::default());
        let session = session_with(transport.clone(), None);
        let fallback = std::env::var(crate::auth::API_KEY_ENV).ok();

        let output = run_script(
            &session,
            "hello\n/auth\nAIzaSyExampleExampleExample\nhello again\n",
        )
        .await;

        assert!(output.contains("✓ API key stored"));
        assert!(output.contains("reply #1"));
        let sent = transport.requests.lock().unwrap().len();
        match fallback {
            // An exported key lets the first message through as well.
            Some(_) => assert_eq!(sent, 2),
            None => {
                assert!(output.contains("No API key configured"));
                assert_eq!(sent, 1);
            }
        }
    }

    #[tokio::test]
    async fn failed_send_reports_error_and_keeps_history() {
        let transport = Arc::new(EchoTransport {
            fail: true,
            ..Default::default()
        });
        let session = session_with(transport, Some("AIzaSyExampleExampleExample"));

        let output = run_script(&session, "hello\n/history\n").await;

        assert!(output.contains("❌ API quota exceeded."));
        assert!(output.contains("0 turns in this conversation"));
    }

    #[tokio::test]
    async fn image_commands_attach_and_clear() {
        let dir = TempDir::new().expect("temp dir");
        let image_path = dir.path().join("cat.png");
        std::fs::write(&image_path, [0x89, b'P', b'N', b'G']).expect("write image");
        let text_path = dir.path().join("notes.txt");
        std::fs::write(&text_path, "not an image").expect("write text");

        let transport = Arc::new(EchoTransport::default());
        let session = session_with(transport.clone(), Some("AIzaSyExampleExampleExample"));
        let mut output = Vec::new();
        let mut chat = ChatLoop::new(&session, TranscriptLog::disabled());

        let script = format!(
            "/send\n/image {}\n/image {}\n",
            text_path.display(),
            image_path.display()
        );
        chat.run(script.as_bytes(), &mut output).await.expect("loop runs");
        assert!(chat.pending_image().is_some());

        chat.run("/send\n".as_bytes(), &mut output).await.expect("loop runs");
        assert!(chat.pending_image().is_none());

        let text = String::from_utf8(output).expect("utf8 output");
        assert!(text.contains("No image attached. Use /image <path> first."));
        assert!(text.contains("Please select a valid image file (got text/plain)"));
        assert!(text.contains("📎 Attached cat.png (image/png, 4 bytes)"));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].contents[0].parts.len(), 1);
    }
}
