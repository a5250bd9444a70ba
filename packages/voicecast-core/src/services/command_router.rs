//! Chat text to session command routing.
//!
//! Responsibilities:
//! - Parsing `/command args` text, including aliases and `@BotName` suffixes
//! - Answering `/help`, `/start` and `/about` locally
//! - Handing everything else to the [`SessionRegistry`]

use futures::future::{self, BoxFuture, FutureExt};

use crate::error::PlaybackError;
use crate::protocol_constants::{APP_NAME, MAX_VOLUME};
use crate::session::replies::PLAY_USAGE;
use crate::session::{ChatId, Command, SessionRegistry};

const VOLUME_USAGE: &str = "Please provide a volume level (0-100).\nExample: `/volume 50`";
const VOLUME_NOT_A_NUMBER: &str = "Please provide a valid number for volume level.";

/// Result of parsing one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// A command for the chat's session.
    Session(Command),
    /// `/help`, answered without touching any session.
    Help,
    /// `/start` greeting.
    Start,
    /// `/about` blurb.
    About,
    /// A well-formed command with bad arguments.
    Invalid(PlaybackError),
    /// A `/word` we do not know.
    Unknown(String),
}

/// Parses chat text. Returns `None` if the text is not a command at all.
pub fn parse_command(text: &str) -> Option<ParsedInput> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // `/play@SomeBot` addresses a specific bot in a group.
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }

    let parsed = match name.as_str() {
        "play" | "p" => {
            if args.is_empty() {
                ParsedInput::Invalid(PlaybackError::InvalidArgument(PLAY_USAGE.into()))
            } else {
                ParsedInput::Session(Command::Play {
                    query: args.to_string(),
                })
            }
        }
        "stop" | "s" => ParsedInput::Session(Command::Stop),
        "skip" | "next" | "n" => ParsedInput::Session(Command::Skip),
        "pause" => ParsedInput::Session(Command::Pause),
        "resume" | "r" => ParsedInput::Session(Command::Resume),
        "queue" | "q" => ParsedInput::Session(Command::Queue),
        "volume" | "vol" | "v" => parse_volume(args),
        "help" | "h" => ParsedInput::Help,
        "start" => ParsedInput::Start,
        "about" => ParsedInput::About,
        _ => ParsedInput::Unknown(name),
    };
    Some(parsed)
}

fn parse_volume(args: &str) -> ParsedInput {
    let Some(level) = args.split_whitespace().next() else {
        return ParsedInput::Invalid(PlaybackError::InvalidArgument(VOLUME_USAGE.into()));
    };
    match level.parse::<i64>() {
        Ok(level) => ParsedInput::Session(Command::Volume { level }),
        Err(_) => ParsedInput::Invalid(PlaybackError::InvalidArgument(
            VOLUME_NOT_A_NUMBER.into(),
        )),
    }
}

/// The `/help` reply.
pub fn help_text() -> String {
    format!(
        "**🎵 {APP_NAME} Commands 🎵**\n\
         \n\
         **Playback:**\n\
         `/play <song name or URL>` or `/p` - Search for a song and play it in the voice chat\n\
         `/stop` or `/s` - Stop playback and leave the voice chat\n\
         `/skip`, `/next` or `/n` - Skip to the next song in the queue\n\
         `/pause` - Pause the current playback\n\
         `/resume` or `/r` - Resume paused playback\n\
         \n\
         **Queue and volume:**\n\
         `/queue` or `/q` - Show the current queue\n\
         `/volume <level>`, `/vol` or `/v` - Set volume (0-{MAX_VOLUME})\n\
         \n\
         `/start` - Start the bot\n\
         `/help` or `/h` - Show this help message\n\
         `/about` - Information about this bot"
    )
}

fn start_text() -> String {
    format!(
        "**👋 Hello!**\n\
         \n\
         I'm **{APP_NAME}**. Add me to a group, start a voice chat and ask me to `/play` something.\n\
         \n\
         Use `/help` to see available commands."
    )
}

fn about_text() -> String {
    format!(
        "**🎵 {APP_NAME}** v{}\n\
         \n\
         Plays music from YouTube in group voice chats, with one queue per chat.",
        env!("CARGO_PKG_VERSION")
    )
}

fn unknown_reply(name: &str) -> String {
    format!("Unknown command `/{name}`. Use `/help` to see available commands.")
}

/// Routes chat text to the right session.
#[derive(Clone)]
pub struct CommandRouter {
    registry: SessionRegistry,
}

impl CommandRouter {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Parses `text` and enqueues the resulting command before returning.
    ///
    /// The future resolves to the reply. Text that is not a command gets the
    /// `/help` hint.
    pub fn submit(&self, chat_id: ChatId, text: &str) -> BoxFuture<'static, String> {
        let reply = match parse_command(text) {
            Some(ParsedInput::Session(command)) => {
                log::debug!("[Router] Chat {} -> /{}", chat_id, command.name());
                return self.registry.submit(chat_id, command);
            }
            Some(ParsedInput::Help) => help_text(),
            Some(ParsedInput::Start) => start_text(),
            Some(ParsedInput::About) => about_text(),
            Some(ParsedInput::Invalid(e)) => e.to_reply(),
            Some(ParsedInput::Unknown(name)) => unknown_reply(&name),
            None => "Use `/help` to see available commands.".to_string(),
        };
        future::ready(reply).boxed()
    }

    /// Parses `text`, applies it and returns the reply.
    pub async fn route(&self, chat_id: ChatId, text: &str) -> String {
        self.submit(chat_id, text).await
    }
}
