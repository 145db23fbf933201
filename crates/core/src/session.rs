//! Interactive search session: a small slash-command grammar over free-text queries.

use crate::inspector::list_indexed;
use crate::traits::SemanticIndex;
use crate::{Interrupt, QueryError, SearchMode};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

const SEPARATOR: &str = "------------------------------------------------------------";
const LISTED_DOCUMENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Empty,
    Quit,
    Help,
    Docs,
    Info,
    Mode(String),
    Unknown(String),
    Query(String),
}

impl SessionCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return SessionCommand::Empty;
        }
        if !trimmed.starts_with('/') {
            return SessionCommand::Query(trimmed.to_string());
        }

        let (command, argument) = trimmed
            .split_once(char::is_whitespace)
            .map(|(command, argument)| (command, argument.trim()))
            .unwrap_or((trimmed, ""));

        match command.to_lowercase().as_str() {
            "/quit" | "/exit" => SessionCommand::Quit,
            "/help" => SessionCommand::Help,
            "/docs" => SessionCommand::Docs,
            "/info" => SessionCommand::Info,
            "/mode" => SessionCommand::Mode(argument.to_string()),
            _ => SessionCommand::Unknown(command.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub answered: usize,
    pub failed: usize,
}

/// State of one interactive session. The document list is captured once at start.
#[derive(Debug, Clone)]
pub struct Session {
    storage_dir: PathBuf,
    mode: SearchMode,
    documents: Vec<String>,
}

impl Session {
    pub fn open(storage_dir: &Path, mode: SearchMode) -> Self {
        Self {
            storage_dir: storage_dir.to_path_buf(),
            mode,
            documents: list_indexed(storage_dir).into_iter().collect(),
        }
    }

    pub fn write_banner<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "\nStorage: {}", self.storage_dir.display())?;
        writeln!(out, "Indexed Documents: {}", self.documents.len())?;
        if !self.documents.is_empty() {
            writeln!(out, "\nAvailable documents:")?;
            for name in self.documents.iter().take(LISTED_DOCUMENTS) {
                writeln!(out, "  - {name}")?;
            }
            if self.documents.len() > LISTED_DOCUMENTS {
                writeln!(out, "  ... and {} more", self.documents.len() - LISTED_DOCUMENTS)?;
            }
        }
        writeln!(out, "\n{SEPARATOR}")?;
        writeln!(out, "Search modes: naive, local, global, hybrid")?;
        writeln!(out, "Commands: /mode <mode>, /docs, /info, /quit, /help")?;
        writeln!(out, "{SEPARATOR}")
    }

    /// Reads commands until `/quit`, end of input or `interrupt`. Storages must
    /// already be initialized; query failures are reported and the loop continues.
    pub async fn run<S, R, W>(
        &mut self,
        service: &S,
        input: R,
        out: &mut W,
        interrupt: &Interrupt,
    ) -> Result<SessionSummary, QueryError>
    where
        S: SemanticIndex + ?Sized,
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut summary = SessionSummary::default();
        let mut lines = input.lines();

        loop {
            write!(out, "\n[{}] Query: ", self.mode)?;
            out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = interrupt.wait() => {
                    writeln!(out)?;
                    info!("session interrupted");
                    break;
                }
            };
            let Some(line) = line else {
                writeln!(out)?;
                break;
            };

            match SessionCommand::parse(&line) {
                SessionCommand::Empty => continue,
                SessionCommand::Quit => break,
                SessionCommand::Help => write_help(out)?,
                SessionCommand::Docs => {
                    writeln!(out, "\nIndexed Documents:")?;
                    for name in &self.documents {
                        writeln!(out, "  - {name}")?;
                    }
                }
                SessionCommand::Info => {
                    writeln!(out, "\nStorage: {}", self.storage_dir.display())?;
                    writeln!(out, "Documents: {}", self.documents.len())?;
                    writeln!(out, "Mode: {}", self.mode)?;
                }
                SessionCommand::Mode(name) => match name.parse::<SearchMode>() {
                    Ok(mode) => {
                        self.mode = mode;
                        writeln!(out, "Mode changed to: {mode}")?;
                    }
                    Err(_) => writeln!(out, "Invalid mode. Use: naive, local, global, or hybrid")?,
                },
                SessionCommand::Unknown(command) => {
                    writeln!(out, "Unknown command: {command}. Type /help for commands.")?;
                }
                SessionCommand::Query(text) => {
                    writeln!(out, "\nSearching...\n")?;
                    match service.query(&text, self.mode).await {
                        Ok(answer) => {
                            writeln!(out, "{SEPARATOR}\n{answer}\n{SEPARATOR}")?;
                            summary.answered += 1;
                        }
                        Err(error) => {
                            warn!(%error, mode = %self.mode, "session query failed");
                            writeln!(out, "Error: {error}")?;
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(summary)
    }
}

fn write_help<W: Write>(out: &mut W) -> std::io::Result<()> {
    writeln!(out, "\nCommands:")?;
    for mode in SearchMode::ALL {
        let command = format!("/mode {mode}");
        writeln!(out, "  {command:<13}- {}", mode.description())?;
    }
    writeln!(out, "  /docs        - List indexed documents")?;
    writeln!(out, "  /info        - Show storage statistics")?;
    writeln!(out, "  /quit        - Exit the search")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(SessionCommand::parse("  "), SessionCommand::Empty);
        assert_eq!(SessionCommand::parse("/QUIT"), SessionCommand::Quit);
        assert_eq!(SessionCommand::parse("/exit"), SessionCommand::Quit);
        assert_eq!(SessionCommand::parse("/Docs"), SessionCommand::Docs);
        assert_eq!(
            SessionCommand::parse("/mode  Global "),
            SessionCommand::Mode("Global".to_string())
        );
        assert_eq!(SessionCommand::parse("/mode"), SessionCommand::Mode(String::new()));
        assert_eq!(
            SessionCommand::parse("/modes local"),
            SessionCommand::Unknown("/modes".to_string())
        );
        assert_eq!(
            SessionCommand::parse(" what is RAG? "),
            SessionCommand::Query("what is RAG?".to_string())
        );
    }

    #[test]
    fn help_lists_every_mode() {
        let mut out = Vec::new();
        write_help(&mut out).expect("write to vec");
        let text = String::from_utf8_lossy(&out);
        for mode in SearchMode::ALL {
            assert!(text.contains(&format!("/mode {mode}")));
        }
    }
}
