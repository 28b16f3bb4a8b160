// terminal.rs — Terminal adapter for delete confirmation and file picking.
//
// Renders prompts to a writer and reads one line per answer. Real use wires
// it to a terminal; tests pass in-memory reader/writer pairs.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Mutex;

use maou_workspace::{ChannelError, DeleteConfirmer};

use crate::session::FilePicker;

pub struct TerminalChannel {
    reader: Mutex<BufReader<Box<dyn Read + Send>>>,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl TerminalChannel {
    pub fn new(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
        }
    }

    /// Write `prompt`, then block for one line of input.
    pub fn ask(&self, prompt: &str) -> Result<String, ChannelError> {
        {
            let mut writer = self.writer.lock().map_err(|_| ChannelError::Closed)?;
            writer.write_all(prompt.as_bytes())?;
            writer.flush()?;
        }

        let mut line = String::new();
        let mut reader = self.reader.lock().map_err(|_| ChannelError::Closed)?;
        if reader.read_line(&mut line)? == 0 {
            return Err(ChannelError::Closed);
        }
        Ok(line.trim().to_string())
    }

    /// Only an explicit "delete"/"yes" confirms; anything else declines.
    fn parse_confirmation(input: &str) -> bool {
        matches!(
            input.trim().to_lowercase().as_str(),
            "d" | "delete" | "y" | "yes"
        )
    }

    fn parse_pick(input: &str, candidates: &[String]) -> Result<Option<String>, ChannelError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Ok(n) = trimmed.parse::<usize>() {
            return candidates
                .get(n.wrapping_sub(1))
                .cloned()
                .map(Some)
                .ok_or_else(|| ChannelError::InvalidResponse(format!("no file numbered {}", n)));
        }
        if candidates.iter().any(|c| c == trimmed) {
            return Ok(Some(trimmed.to_string()));
        }
        Err(ChannelError::InvalidResponse(format!(
            "'{}' is not a workspace file",
            trimmed
        )))
    }
}

impl DeleteConfirmer for TerminalChannel {
    fn confirm_delete(&self, path: &str) -> Result<bool, ChannelError> {
        let prompt = format!(
            "Delete '{}'? It will be moved to the trash.\n  [d]elete  [c]ancel\n> ",
            path
        );
        let answer = self.ask(&prompt)?;
        Ok(Self::parse_confirmation(&answer))
    }
}

impl FilePicker for TerminalChannel {
    fn pick_file(&self, candidates: &[String]) -> Result<Option<String>, ChannelError> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut prompt = String::from("Select a file to attach:\n");
        for (idx, path) in candidates.iter().enumerate() {
            prompt.push_str(&format!("  {:>3}. {}\n", idx + 1, path));
        }
        prompt.push_str("Number or path (empty to cancel)\n> ");

        let answer = self.ask(&prompt)?;
        Self::parse_pick(&answer, candidates)
    }
}
