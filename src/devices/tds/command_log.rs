use std::fmt;
use std::slice;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind { Write, Query, BinaryQuery }

#[derive(Debug, Clone)]
pub struct CommandLogEntry {
	pub at: DateTime<Local>,
	pub kind: CommandKind,
	pub command: String,
}

// Every command sent during a session, oldest first.  Entries are only ever appended.
#[derive(Debug, Default)]
pub struct CommandLog {
	entries: Vec<CommandLogEntry>,
}

impl CommandLog {

	pub fn new() -> Self { Self::default() }

	pub(crate) fn record(&mut self, kind:CommandKind, command:&str) {
		self.entries.push(CommandLogEntry { at: Local::now(), kind, command: command.to_owned() });
	}

	pub fn len(&self) -> usize { self.entries.len() }
	pub fn is_empty(&self) -> bool { self.entries.is_empty() }

	pub fn entries(&self) -> &[CommandLogEntry] { &self.entries }
	pub fn iter(&self) -> slice::Iter<'_, CommandLogEntry> { self.entries.iter() }

	pub fn commands(&self) -> impl Iterator<Item=&str> + '_ { self.entries.iter().map(|e| e.command.as_str()) }

	pub fn writes(&self) -> impl Iterator<Item=&str> + '_ {
		self.entries.iter().filter(|e| e.kind == CommandKind::Write).map(|e| e.command.as_str())
	}

}

impl<'a> IntoIterator for &'a CommandLog {
	type Item = &'a CommandLogEntry;
	type IntoIter = slice::Iter<'a, CommandLogEntry>;
	fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

impl fmt::Display for CommandLog {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for entry in &self.entries {
			writeln!(f, "- {}: {}", entry.at.format("%Y-%m-%d %H:%M:%S"), entry.command)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn entries_keep_order_and_kind() {
		let mut log = CommandLog::new();
		log.record(CommandKind::Write, "*CLS");
		log.record(CommandKind::Query, "*IDN?");
		log.record(CommandKind::Write, "ACQUIRE:STATE RUN");

		assert_eq!(log.len(), 3);
		assert_eq!(log.commands().collect::<Vec<_>>(), vec!["*CLS", "*IDN?", "ACQUIRE:STATE RUN"]);
		assert_eq!(log.writes().collect::<Vec<_>>(), vec!["*CLS", "ACQUIRE:STATE RUN"]);
		assert!(log.entries()[0].at <= log.entries()[2].at);
	}

	#[test]
	fn display_prints_one_line_per_command() {
		let mut log = CommandLog::new();
		log.record(CommandKind::Write, "*RST");
		let text = log.to_string();
		assert!(text.starts_with("- "));
		assert!(text.ends_with(": *RST\n"));
		assert_eq!(text.lines().count(), 1);
	}
}
